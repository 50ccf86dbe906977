//! Logging infrastructure.
//!
//! - Global `tracing` subscriber for the binary
//! - Per-run log file with phase/section markers
//! - Tail buffer of transcoder output for error diagnosis
//!
//! # Example
//!
//! ```no_run
//! use dashcam_core::logging::{LogConfig, RunLogger};
//!
//! let logger = RunLogger::new("run_20200101", "/videos/out/.dashcam/logs", LogConfig::default())
//!     .unwrap();
//!
//! logger.phase("Concatenate");
//! logger.command("ffmpeg -f concat ...");
//! logger.success("2020_0101_120000_00_a.MP4");
//! ```

mod run_logger;
mod types;

pub use run_logger::RunLogger;
pub use types::{LogConfig, LogLevel, MessagePrefix};

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Initialize the global tracing subscriber.
///
/// Respects `RUST_LOG`, falling back to `default_level`. Output goes to
/// stderr. Call once at startup.
pub fn init_tracing(default_level: LogLevel) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_level.as_filter_str()));

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
        .with(filter)
        .init();
}

/// Initialize tracing for tests (only logs warnings and above).
#[cfg(test)]
pub fn init_test_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("warn")
        .with_test_writer()
        .try_init();
}
