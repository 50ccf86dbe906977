//! Configuration management.
//!
//! TOML file with one table per concern, loaded through [`ConfigManager`].
//! Missing keys take their defaults; command-line flags are applied on top
//! by the binary.
//!
//! # Example
//!
//! ```no_run
//! use dashcam_core::config::ConfigManager;
//!
//! let mut config = ConfigManager::new("dashcam.toml");
//! config.load_or_create().unwrap();
//!
//! let settings = config.into_settings();
//! println!("Model: {}", settings.camera.model);
//! ```

mod manager;
mod settings;

pub use manager::{ConfigError, ConfigManager, ConfigResult};
pub use settings::{
    CameraSettings, CleanupSettings, ConfigSection, EncodingSettings, LoggingSettings,
    PathSettings, Settings,
};
