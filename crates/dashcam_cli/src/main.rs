//! dashcam-stitch command line.
//!
//! Joins dash camera clips into one file per recording session, pairs
//! front/back sessions into picture-in-picture encodes, and compresses
//! everything with ffmpeg. Safe to re-run: finished work is skipped.
//!
//! Usage:
//!   dashcam-stitch -i /media/DCIM -o ~/Videos/dashcam -m d5 -p nvidia

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context as _, Result};
use chrono::Local;
use clap::Parser;
use signal_hook::consts::{SIGINT, SIGTERM};

use dashcam_core::config::{ConfigManager, Settings};
use dashcam_core::logging::{init_tracing, LogConfig, LogLevel, RunLogger};
use dashcam_core::models::{Backend, CameraModel, CleanupMode};
use dashcam_core::orchestrator::{create_standard_pipeline, Context, RunState, RunSummary};
use dashcam_core::transcoder::FfmpegTranscoder;

#[derive(Parser)]
#[command(
    name = "dashcam-stitch",
    version,
    about = "Join dash camera clips into sessions and compress them with ffmpeg"
)]
struct Cli {
    /// Directory of raw camera clips (missing = only compress the output directory)
    #[arg(short, long)]
    input: Option<PathBuf>,

    /// Directory for session files and compressed output
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Nominal clip length in seconds
    #[arg(short, long)]
    length: Option<u32>,

    /// Encoder backend: cpu, nvidia or apple (0/1/2 also accepted)
    #[arg(short, long)]
    processor: Option<Backend>,

    /// Camera model: d5, s80wifi or s36
    #[arg(short, long)]
    model: Option<CameraModel>,

    /// What to do with consumed session files: archive, delete or keep
    #[arg(long)]
    cleanup: Option<CleanupMode>,

    /// Per-invocation ffmpeg timeout in seconds (0 = none)
    #[arg(long)]
    timeout: Option<u64>,

    /// ffmpeg executable
    #[arg(long)]
    ffmpeg: Option<PathBuf>,

    /// TOML config file (created with defaults if missing)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Log level: trace, debug, info, warn, error
    #[arg(long)]
    log_level: Option<LogLevel>,
}

impl Cli {
    /// Flags win over file values.
    fn apply(&self, settings: &mut Settings) {
        if let Some(input) = &self.input {
            settings.paths.input_folder = input.to_string_lossy().to_string();
        }
        if let Some(output) = &self.output {
            settings.paths.output_folder = output.to_string_lossy().to_string();
        }
        if let Some(length) = self.length {
            settings.camera.clip_length_secs = length;
        }
        if let Some(backend) = self.processor {
            settings.encoding.backend = backend;
        }
        if let Some(model) = self.model {
            settings.camera.model = model;
        }
        if let Some(mode) = self.cleanup {
            settings.cleanup.mode = mode;
        }
        if let Some(timeout) = self.timeout {
            settings.encoding.timeout_secs = timeout;
        }
        if let Some(ffmpeg) = &self.ffmpeg {
            settings.encoding.ffmpeg_path = ffmpeg.to_string_lossy().to_string();
        }
        if let Some(level) = self.log_level {
            settings.logging.level = level;
        }
    }
}

fn load_settings(cli: &Cli) -> Result<Settings> {
    let Some(path) = &cli.config else {
        return Ok(Settings::default());
    };

    let mut manager = ConfigManager::new(path);
    manager
        .load_or_create()
        .with_context(|| format!("loading config {}", path.display()))?;
    Ok(manager.into_settings())
}

fn print_summary(summary: &RunSummary) {
    println!();
    println!("Clips:      {}", summary.clips);
    if !summary.malformed.is_empty() {
        println!("Malformed:  {}", summary.malformed.join(", "));
    }
    println!("Completed:  {}", summary.completed);
    println!("Skipped:    {}", summary.skipped);
    println!("Failed:     {}", summary.failed);
    for report in summary.reports.iter().filter(|r| r.status.is_failed()) {
        println!("  {} {}", report.kind, report.target);
    }
}

/// Returns whether every job succeeded.
fn run(cli: Cli) -> Result<bool> {
    let mut settings = load_settings(&cli)?;
    cli.apply(&mut settings);

    init_tracing(settings.logging.level);

    if settings.paths.output_folder.is_empty() {
        bail!("no output directory: pass -o/--output or set [paths] output_folder");
    }

    let run_name = format!("run_{}", Local::now().format("%Y%m%d_%H%M%S"));
    let logs_dir = settings.logs_dir();

    let log_config = LogConfig {
        level: settings.logging.level,
        compact: settings.logging.compact,
        error_tail: settings.logging.error_tail as usize,
        show_timestamps: true,
    };
    let logger = Arc::new(
        RunLogger::new(&run_name, &logs_dir, log_config)
            .with_context(|| format!("creating run log in {}", logs_dir.display()))?,
    );

    let timeout = (settings.encoding.timeout_secs > 0)
        .then(|| Duration::from_secs(settings.encoding.timeout_secs));
    let transcoder = Arc::new(
        FfmpegTranscoder::new(settings.encoding.backend, timeout)
            .with_ffmpeg_path(&settings.encoding.ffmpeg_path),
    );

    let pipeline = create_standard_pipeline();
    let cancel = pipeline.cancel_handle();
    for signal in [SIGINT, SIGTERM] {
        // A second signal while the first is pending exits immediately.
        signal_hook::flag::register_conditional_shutdown(signal, 1, cancel.as_flag())
            .context("registering signal handler")?;
        signal_hook::flag::register(signal, cancel.as_flag())
            .context("registering signal handler")?;
    }

    logger.info(&format!(
        "dashcam-stitch {} | model {} | backend {} | clip length {}s | cleanup {}",
        dashcam_core::version(),
        settings.camera.model,
        settings.encoding.backend,
        settings.camera.clip_length_secs,
        settings.cleanup.mode
    ));
    logger.info(&format!(
        "Input: {} | Output: {}",
        settings.paths.input_folder, settings.paths.output_folder
    ));

    let ctx = Context::new(settings, &run_name, transcoder, Arc::clone(&logger))
        .with_cancel_handle(cancel);
    let mut state = RunState::new(&run_name);

    let result = pipeline.run(&ctx, &mut state);

    let summary = state.summary();
    let summary_path = logs_dir.join(format!("{}.summary.json", run_name));
    if let Err(e) = summary.save(&summary_path) {
        logger.warn(&format!("Failed to write run summary: {}", e));
    }
    print_summary(&summary);
    println!("Log:        {}", logger.log_path().display());
    logger.close();

    let run = result?;
    if !run.all_completed() {
        println!("Idle steps: {}", run.steps_skipped.join(", "));
    }
    Ok(summary.failed == 0)
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    match run(cli) {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flags_override_defaults() {
        let cli = Cli::parse_from([
            "dashcam-stitch",
            "-i",
            "/in",
            "-o",
            "/out",
            "-l",
            "180",
            "-p",
            "1",
            "-m",
            "s80wifi",
            "--cleanup",
            "keep",
            "--timeout",
            "0",
        ]);
        let mut settings = Settings::default();
        cli.apply(&mut settings);

        assert_eq!(settings.paths.input_folder, "/in");
        assert_eq!(settings.paths.output_folder, "/out");
        assert_eq!(settings.camera.clip_length_secs, 180);
        assert_eq!(settings.encoding.backend, Backend::Nvidia);
        assert_eq!(settings.camera.model, CameraModel::S80Wifi);
        assert_eq!(settings.cleanup.mode, CleanupMode::Keep);
        assert_eq!(settings.encoding.timeout_secs, 0);
    }

    #[test]
    fn absent_flags_keep_file_values() {
        let cli = Cli::parse_from(["dashcam-stitch"]);
        let mut settings = Settings::default();
        settings.camera.model = CameraModel::S36;
        cli.apply(&mut settings);

        assert_eq!(settings.camera.model, CameraModel::S36);
        assert_eq!(settings.encoding.backend, Backend::Cpu);
    }

    #[test]
    fn rejects_unknown_model() {
        assert!(Cli::try_parse_from(["dashcam-stitch", "-m", "gopro"]).is_err());
    }
}
