//! Settings struct with TOML-based sections.
//!
//! Settings are organized into logical sections that map to TOML tables.
//! Each section can be updated independently for atomic section-level updates.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::cluster::ContinuityPolicy;
use crate::logging::LogLevel;
use crate::models::{Backend, CameraModel, CleanupMode, ContinuityRule};

/// Root settings structure containing all configuration sections.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Settings {
    /// Input and output directories.
    #[serde(default)]
    pub paths: PathSettings,

    /// Camera model and clip timing.
    #[serde(default)]
    pub camera: CameraSettings,

    /// Transcoder settings.
    #[serde(default)]
    pub encoding: EncodingSettings,

    /// What happens to consumed inputs.
    #[serde(default)]
    pub cleanup: CleanupSettings,

    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingSettings,
}

impl Settings {
    /// Session continuity policy for this run.
    ///
    /// Starts from the model's default and applies any configured rule or
    /// slack override.
    pub fn continuity_policy(&self) -> ContinuityPolicy {
        let default = self.camera.model.grammar().default_continuity;
        ContinuityPolicy::new(
            self.camera.continuity.unwrap_or(default.rule),
            self.camera
                .continuity_slack_secs
                .map(i64::from)
                .unwrap_or(default.slack_secs),
        )
    }

    /// Directory for run logs. Defaults to `<output>/.dashcam/logs`.
    pub fn logs_dir(&self) -> PathBuf {
        if self.paths.logs_folder.is_empty() {
            PathBuf::from(&self.paths.output_folder)
                .join(".dashcam")
                .join("logs")
        } else {
            PathBuf::from(&self.paths.logs_folder)
        }
    }
}

/// Path configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PathSettings {
    /// Directory of raw camera clips. Missing = compress-only run.
    #[serde(default)]
    pub input_folder: String,

    /// Directory for session outputs and compressed files.
    #[serde(default)]
    pub output_folder: String,

    /// Folder for run logs (empty = under the output folder).
    #[serde(default)]
    pub logs_folder: String,
}

/// Camera configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CameraSettings {
    /// Camera model, selects the filename grammar.
    #[serde(default)]
    pub model: CameraModel,

    /// Nominal clip length in seconds.
    #[serde(default = "default_clip_length")]
    pub clip_length_secs: u32,

    /// Continuity rule override.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub continuity: Option<ContinuityRule>,

    /// Continuity slack override in seconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub continuity_slack_secs: Option<u32>,

    /// Max start-time difference for a front/back pair.
    #[serde(default = "default_pair_tolerance")]
    pub pair_tolerance_secs: u32,
}

fn default_clip_length() -> u32 {
    300
}

fn default_pair_tolerance() -> u32 {
    crate::pairing::PAIR_TOLERANCE_SECS
}

impl Default for CameraSettings {
    fn default() -> Self {
        Self {
            model: CameraModel::default(),
            clip_length_secs: default_clip_length(),
            continuity: None,
            continuity_slack_secs: None,
            pair_tolerance_secs: default_pair_tolerance(),
        }
    }
}

/// Transcoder configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EncodingSettings {
    /// Encoder backend (quality profile).
    #[serde(default)]
    pub backend: Backend,

    /// ffmpeg executable.
    #[serde(default = "default_ffmpeg_path")]
    pub ffmpeg_path: String,

    /// Per-invocation timeout in seconds (0 = none).
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
}

fn default_ffmpeg_path() -> String {
    "ffmpeg".to_string()
}

fn default_timeout() -> u64 {
    4 * 60 * 60
}

impl Default for EncodingSettings {
    fn default() -> Self {
        Self {
            backend: Backend::default(),
            ffmpeg_path: default_ffmpeg_path(),
            timeout_secs: default_timeout(),
        }
    }
}

/// Cleanup configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CleanupSettings {
    #[serde(default)]
    pub mode: CleanupMode,

    /// Archive folder name, inside the output folder.
    #[serde(default = "default_archive_folder")]
    pub archive_folder: String,
}

fn default_archive_folder() -> String {
    "completed".to_string()
}

impl Default for CleanupSettings {
    fn default() -> Self {
        Self {
            mode: CleanupMode::default(),
            archive_folder: default_archive_folder(),
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingSettings {
    /// Minimum level for the run log.
    #[serde(default)]
    pub level: LogLevel,

    /// Keep transcoder output out of the log unless a job fails.
    #[serde(default = "default_true")]
    pub compact: bool,

    /// Number of transcoder lines to show on error (tail).
    #[serde(default = "default_error_tail")]
    pub error_tail: u32,
}

fn default_true() -> bool {
    true
}

fn default_error_tail() -> u32 {
    20
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: LogLevel::default(),
            compact: true,
            error_tail: default_error_tail(),
        }
    }
}

/// Names of config sections for targeted updates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConfigSection {
    Paths,
    Camera,
    Encoding,
    Cleanup,
    Logging,
}

impl ConfigSection {
    pub const ALL: [ConfigSection; 5] = [
        ConfigSection::Paths,
        ConfigSection::Camera,
        ConfigSection::Encoding,
        ConfigSection::Cleanup,
        ConfigSection::Logging,
    ];

    /// Get the TOML table name for this section.
    pub fn table_name(&self) -> &'static str {
        match self {
            ConfigSection::Paths => "paths",
            ConfigSection::Camera => "camera",
            ConfigSection::Encoding => "encoding",
            ConfigSection::Cleanup => "cleanup",
            ConfigSection::Logging => "logging",
        }
    }

    /// Comment written above the table.
    pub fn description(&self) -> &'static str {
        match self {
            ConfigSection::Paths => "Input, output and log directories",
            ConfigSection::Camera => "Camera model and clip timing",
            ConfigSection::Encoding => "Transcoder settings",
            ConfigSection::Cleanup => "What happens to inputs once their output is complete",
            ConfigSection::Logging => "Logging configuration",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_settings_serializes() {
        let settings = Settings::default();
        let toml = toml::to_string_pretty(&settings).unwrap();
        assert!(toml.contains("[paths]"));
        assert!(toml.contains("[camera]"));
        assert!(toml.contains("model = \"d5\""));
        assert!(toml.contains("mode = \"archive\""));
        assert!(!toml.contains("continuity_slack_secs"));
    }

    #[test]
    fn missing_fields_use_defaults() {
        let minimal = "[paths]\noutput_folder = \"out\"\n[camera]\nmodel = \"s36\"";
        let parsed: Settings = toml::from_str(minimal).unwrap();
        assert_eq!(parsed.paths.output_folder, "out");
        assert_eq!(parsed.camera.model, CameraModel::S36);
        assert_eq!(parsed.camera.clip_length_secs, 300);
        assert_eq!(parsed.camera.pair_tolerance_secs, 10);
        assert_eq!(parsed.encoding.timeout_secs, 14400);
        assert_eq!(parsed.cleanup.archive_folder, "completed");
        assert!(parsed.logging.compact);
    }

    #[test]
    fn continuity_policy_overrides_model_default() {
        let mut settings = Settings::default();
        assert_eq!(
            settings.continuity_policy(),
            ContinuityPolicy::new(ContinuityRule::WithinDurationPlusSlack, 30)
        );

        settings.camera.continuity = Some(ContinuityRule::DeviationFromDuration);
        settings.camera.continuity_slack_secs = Some(3);
        assert_eq!(
            settings.continuity_policy(),
            ContinuityPolicy::new(ContinuityRule::DeviationFromDuration, 3)
        );
    }

    #[test]
    fn logs_dir_defaults_under_output() {
        let mut settings = Settings::default();
        settings.paths.output_folder = "/videos/out".to_string();
        assert_eq!(settings.logs_dir(), PathBuf::from("/videos/out/.dashcam/logs"));

        settings.paths.logs_folder = "/var/log/dashcam".to_string();
        assert_eq!(settings.logs_dir(), PathBuf::from("/var/log/dashcam"));
    }
}
