//! Core enums used throughout the application.

use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Lens channel a clip was recorded on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Channel {
    /// Front-facing lens. Full-frame (main) in picture-in-picture output.
    Front,
    /// Rear-facing lens. Inset (overlay) in picture-in-picture output.
    Back,
    /// Single-lens cameras that do not tag a channel.
    Unknown,
}

impl Channel {
    /// All channels, in processing order.
    pub const ALL: [Channel; 3] = [Channel::Front, Channel::Back, Channel::Unknown];

    /// Whether this is one half of a front/back pair.
    pub fn is_dual_lens(&self) -> bool {
        matches!(self, Channel::Front | Channel::Back)
    }
}

impl std::fmt::Display for Channel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Channel::Front => write!(f, "front"),
            Channel::Back => write!(f, "back"),
            Channel::Unknown => write!(f, "unknown"),
        }
    }
}

/// Supported dash camera models.
///
/// Each model maps to a static filename grammar, see
/// [`crate::grammar::ModelGrammar`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum CameraModel {
    /// PAPAGO D5: `YYYY_MMDD_HHMMSS_00_a.MP4` / `_b.MP4`.
    #[default]
    #[serde(rename = "d5")]
    D5,
    /// PAPAGO S80 WiFi: `YYYY_MMDD_HHMMSS_123A.MP4` / `B.MP4`.
    #[serde(rename = "s80wifi")]
    S80Wifi,
    /// PAPAGO S36 (single lens): `YYYY-MM-DD-HH-MM-SS.MOV`.
    #[serde(rename = "s36")]
    S36,
}

impl std::fmt::Display for CameraModel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CameraModel::D5 => write!(f, "d5"),
            CameraModel::S80Wifi => write!(f, "s80wifi"),
            CameraModel::S36 => write!(f, "s36"),
        }
    }
}

impl FromStr for CameraModel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "d5" => Ok(CameraModel::D5),
            "s80wifi" => Ok(CameraModel::S80Wifi),
            "s36" => Ok(CameraModel::S36),
            other => Err(format!(
                "unknown camera model '{}' (expected d5, s80wifi or s36)",
                other
            )),
        }
    }
}

/// Processing backend used for the compression encode.
///
/// Passed through to the transcoder as an opaque quality profile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    /// Software x265.
    #[default]
    Cpu,
    /// NVENC HEVC.
    Nvidia,
    /// VideoToolbox HEVC.
    Apple,
}

impl std::fmt::Display for Backend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Backend::Cpu => write!(f, "cpu"),
            Backend::Nvidia => write!(f, "nvidia"),
            Backend::Apple => write!(f, "apple"),
        }
    }
}

impl FromStr for Backend {
    type Err = String;

    /// Accepts names as well as the legacy numeric selectors (0, 1, 2).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "cpu" | "0" => Ok(Backend::Cpu),
            "nvidia" | "1" => Ok(Backend::Nvidia),
            "apple" | "2" => Ok(Backend::Apple),
            other => Err(format!(
                "unknown processor '{}' (expected cpu/0, nvidia/1 or apple/2)",
                other
            )),
        }
    }
}

/// What happens to compression inputs once the output is confirmed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CleanupMode {
    /// Move consumed inputs into the archive folder.
    #[default]
    Archive,
    /// Delete consumed inputs.
    Delete,
    /// Leave inputs where they are.
    Keep,
}

impl std::fmt::Display for CleanupMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CleanupMode::Archive => write!(f, "archive"),
            CleanupMode::Delete => write!(f, "delete"),
            CleanupMode::Keep => write!(f, "keep"),
        }
    }
}

impl FromStr for CleanupMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "archive" => Ok(CleanupMode::Archive),
            "delete" => Ok(CleanupMode::Delete),
            "keep" => Ok(CleanupMode::Keep),
            other => Err(format!(
                "unknown cleanup mode '{}' (expected archive, delete or keep)",
                other
            )),
        }
    }
}

/// Rule deciding whether two consecutive clips belong to one session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContinuityRule {
    /// `|interval| <= duration + slack`.
    ///
    /// Accepts any gap shorter than one clip plus slack, including
    /// overlapping or duplicate timestamps.
    #[default]
    WithinDurationPlusSlack,
    /// `|interval - duration| <= slack`.
    ///
    /// Requires the interval to be close to exactly one clip length.
    DeviationFromDuration,
}

impl std::fmt::Display for ContinuityRule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ContinuityRule::WithinDurationPlusSlack => write!(f, "within duration + slack"),
            ContinuityRule::DeviationFromDuration => write!(f, "deviation from duration"),
        }
    }
}

/// Kind of side-effecting unit of work.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobKind {
    /// Join a session's clips into one file.
    Concatenate,
    /// Picture-in-picture encode of a front/back pair.
    Composite,
    /// Single-input encode.
    Solo,
}

impl std::fmt::Display for JobKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            JobKind::Concatenate => write!(f, "concatenate"),
            JobKind::Composite => write!(f, "composite"),
            JobKind::Solo => write!(f, "solo"),
        }
    }
}
