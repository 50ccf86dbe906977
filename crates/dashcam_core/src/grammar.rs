//! Per-model filename grammars and the timestamp parser.
//!
//! Every supported camera encodes the capture time in the filename as
//! delimiter-separated tokens. Some tokens hold more than one field
//! (`MMDD`, `HHMMSS`), so each field is a fixed-width slice of a token.
//! A grammar is selected once from the [`CameraModel`] and passed around
//! as a `&'static ModelGrammar`.

use std::path::Path;

use chrono::{NaiveDate, NaiveDateTime};
use thiserror::Error;

use crate::cluster::ContinuityPolicy;
use crate::models::{CameraModel, Channel, ClipFile, ContinuityRule};

/// Extension of compressed outputs (lowercase, so it never collides with
/// camera files).
pub const COMPRESSED_EXTENSION: &str = "mp4";

/// Error decoding a timestamp from a filename.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    #[error("Malformed filename '{filename}' for model {model}: {reason}")]
    MalformedFilename {
        filename: String,
        model: CameraModel,
        reason: String,
    },
}

impl ParseError {
    fn malformed(filename: &str, model: CameraModel, reason: impl Into<String>) -> Self {
        Self::MalformedFilename {
            filename: filename.to_string(),
            model,
            reason: reason.into(),
        }
    }
}

/// Fixed-width slice of one delimiter-separated token.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldSlice {
    pub token: usize,
    pub start: usize,
    pub width: usize,
}

const fn slice(token: usize, start: usize, width: usize) -> FieldSlice {
    FieldSlice {
        token,
        start,
        width,
    }
}

/// Filename grammar and behaviour descriptor for one camera model.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelGrammar {
    pub model: CameraModel,
    /// Token delimiter.
    pub delimiter: char,
    /// Year, month, day, hour, minute, second.
    pub fields: [FieldSlice; 6],
    /// Suffix (before the extension) marking front clips.
    pub front_suffix: Option<&'static str>,
    /// Suffix (before the extension) marking back clips.
    pub back_suffix: Option<&'static str>,
    /// Camera container extension, including the dot. Case-sensitive.
    pub extension: &'static str,
    /// Session continuity policy used unless the config overrides it.
    pub default_continuity: ContinuityPolicy,
}

static D5: ModelGrammar = ModelGrammar {
    model: CameraModel::D5,
    delimiter: '_',
    fields: [
        slice(0, 0, 4),
        slice(1, 0, 2),
        slice(1, 2, 2),
        slice(2, 0, 2),
        slice(2, 2, 2),
        slice(2, 4, 2),
    ],
    front_suffix: Some("_a"),
    back_suffix: Some("_b"),
    extension: ".MP4",
    default_continuity: ContinuityPolicy::new(ContinuityRule::WithinDurationPlusSlack, 30),
};

static S80_WIFI: ModelGrammar = ModelGrammar {
    model: CameraModel::S80Wifi,
    delimiter: '_',
    fields: [
        slice(0, 0, 4),
        slice(1, 0, 2),
        slice(1, 2, 2),
        slice(2, 0, 2),
        slice(2, 2, 2),
        slice(2, 4, 2),
    ],
    front_suffix: Some("A"),
    back_suffix: Some("B"),
    extension: ".MP4",
    default_continuity: ContinuityPolicy::new(ContinuityRule::WithinDurationPlusSlack, 30),
};

static S36: ModelGrammar = ModelGrammar {
    model: CameraModel::S36,
    delimiter: '-',
    fields: [
        slice(0, 0, 4),
        slice(1, 0, 2),
        slice(2, 0, 2),
        slice(3, 0, 2),
        slice(4, 0, 2),
        slice(5, 0, 2),
    ],
    front_suffix: None,
    back_suffix: None,
    extension: ".MOV",
    default_continuity: ContinuityPolicy::new(ContinuityRule::WithinDurationPlusSlack, 30),
};

impl CameraModel {
    /// The static grammar for this model.
    pub fn grammar(self) -> &'static ModelGrammar {
        match self {
            CameraModel::D5 => &D5,
            CameraModel::S80Wifi => &S80_WIFI,
            CameraModel::S36 => &S36,
        }
    }
}

impl ModelGrammar {
    /// Whether the camera records a single unnamed channel.
    pub fn is_single_channel(&self) -> bool {
        self.front_suffix.is_none() && self.back_suffix.is_none()
    }

    /// Channel of a camera file, or `None` if the name is not one.
    pub fn classify(&self, filename: &str) -> Option<Channel> {
        let body = filename.strip_suffix(self.extension)?;
        if self.is_single_channel() {
            return Some(Channel::Unknown);
        }
        if self.front_suffix.is_some_and(|s| body.ends_with(s)) {
            Some(Channel::Front)
        } else if self.back_suffix.is_some_and(|s| body.ends_with(s)) {
            Some(Channel::Back)
        } else {
            None
        }
    }

    /// File name with the channel suffix and extension stripped.
    pub fn stem<'a>(&self, filename: &'a str) -> Option<&'a str> {
        let body = filename.strip_suffix(self.extension)?;
        match self.classify(filename)? {
            Channel::Front => body.strip_suffix(self.front_suffix?),
            Channel::Back => body.strip_suffix(self.back_suffix?),
            Channel::Unknown => Some(body),
        }
    }

    /// Decode the capture timestamp from a filename.
    pub fn parse_timestamp(&self, filename: &str) -> Result<NaiveDateTime, ParseError> {
        let tokens: Vec<&str> = filename.split(self.delimiter).collect();

        let mut values = [0u32; 6];
        for (value, field) in values.iter_mut().zip(self.fields.iter()) {
            let token = tokens.get(field.token).ok_or_else(|| {
                ParseError::malformed(
                    filename,
                    self.model,
                    format!("missing token {}", field.token),
                )
            })?;
            let digits = token
                .get(field.start..field.start + field.width)
                .ok_or_else(|| {
                    ParseError::malformed(
                        filename,
                        self.model,
                        format!("token '{}' is too short", token),
                    )
                })?;
            if !digits.bytes().all(|b| b.is_ascii_digit()) {
                return Err(ParseError::malformed(
                    filename,
                    self.model,
                    format!("'{}' is not numeric", digits),
                ));
            }
            // Width is at most 4 ASCII digits here, so this cannot overflow.
            *value = digits.parse().unwrap_or_default();
        }

        let [year, month, day, hour, minute, second] = values;
        NaiveDate::from_ymd_opt(year as i32, month, day)
            .and_then(|date| date.and_hms_opt(hour, minute, second))
            .ok_or_else(|| {
                ParseError::malformed(
                    filename,
                    self.model,
                    format!(
                        "{:04}-{:02}-{:02} {:02}:{:02}:{:02} is not a valid date/time",
                        year, month, day, hour, minute, second
                    ),
                )
            })
    }

    /// Build a [`ClipFile`] for a path.
    ///
    /// Returns `Ok(None)` when the file is not a camera file for this model
    /// (wrong extension or suffix), and `Err` when it looks like one but the
    /// timestamp does not parse.
    pub fn clip_from_path(&self, path: &Path) -> Result<Option<ClipFile>, ParseError> {
        let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
            return Ok(None);
        };
        let Some(channel) = self.classify(name) else {
            return Ok(None);
        };
        let timestamp = self.parse_timestamp(name)?;
        let stem = self.stem(name).unwrap_or(name).to_string();

        Ok(Some(ClipFile {
            path: path.to_path_buf(),
            name: name.to_string(),
            channel,
            timestamp,
            stem,
        }))
    }
}
