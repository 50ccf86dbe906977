//! External transcoder collaborator.
//!
//! The pipeline only needs "given inputs, a mode and a quality profile,
//! produce an output file or fail". Filter graphs and encoder flags live
//! behind the [`Transcoder`] trait; [`FfmpegTranscoder`] is the production
//! implementation.

mod ffmpeg;

use std::io;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use ffmpeg::FfmpegTranscoder;

/// What the transcoder is asked to do with its inputs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TranscodeMode {
    /// Stream-copy join, inputs in playback order.
    Concat,
    /// Re-encode a single input.
    Solo,
    /// Picture-in-picture encode: `inputs[0]` is main, `inputs[1]` overlay.
    Composite,
}

impl TranscodeMode {
    /// Number of inputs the mode accepts: `(min, max)`.
    fn input_bounds(&self) -> (usize, usize) {
        match self {
            TranscodeMode::Concat => (1, usize::MAX),
            TranscodeMode::Solo => (1, 1),
            TranscodeMode::Composite => (2, 2),
        }
    }
}

impl std::fmt::Display for TranscodeMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TranscodeMode::Concat => write!(f, "concat"),
            TranscodeMode::Solo => write!(f, "solo"),
            TranscodeMode::Composite => write!(f, "composite"),
        }
    }
}

/// One transcoder invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TranscodeRequest {
    pub inputs: Vec<PathBuf>,
    pub mode: TranscodeMode,
    pub output: PathBuf,
}

impl TranscodeRequest {
    pub fn new(mode: TranscodeMode, inputs: Vec<PathBuf>, output: impl Into<PathBuf>) -> Self {
        Self {
            inputs,
            mode,
            output: output.into(),
        }
    }

    /// Check the input count against the mode.
    pub fn validate(&self) -> TranscodeResult<()> {
        let (min, max) = self.mode.input_bounds();
        let actual = self.inputs.len();
        if actual < min || actual > max {
            return Err(TranscodeError::InvalidRequest {
                mode: self.mode,
                actual,
            });
        }
        Ok(())
    }
}

/// Diagnostic output of a successful invocation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TranscodeOutput {
    /// Lines the tool wrote to stderr.
    pub stderr_lines: Vec<String>,
}

/// Errors from a transcoder invocation.
#[derive(Error, Debug)]
pub enum TranscodeError {
    #[error("{mode} request has {actual} input(s)")]
    InvalidRequest { mode: TranscodeMode, actual: usize },

    #[error("Failed to start {tool}: {source}")]
    Spawn {
        tool: String,
        #[source]
        source: io::Error,
    },

    #[error("{tool} failed with exit code {exit_code}")]
    Failed {
        tool: String,
        exit_code: i32,
        stderr_lines: Vec<String>,
    },

    #[error("{tool} timed out after {secs}s and was killed")]
    TimedOut {
        tool: String,
        secs: u64,
        stderr_lines: Vec<String>,
    },

    #[error("{tool} reported success but {} is missing or empty", output.display())]
    OutputMissing { tool: String, output: PathBuf },

    #[error("I/O error while {operation}: {source}")]
    Io {
        operation: String,
        #[source]
        source: io::Error,
    },
}

impl TranscodeError {
    pub fn io(operation: impl Into<String>, source: io::Error) -> Self {
        Self::Io {
            operation: operation.into(),
            source,
        }
    }

    /// Tool stderr captured before the failure, if any.
    pub fn stderr_lines(&self) -> &[String] {
        match self {
            Self::Failed { stderr_lines, .. } | Self::TimedOut { stderr_lines, .. } => {
                stderr_lines
            }
            _ => &[],
        }
    }
}

pub type TranscodeResult<T> = Result<T, TranscodeError>;

/// The external transcoding tool.
///
/// Implementations must write the complete result to `request.output` and
/// return `Ok` only when the tool reported success. The caller checks that
/// the output is non-empty before trusting it.
pub trait Transcoder: Send + Sync {
    /// Tool name for logs.
    fn name(&self) -> &str;

    /// Human-readable command line for a request, for the run log.
    fn describe(&self, request: &TranscodeRequest) -> String {
        format!(
            "{} {} {:?} -> {}",
            self.name(),
            request.mode,
            request.inputs,
            request.output.display()
        )
    }

    /// Run the tool and wait for it to finish.
    fn invoke(&self, request: &TranscodeRequest) -> TranscodeResult<TranscodeOutput>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validate_checks_input_counts() {
        let one = vec![PathBuf::from("a")];
        let two = vec![PathBuf::from("a"), PathBuf::from("b")];

        assert!(TranscodeRequest::new(TranscodeMode::Concat, two.clone(), "o").validate().is_ok());
        assert!(TranscodeRequest::new(TranscodeMode::Solo, one.clone(), "o").validate().is_ok());
        assert!(TranscodeRequest::new(TranscodeMode::Solo, two.clone(), "o").validate().is_err());
        assert!(TranscodeRequest::new(TranscodeMode::Composite, one, "o").validate().is_err());
        assert!(TranscodeRequest::new(TranscodeMode::Composite, two, "o").validate().is_ok());
        assert!(TranscodeRequest::new(TranscodeMode::Concat, vec![], "o").validate().is_err());
    }

    #[test]
    fn failure_carries_stderr() {
        let err = TranscodeError::Failed {
            tool: "ffmpeg".to_string(),
            exit_code: 1,
            stderr_lines: vec!["moov atom not found".to_string()],
        };
        assert!(err.to_string().contains("exit code 1"));
        assert_eq!(err.stderr_lines(), ["moov atom not found".to_string()]);
    }
}
