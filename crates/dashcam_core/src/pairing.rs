//! Front/back pairing of concatenated session outputs.
//!
//! A dual-lens camera starts both channels at (almost) the same moment, so a
//! front session output and a back session output whose start times are
//! within a few seconds are two views of the same drive and become one
//! picture-in-picture encode. Everything else is encoded on its own.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use crate::grammar::COMPRESSED_EXTENSION;
use crate::models::{Channel, ClipFile, JobKind};
use crate::transcoder::TranscodeMode;

/// Maximum start-time difference for a front/back pair.
pub const PAIR_TOLERANCE_SECS: u32 = 10;

/// A compression unit derived from session outputs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CompressionJob {
    /// Front full-frame with the back channel inset.
    Composite {
        main: ClipFile,
        overlay: ClipFile,
        output: PathBuf,
    },
    /// A single session output.
    Solo { input: ClipFile, output: PathBuf },
}

impl CompressionJob {
    fn solo(input: ClipFile) -> Self {
        let output = compressed_path(&input);
        Self::Solo { input, output }
    }

    fn composite(a: ClipFile, b: ClipFile) -> Self {
        let (main, overlay) = if a.channel == Channel::Front {
            (a, b)
        } else {
            (b, a)
        };
        let output = compressed_path(&main);
        Self::Composite {
            main,
            overlay,
            output,
        }
    }

    /// Target path of the compressed file.
    pub fn output(&self) -> &Path {
        match self {
            Self::Composite { output, .. } | Self::Solo { output, .. } => output,
        }
    }

    /// Inputs in transcoder order (main first for composites).
    pub fn inputs(&self) -> Vec<&ClipFile> {
        match self {
            Self::Composite { main, overlay, .. } => vec![main, overlay],
            Self::Solo { input, .. } => vec![input],
        }
    }

    pub fn kind(&self) -> JobKind {
        match self {
            Self::Composite { .. } => JobKind::Composite,
            Self::Solo { .. } => JobKind::Solo,
        }
    }

    pub fn mode(&self) -> TranscodeMode {
        match self {
            Self::Composite { .. } => TranscodeMode::Composite,
            Self::Solo { .. } => TranscodeMode::Solo,
        }
    }
}

fn compressed_path(main: &ClipFile) -> PathBuf {
    main.path
        .with_file_name(format!("{}.{}", main.stem, COMPRESSED_EXTENSION))
}

/// Order outputs of all channels for [`pair`]: by timestamp, then name.
pub fn sort_for_pairing(outputs: &mut [ClipFile]) {
    outputs.sort_by(|a, b| a.timestamp.cmp(&b.timestamp).then_with(|| a.name.cmp(&b.name)));
}

/// Turn sorted session outputs into compression jobs.
///
/// Each element is compared with its successor only; the last element is
/// compared with itself, which can never pair. A pair consumes both
/// elements.
pub fn pair(outputs: &[ClipFile], tolerance_secs: u32) -> Vec<CompressionJob> {
    let tolerance = i64::from(tolerance_secs);
    let mut jobs = Vec::with_capacity(outputs.len());
    let mut i = 0;

    while i < outputs.len() {
        let current = &outputs[i];
        let next = outputs.get(i + 1).unwrap_or(current);

        let opposite_channels = current.channel.is_dual_lens()
            && next.channel.is_dual_lens()
            && current.channel != next.channel;

        if opposite_channels && next.seconds_since(current).abs() <= tolerance {
            jobs.push(CompressionJob::composite(current.clone(), next.clone()));
            i += 2;
        } else {
            jobs.push(CompressionJob::solo(current.clone()));
            i += 1;
        }
    }

    jobs
}

/// Indices of jobs whose output path was already claimed by an earlier job.
///
/// Two sessions of one channel starting at the same second (possible with a
/// loose continuity policy) share a stem and would write the same file.
pub fn output_conflicts(jobs: &[CompressionJob]) -> Vec<usize> {
    let mut claimed = HashSet::new();
    jobs.iter()
        .enumerate()
        .filter(|&(_, job)| !claimed.insert(job.output()))
        .map(|(i, _)| i)
        .collect()
}
