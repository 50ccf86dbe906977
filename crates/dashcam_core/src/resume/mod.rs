//! Resume guard: decides whether a job's result already exists.
//!
//! The filesystem is the source of truth. A concatenation is done when its
//! target exists and is non-empty, when a completion marker lists the
//! session as consumed, or (fallback) when a compressed output named after
//! the session, or starting within the pairing tolerance of it, is present. A compression is done when its output exists and
//! is non-empty. Work in progress is written to a hidden `.partial.` file
//! and renamed on success, so a half-written file never looks finished.

mod markers;

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::Serialize;

pub use markers::{CompletionMarker, MarkerStore, MARKER_DIR};

use crate::grammar::{ModelGrammar, COMPRESSED_EXTENSION};
use crate::models::Session;
use crate::pairing::CompressionJob;
use crate::scan;

/// Why a job was skipped.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    /// The target file exists and is non-empty.
    TargetExists(PathBuf),
    /// A completion marker (named by its output) consumed this session.
    MarkerRecorded(String),
    /// A compressed output matching the session stem or start time is present.
    CompressedOutputPresent(String),
}

impl std::fmt::Display for SkipReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SkipReason::TargetExists(path) => write!(f, "{} already exists", path.display()),
            SkipReason::MarkerRecorded(output) => {
                write!(f, "already compressed into {} (marker)", output)
            }
            SkipReason::CompressedOutputPresent(name) => {
                write!(f, "compressed output {} is present", name)
            }
        }
    }
}

/// True when `path` is a regular file with non-zero size.
pub fn output_is_complete(path: &Path) -> bool {
    fs::metadata(path)
        .map(|m| m.is_file() && m.len() > 0)
        .unwrap_or(false)
}

/// Hidden in-progress path for a target: `dir/.partial.<name>`.
pub fn partial_path(target: &Path) -> PathBuf {
    let name = target
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();
    target.with_file_name(format!(".partial.{}", name))
}

/// Skip/resume decisions for one output directory.
#[derive(Debug)]
pub struct ResumeGuard {
    output_dir: PathBuf,
    grammar: &'static ModelGrammar,
    tolerance_secs: u32,
    markers: MarkerStore,
}

impl ResumeGuard {
    /// Build a guard, loading the directory's completion markers.
    ///
    /// `tolerance_secs` is the pairing tolerance: a compressed output that
    /// starts this close to a session may have consumed it as an overlay.
    pub fn new(
        output_dir: impl Into<PathBuf>,
        grammar: &'static ModelGrammar,
        tolerance_secs: u32,
    ) -> Self {
        let output_dir = output_dir.into();
        let markers = MarkerStore::load(&output_dir);
        Self {
            output_dir,
            grammar,
            tolerance_secs,
            markers,
        }
    }

    /// Where a session's concatenated output goes: `output_dir/<identity>`.
    pub fn concat_target(&self, session: &Session) -> PathBuf {
        self.output_dir.join(session.identity())
    }

    /// Reason to skip concatenating `session`, or `None` to run it.
    pub fn check_concatenate(&self, session: &Session) -> io::Result<Option<SkipReason>> {
        let target = self.concat_target(session);
        if output_is_complete(&target) {
            return Ok(Some(SkipReason::TargetExists(target)));
        }

        if let Some(marker) = self.markers.records_input(session.identity()) {
            return Ok(Some(SkipReason::MarkerRecorded(marker.output.clone())));
        }

        Ok(self
            .compressed_output_for(session)?
            .map(SkipReason::CompressedOutputPresent))
    }

    /// Reason to skip a compression job, or `None` to run it.
    pub fn check_compress(&self, job: &CompressionJob) -> Option<SkipReason> {
        let output = job.output();
        output_is_complete(output).then(|| SkipReason::TargetExists(output.to_path_buf()))
    }

    /// Write the completion marker for a finished compression job.
    pub fn record_completion(&mut self, job: &CompressionJob) -> io::Result<()> {
        let output = job
            .output()
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        let inputs = job.inputs().iter().map(|c| c.name.clone()).collect();
        self.markers
            .record(CompletionMarker::new(output, job.mode(), inputs))
    }

    /// Fallback check for directories without markers: a compressed file
    /// in the output directory whose name starts with the session stem, or
    /// whose timestamp is within the pairing tolerance of the session start.
    ///
    /// The second rule catches a back session consumed by a composite, which
    /// is named after the front stem.
    fn compressed_output_for(&self, session: &Session) -> io::Result<Option<String>> {
        if !self.output_dir.is_dir() {
            return Ok(None);
        }

        let suffix = format!(".{}", COMPRESSED_EXTENSION);
        let start = session.first().timestamp;
        let tolerance = i64::from(self.tolerance_secs);

        for path in scan::list_files(&self.output_dir)? {
            let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            if self.grammar.classify(name).is_some() || !name.ends_with(&suffix) {
                continue;
            }
            let covers = name.starts_with(session.stem())
                || self
                    .grammar
                    .parse_timestamp(name)
                    .is_ok_and(|ts| (ts - start).num_seconds().abs() <= tolerance);
            if covers && output_is_complete(&path) {
                return Ok(Some(name.to_string()));
            }
        }
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::CameraModel;
    use crate::pairing::{pair, sort_for_pairing, PAIR_TOLERANCE_SECS};
    use tempfile::tempdir;

    fn session_in(dir: &Path, name: &str) -> Session {
        let clip = CameraModel::D5
            .grammar()
            .clip_from_path(&dir.join(name))
            .unwrap()
            .unwrap();
        Session::new(clip)
    }

    #[test]
    fn partial_path_is_hidden_sibling() {
        assert_eq!(
            partial_path(Path::new("/out/2020_0101_120000_00.mp4")),
            PathBuf::from("/out/.partial.2020_0101_120000_00.mp4")
        );
    }

    #[test]
    fn zero_byte_output_is_not_complete() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("x.mp4");
        assert!(!output_is_complete(&path));
        fs::write(&path, b"").unwrap();
        assert!(!output_is_complete(&path));
        fs::write(&path, b"data").unwrap();
        assert!(output_is_complete(&path));
        assert!(!output_is_complete(dir.path()));
    }

    #[test]
    fn concatenate_runs_when_nothing_exists() {
        let dir = tempdir().unwrap();
        let guard = ResumeGuard::new(dir.path(), CameraModel::D5.grammar(), PAIR_TOLERANCE_SECS);
        let session = session_in(Path::new("/in"), "2020_0101_120000_00_a.MP4");

        assert_eq!(guard.check_concatenate(&session).unwrap(), None);
        assert_eq!(
            guard.concat_target(&session),
            dir.path().join("2020_0101_120000_00_a.MP4")
        );
    }

    #[test]
    fn concatenate_skips_existing_target() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("2020_0101_120000_00_a.MP4"), b"joined").unwrap();
        let guard = ResumeGuard::new(dir.path(), CameraModel::D5.grammar(), PAIR_TOLERANCE_SECS);
        let session = session_in(Path::new("/in"), "2020_0101_120000_00_a.MP4");

        assert!(matches!(
            guard.check_concatenate(&session).unwrap(),
            Some(SkipReason::TargetExists(_))
        ));
    }

    #[test]
    fn concatenate_ignores_empty_target() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("2020_0101_120000_00_a.MP4"), b"").unwrap();
        let guard = ResumeGuard::new(dir.path(), CameraModel::D5.grammar(), PAIR_TOLERANCE_SECS);
        let session = session_in(Path::new("/in"), "2020_0101_120000_00_a.MP4");

        assert_eq!(guard.check_concatenate(&session).unwrap(), None);
    }

    #[test]
    fn concatenate_skips_when_compressed_output_present() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("2020_0101_120000_00.mp4"), b"hevc").unwrap();
        let guard = ResumeGuard::new(dir.path(), CameraModel::D5.grammar(), PAIR_TOLERANCE_SECS);
        let session = session_in(Path::new("/in"), "2020_0101_120000_00_a.MP4");

        assert_eq!(
            guard.check_concatenate(&session).unwrap(),
            Some(SkipReason::CompressedOutputPresent(
                "2020_0101_120000_00.mp4".to_string()
            ))
        );
    }

    #[test]
    fn composite_output_covers_back_session_without_marker() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("2020_0101_120000_00.mp4"), b"pip").unwrap();
        let guard = ResumeGuard::new(dir.path(), CameraModel::D5.grammar(), PAIR_TOLERANCE_SECS);

        let back = session_in(Path::new("/in"), "2020_0101_120003_00_b.MP4");
        assert_eq!(
            guard.check_concatenate(&back).unwrap(),
            Some(SkipReason::CompressedOutputPresent(
                "2020_0101_120000_00.mp4".to_string()
            ))
        );

        // Outside the tolerance: a different recording.
        let later = session_in(Path::new("/in"), "2020_0101_120011_00_b.MP4");
        assert_eq!(guard.check_concatenate(&later).unwrap(), None);
    }

    #[test]
    fn marker_covers_back_channel_with_different_stem() {
        let dir = tempdir().unwrap();
        let out = dir.path();
        fs::write(out.join("2020_0101_120000_00_a.MP4"), b"front").unwrap();
        fs::write(out.join("2020_0101_120003_00_b.MP4"), b"back").unwrap();

        let grammar = CameraModel::D5.grammar();
        let mut outputs: Vec<_> = ["2020_0101_120000_00_a.MP4", "2020_0101_120003_00_b.MP4"]
            .iter()
            .map(|n| grammar.clip_from_path(&out.join(n)).unwrap().unwrap())
            .collect();
        sort_for_pairing(&mut outputs);
        let jobs = pair(&outputs, PAIR_TOLERANCE_SECS);

        let mut guard = ResumeGuard::new(out, grammar, PAIR_TOLERANCE_SECS);
        guard.record_completion(&jobs[0]).unwrap();

        // Inputs archived away: only the marker remembers the back session.
        fs::remove_file(out.join("2020_0101_120000_00_a.MP4")).unwrap();
        fs::remove_file(out.join("2020_0101_120003_00_b.MP4")).unwrap();

        let guard = ResumeGuard::new(out, grammar, PAIR_TOLERANCE_SECS);
        let back = session_in(Path::new("/in"), "2020_0101_120003_00_b.MP4");
        assert_eq!(
            guard.check_concatenate(&back).unwrap(),
            Some(SkipReason::MarkerRecorded("2020_0101_120000_00.mp4".to_string()))
        );
    }

    #[test]
    fn compress_skips_only_complete_output() {
        let dir = tempdir().unwrap();
        let out = dir.path();
        let grammar = CameraModel::D5.grammar();
        let clip = grammar
            .clip_from_path(&out.join("2020_0101_120000_00_a.MP4"))
            .unwrap()
            .unwrap();
        let jobs = pair(&[clip], PAIR_TOLERANCE_SECS);
        let guard = ResumeGuard::new(out, grammar, PAIR_TOLERANCE_SECS);

        assert_eq!(guard.check_compress(&jobs[0]), None);
        fs::write(out.join("2020_0101_120000_00.mp4"), b"").unwrap();
        assert_eq!(guard.check_compress(&jobs[0]), None);
        fs::write(out.join("2020_0101_120000_00.mp4"), b"hevc").unwrap();
        assert!(matches!(
            guard.check_compress(&jobs[0]),
            Some(SkipReason::TargetExists(_))
        ));
    }
}
