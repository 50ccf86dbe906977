//! Core types for the orchestrator pipeline.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::Serialize;

use crate::cluster::ContinuityPolicy;
use crate::config::Settings;
use crate::grammar::ModelGrammar;
use crate::logging::RunLogger;
use crate::models::{ClipFile, JobKind};
use crate::resume::SkipReason;
use crate::transcoder::Transcoder;

use super::pipeline::CancelHandle;

/// Read-only context passed to pipeline steps.
///
/// Holds the run configuration and shared resources. Mutable results go
/// in [`RunState`].
pub struct Context {
    /// Application settings (file values with CLI overrides applied).
    pub settings: Settings,
    /// Filename grammar of the configured camera model.
    pub grammar: &'static ModelGrammar,
    /// Run identifier, used in logs and errors.
    pub run_name: String,
    /// Raw clip directory.
    pub input_dir: PathBuf,
    /// Session outputs and compressed files.
    pub output_dir: PathBuf,
    /// External transcoder.
    pub transcoder: Arc<dyn Transcoder>,
    /// Run logger.
    pub logger: Arc<RunLogger>,
    cancel: Option<CancelHandle>,
}

impl Context {
    /// Create a context. Directories and the grammar come from `settings`.
    pub fn new(
        settings: Settings,
        run_name: impl Into<String>,
        transcoder: Arc<dyn Transcoder>,
        logger: Arc<RunLogger>,
    ) -> Self {
        Self {
            grammar: settings.camera.model.grammar(),
            input_dir: PathBuf::from(&settings.paths.input_folder),
            output_dir: PathBuf::from(&settings.paths.output_folder),
            settings,
            run_name: run_name.into(),
            transcoder,
            logger,
            cancel: None,
        }
    }

    /// Let steps observe cancellation between jobs.
    pub fn with_cancel_handle(mut self, handle: CancelHandle) -> Self {
        self.cancel = Some(handle);
        self
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.as_ref().is_some_and(CancelHandle::is_cancelled)
    }

    pub fn continuity_policy(&self) -> ContinuityPolicy {
        self.settings.continuity_policy()
    }

    /// Archive folder for consumed compression inputs.
    pub fn archive_dir(&self) -> PathBuf {
        self.output_dir.join(&self.settings.cleanup.archive_folder)
    }
}

/// Mutable state that accumulates results from pipeline steps.
#[derive(Debug, Clone, Default)]
pub struct RunState {
    /// Unique run identifier.
    pub run_id: String,
    /// When the run started.
    pub started_at: Option<String>,
    /// Discovery results (from Discover step).
    pub discover: Option<DiscoverOutput>,
    /// One report per job, in execution order.
    pub reports: Vec<JobReport>,
}

impl RunState {
    pub fn new(run_id: impl Into<String>) -> Self {
        Self {
            run_id: run_id.into(),
            started_at: Some(chrono::Local::now().to_rfc3339()),
            ..Default::default()
        }
    }

    pub fn has_discovery(&self) -> bool {
        self.discover.is_some()
    }

    /// Whether the run only compresses what is already in the output dir.
    pub fn is_compress_only(&self) -> bool {
        self.discover.as_ref().is_some_and(|d| d.compress_only)
    }

    pub fn record(&mut self, report: JobReport) {
        self.reports.push(report);
    }

    /// Reports of one job kind.
    pub fn reports_of(&self, kind: JobKind) -> impl Iterator<Item = &JobReport> {
        self.reports.iter().filter(move |r| r.kind == kind)
    }

    pub fn failed_count(&self) -> usize {
        self.reports.iter().filter(|r| r.status.is_failed()).count()
    }

    pub fn summary(&self) -> RunSummary {
        let count = |pred: fn(&JobStatus) -> bool| {
            self.reports.iter().filter(|r| pred(&r.status)).count()
        };
        RunSummary {
            run_id: self.run_id.clone(),
            started_at: self.started_at.clone(),
            finished_at: chrono::Local::now().to_rfc3339(),
            compress_only: self.is_compress_only(),
            clips: self.discover.as_ref().map_or(0, |d| d.clips.len()),
            malformed: self
                .discover
                .as_ref()
                .map(|d| d.malformed.clone())
                .unwrap_or_default(),
            completed: count(|s| matches!(s, JobStatus::Completed)),
            skipped: count(|s| matches!(s, JobStatus::Skipped(_))),
            failed: count(JobStatus::is_failed),
            reports: self.reports.clone(),
        }
    }
}

/// Output from the Discover step.
#[derive(Debug, Clone, Default)]
pub struct DiscoverOutput {
    /// Camera files of the configured model, in file name order.
    pub clips: Vec<ClipFile>,
    /// Names that look like camera files but did not parse.
    pub malformed: Vec<String>,
    /// The input directory was absent.
    pub compress_only: bool,
}

/// Result of one job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Completed,
    Skipped(SkipReason),
    Failed(String),
}

impl JobStatus {
    pub fn is_failed(&self) -> bool {
        matches!(self, JobStatus::Failed(_))
    }
}

/// Per-job entry of the run report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct JobReport {
    pub kind: JobKind,
    /// File name of the job's target.
    pub target: String,
    pub status: JobStatus,
}

impl JobReport {
    pub fn new(kind: JobKind, target: &Path, status: JobStatus) -> Self {
        Self {
            kind,
            target: target
                .file_name()
                .map(|n| n.to_string_lossy().to_string())
                .unwrap_or_default(),
            status,
        }
    }
}

/// End-of-run summary, written next to the run log.
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub run_id: String,
    pub started_at: Option<String>,
    pub finished_at: String,
    pub compress_only: bool,
    pub clips: usize,
    pub malformed: Vec<String>,
    pub completed: usize,
    pub skipped: usize,
    pub failed: usize,
    pub reports: Vec<JobReport>,
}

impl RunSummary {
    /// Write the summary as pretty JSON, atomically.
    pub fn save(&self, path: &Path) -> io::Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let json = serde_json::to_string_pretty(self)
            .map_err(|e| io::Error::new(io::ErrorKind::Other, e))?;

        let temp_file = path.with_extension("json.tmp");
        fs::write(&temp_file, &json)?;
        fs::rename(&temp_file, path)?;
        Ok(())
    }
}

/// Result of executing a pipeline step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepOutcome {
    /// Step completed successfully.
    Success,
    /// Step had nothing to do (not an error).
    Skipped(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn summary_counts_statuses() {
        let mut state = RunState::new("run-1");
        state.record(JobReport::new(
            JobKind::Concatenate,
            Path::new("/out/a_a.MP4"),
            JobStatus::Completed,
        ));
        state.record(JobReport::new(
            JobKind::Solo,
            Path::new("/out/a.mp4"),
            JobStatus::Skipped(SkipReason::TargetExists(PathBuf::from("/out/a.mp4"))),
        ));
        state.record(JobReport::new(
            JobKind::Composite,
            Path::new("/out/b.mp4"),
            JobStatus::Failed("ffmpeg failed with exit code 1".to_string()),
        ));

        let summary = state.summary();
        assert_eq!((summary.completed, summary.skipped, summary.failed), (1, 1, 1));
        assert_eq!(state.failed_count(), 1);
        assert_eq!(state.reports_of(JobKind::Solo).count(), 1);
        assert_eq!(summary.reports[0].target, "a_a.MP4");
    }

    #[test]
    fn summary_serializes_to_disk() {
        let dir = tempdir().unwrap();
        let mut state = RunState::new("run-2");
        state.record(JobReport::new(
            JobKind::Solo,
            Path::new("x.mp4"),
            JobStatus::Skipped(SkipReason::MarkerRecorded("x.mp4".to_string())),
        ));

        let path = dir.path().join("run-2.summary.json");
        state.summary().save(&path).unwrap();

        let json = fs::read_to_string(&path).unwrap();
        assert!(json.contains("\"run_id\": \"run-2\""));
        assert!(json.contains("marker_recorded"));
        assert!(json.contains("\"kind\": \"solo\""));
    }
}
