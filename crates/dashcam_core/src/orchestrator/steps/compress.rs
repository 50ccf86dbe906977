//! Compress step - pairs session outputs and encodes them.

use std::fs;
use std::io;
use std::path::Path;

use crate::models::{CleanupMode, ClipFile, JobKind};
use crate::orchestrator::errors::{StepError, StepResult};
use crate::orchestrator::step::PipelineStep;
use crate::orchestrator::types::{
    Context, DiscoverOutput, JobReport, JobStatus, RunState, StepOutcome,
};
use crate::pairing::{output_conflicts, pair, sort_for_pairing, CompressionJob};
use crate::resume::{output_is_complete, ResumeGuard};
use crate::scan;
use crate::transcoder::TranscodeRequest;

use super::{run_transcoder, write_via_partial};

/// Lists the session outputs in the output directory, pairs front/back
/// outputs into composites, and encodes every job to `<stem>.mp4`.
///
/// Runs after every channel finished concatenating, so pairing sees all
/// session outputs. Inputs are cleaned up only once the output is in place
/// and non-empty.
pub struct CompressStep;

impl CompressStep {
    pub fn new() -> Self {
        Self
    }

    /// Session outputs currently in the output directory. Names that look
    /// like camera files but do not parse are added to the malformed list.
    fn session_outputs(&self, ctx: &Context, state: &mut RunState) -> StepResult<Vec<ClipFile>> {
        let files = scan::list_files(&ctx.output_dir)
            .map_err(|e| StepError::io_error("listing output directory", e))?;

        let mut outputs = Vec::new();
        for path in &files {
            match ctx.grammar.clip_from_path(path) {
                Ok(Some(clip)) => outputs.push(clip),
                Ok(None) => {}
                Err(e) => {
                    ctx.logger.warn(&e.to_string());
                    let name = path
                        .file_name()
                        .map(|n| n.to_string_lossy().to_string())
                        .unwrap_or_default();
                    let malformed = &mut state
                        .discover
                        .get_or_insert_with(DiscoverOutput::default)
                        .malformed;
                    if !malformed.contains(&name) {
                        malformed.push(name);
                    }
                }
            }
        }
        sort_for_pairing(&mut outputs);
        Ok(outputs)
    }

    fn compress(&self, ctx: &Context, job: &CompressionJob, guard: &mut ResumeGuard) -> JobStatus {
        let inputs: Vec<_> = job.inputs().iter().map(|c| c.path.clone()).collect();
        let names: Vec<&str> = job.inputs().iter().map(|c| c.name.as_str()).collect();
        let output = job.output();

        let result = write_via_partial(ctx, output, |partial| {
            let request = TranscodeRequest::new(job.mode(), inputs, partial);
            run_transcoder(ctx, &request)
        });

        if let Err(message) = result {
            ctx.logger.error(&format!(
                "{} ({}): {}",
                output.display(),
                names.join(" + "),
                message
            ));
            return JobStatus::Failed(message);
        }

        ctx.logger.success(&format!(
            "{} <- {}",
            output.file_name().unwrap_or_default().to_string_lossy(),
            names.join(" + ")
        ));

        if let Err(e) = guard.record_completion(job) {
            ctx.logger
                .warn(&format!("Failed to write completion marker: {}", e));
        }

        self.cleanup(ctx, job);
        JobStatus::Completed
    }

    /// Archive or delete a job's inputs. Never runs unless the output is
    /// complete.
    fn cleanup(&self, ctx: &Context, job: &CompressionJob) {
        if !output_is_complete(job.output()) {
            ctx.logger.warn(&format!(
                "Keeping inputs: {} is missing or empty",
                job.output().display()
            ));
            return;
        }

        let mode = ctx.settings.cleanup.mode;
        for input in job.inputs() {
            let result = match mode {
                CleanupMode::Keep => Ok(()),
                CleanupMode::Delete => fs::remove_file(input.path()),
                CleanupMode::Archive => archive(input.path(), &ctx.archive_dir()),
            };
            match result {
                Ok(()) if mode != CleanupMode::Keep => {
                    ctx.logger.debug(&format!("{}: {}", mode, input.name));
                }
                Ok(()) => {}
                Err(e) => ctx
                    .logger
                    .warn(&format!("Cleanup ({}) of {} failed: {}", mode, input.name, e)),
            }
        }
    }
}

fn archive(path: &Path, archive_dir: &Path) -> io::Result<()> {
    fs::create_dir_all(archive_dir)?;
    let name = path
        .file_name()
        .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "path has no file name"))?;
    fs::rename(path, archive_dir.join(name))
}

impl Default for CompressStep {
    fn default() -> Self {
        Self::new()
    }
}

impl PipelineStep for CompressStep {
    fn name(&self) -> &str {
        "Compress"
    }

    fn description(&self) -> &str {
        "Pair session outputs and encode them"
    }

    fn validate_input(&self, ctx: &Context) -> StepResult<()> {
        if ctx.archive_dir() == ctx.output_dir {
            return Err(StepError::invalid_input(
                "archive folder must differ from the output folder",
            ));
        }
        Ok(())
    }

    fn execute(&self, ctx: &Context, state: &mut RunState) -> StepResult<StepOutcome> {
        if !ctx.output_dir.is_dir() {
            return Ok(StepOutcome::Skipped(format!(
                "output directory '{}' does not exist",
                ctx.output_dir.display()
            )));
        }

        let outputs = self.session_outputs(ctx, state)?;
        let jobs = pair(&outputs, ctx.settings.camera.pair_tolerance_secs);
        if jobs.is_empty() {
            return Ok(StepOutcome::Skipped("no session outputs to compress".to_string()));
        }

        let composites = jobs.iter().filter(|j| j.kind() == JobKind::Composite).count();
        ctx.logger.section(&format!(
            "{} job(s): {} composite, {} solo",
            jobs.len(),
            composites,
            jobs.len() - composites
        ));

        let mut guard = ResumeGuard::new(
            &ctx.output_dir,
            ctx.grammar,
            ctx.settings.camera.pair_tolerance_secs,
        );

        let conflicts = output_conflicts(&jobs);

        for (i, job) in jobs.iter().enumerate() {
            if ctx.is_cancelled() {
                return Err(StepError::Cancelled);
            }

            if conflicts.contains(&i) {
                let message = format!(
                    "{} is also the output of an earlier job; inputs kept",
                    job.output().display()
                );
                ctx.logger.error(&message);
                let status = JobStatus::Failed(message);
                state.record(JobReport::new(job.kind(), job.output(), status));
                continue;
            }

            let status = match guard.check_compress(job) {
                Some(reason) => {
                    ctx.logger.skip(&reason.to_string());
                    JobStatus::Skipped(reason)
                }
                None => self.compress(ctx, job, &mut guard),
            };
            state.record(JobReport::new(job.kind(), job.output(), status));
        }

        Ok(StepOutcome::Success)
    }

    fn validate_output(&self, ctx: &Context, state: &RunState) -> StepResult<()> {
        for kind in [JobKind::Composite, JobKind::Solo] {
            for report in state.reports_of(kind) {
                if report.status == JobStatus::Completed
                    && !output_is_complete(&ctx.output_dir.join(&report.target))
                {
                    return Err(StepError::invalid_output(format!(
                        "compressed output {} is missing or empty",
                        report.target
                    )));
                }
            }
        }
        Ok(())
    }
}
