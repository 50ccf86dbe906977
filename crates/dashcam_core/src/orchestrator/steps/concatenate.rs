//! Concatenate step - joins each recording session into one file.

use std::fs;

use crate::cluster::cluster;
use crate::models::{Channel, ClipFile, JobKind, Session};
use crate::orchestrator::errors::{StepError, StepResult};
use crate::orchestrator::step::PipelineStep;
use crate::orchestrator::types::{Context, JobReport, JobStatus, RunState, StepOutcome};
use crate::resume::{output_is_complete, ResumeGuard};
use crate::transcoder::{TranscodeMode, TranscodeRequest};

use super::{run_transcoder, write_via_partial};

/// Clusters each channel's clips into sessions and writes one
/// `output_dir/<identity>` file per session.
///
/// Single-clip sessions are copied; longer ones are stream-copied through
/// the transcoder's concat mode. Raw clips are never modified.
pub struct ConcatenateStep;

impl ConcatenateStep {
    pub fn new() -> Self {
        Self
    }

    fn concatenate(&self, ctx: &Context, session: &Session, guard: &ResumeGuard) -> JobStatus {
        let target = guard.concat_target(session);

        let result = write_via_partial(ctx, &target, |partial| {
            if session.len() == 1 {
                let source = session.first().path();
                ctx.logger.command(&format!(
                    "copy {} -> {}",
                    source.display(),
                    target.display()
                ));
                fs::copy(source, partial)
                    .map(|_| ())
                    .map_err(|e| format!("Failed to copy {}: {}", source.display(), e))
            } else {
                let request =
                    TranscodeRequest::new(TranscodeMode::Concat, session.paths(), partial);
                run_transcoder(ctx, &request)
            }
        });

        match result {
            Ok(()) => {
                ctx.logger.success(&format!(
                    "{} ({} clip(s))",
                    session.identity(),
                    session.len()
                ));
                JobStatus::Completed
            }
            Err(message) => {
                ctx.logger
                    .error(&format!("{}: {}", session.identity(), message));
                JobStatus::Failed(message)
            }
        }
    }
}

impl Default for ConcatenateStep {
    fn default() -> Self {
        Self::new()
    }
}

impl PipelineStep for ConcatenateStep {
    fn name(&self) -> &str {
        "Concatenate"
    }

    fn description(&self) -> &str {
        "Join contiguous clips into one file per session"
    }

    fn validate_input(&self, ctx: &Context) -> StepResult<()> {
        if ctx.settings.camera.clip_length_secs == 0 {
            return Err(StepError::invalid_input("clip length must be positive"));
        }
        Ok(())
    }

    fn execute(&self, ctx: &Context, state: &mut RunState) -> StepResult<StepOutcome> {
        let clips: Vec<ClipFile> = match &state.discover {
            Some(discover) if discover.compress_only => {
                return Ok(StepOutcome::Skipped("compress-only run".to_string()));
            }
            Some(discover) => discover.clips.clone(),
            None => return Err(StepError::invalid_input("Discover has not run")),
        };

        if clips.is_empty() {
            return Ok(StepOutcome::Skipped("no clips to concatenate".to_string()));
        }

        fs::create_dir_all(&ctx.output_dir)
            .map_err(|e| StepError::io_error("creating output directory", e))?;

        let guard = ResumeGuard::new(
            &ctx.output_dir,
            ctx.grammar,
            ctx.settings.camera.pair_tolerance_secs,
        );
        let policy = ctx.continuity_policy();
        let nominal = ctx.settings.camera.clip_length_secs;

        for channel in Channel::ALL {
            let channel_clips: Vec<ClipFile> =
                clips.iter().filter(|c| c.channel == channel).cloned().collect();
            if channel_clips.is_empty() {
                continue;
            }

            let sessions = cluster(channel_clips, nominal, policy);
            ctx.logger.section(&format!(
                "{} channel: {} session(s)",
                channel,
                sessions.len()
            ));

            for session in &sessions {
                if ctx.is_cancelled() {
                    return Err(StepError::Cancelled);
                }

                let target = guard.concat_target(session);
                let skip = guard
                    .check_concatenate(session)
                    .map_err(|e| StepError::io_error("listing output directory", e))?;

                let status = match skip {
                    Some(reason) => {
                        ctx.logger
                            .skip(&format!("{}: {}", session.identity(), reason));
                        JobStatus::Skipped(reason)
                    }
                    None => self.concatenate(ctx, session, &guard),
                };
                state.record(JobReport::new(JobKind::Concatenate, &target, status));
            }
        }

        Ok(StepOutcome::Success)
    }

    fn validate_output(&self, ctx: &Context, state: &RunState) -> StepResult<()> {
        for report in state.reports_of(JobKind::Concatenate) {
            if report.status == JobStatus::Completed
                && !output_is_complete(&ctx.output_dir.join(&report.target))
            {
                return Err(StepError::invalid_output(format!(
                    "session output {} is missing or empty",
                    report.target
                )));
            }
        }
        Ok(())
    }
}
