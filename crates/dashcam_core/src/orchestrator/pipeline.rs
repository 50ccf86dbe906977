//! Pipeline runner that executes steps in sequence.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use super::errors::{PipelineError, PipelineResult, StepError};
use super::step::PipelineStep;
use super::types::{Context, RunState, StepOutcome};

/// Pipeline that runs a sequence of steps.
///
/// Steps run in order with validation before and after each one.
/// Cancellation is checked at every step boundary; steps also check it
/// between jobs through the [`Context`].
pub struct Pipeline {
    steps: Vec<Box<dyn PipelineStep>>,
    cancelled: Arc<AtomicBool>,
}

impl Pipeline {
    pub fn new() -> Self {
        Self {
            steps: Vec::new(),
            cancelled: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn add_step<S: PipelineStep + 'static>(&mut self, step: S) -> &mut Self {
        self.steps.push(Box::new(step));
        self
    }

    /// Add a step (builder pattern).
    pub fn with_step<S: PipelineStep + 'static>(mut self, step: S) -> Self {
        self.add_step(step);
        self
    }

    /// Get a cancellation handle.
    pub fn cancel_handle(&self) -> CancelHandle {
        CancelHandle {
            flag: Arc::clone(&self.cancelled),
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// Run the pipeline.
    ///
    /// For each step:
    /// 1. Check for cancellation
    /// 2. Run `validate_input`
    /// 3. Run `execute`
    /// 4. Run `validate_output` (if execute returned Success)
    pub fn run(&self, ctx: &Context, state: &mut RunState) -> PipelineResult<PipelineRunResult> {
        let mut result = PipelineRunResult {
            steps_completed: Vec::new(),
            steps_skipped: Vec::new(),
        };

        for step in &self.steps {
            let step_name = step.name();

            if self.is_cancelled() || ctx.is_cancelled() {
                ctx.logger
                    .warn(&format!("Pipeline cancelled before step '{}'", step_name));
                return Err(PipelineError::cancelled(&ctx.run_name));
            }

            ctx.logger.phase(step_name);

            ctx.logger
                .debug(&format!("Validating input for '{}'", step_name));
            if let Err(e) = step.validate_input(ctx) {
                ctx.logger.error(&format!("Input validation failed: {}", e));
                return Err(PipelineError::step_failed(&ctx.run_name, step_name, e));
            }

            ctx.logger
                .debug(&format!("Executing '{}': {}", step_name, step.description()));
            let outcome = match step.execute(ctx, state) {
                Ok(outcome) => outcome,
                Err(StepError::Cancelled) => {
                    ctx.logger
                        .warn(&format!("Pipeline cancelled during step '{}'", step_name));
                    return Err(PipelineError::cancelled(&ctx.run_name));
                }
                Err(e) => {
                    ctx.logger.error(&format!("Execution failed: {}", e));
                    return Err(PipelineError::step_failed(&ctx.run_name, step_name, e));
                }
            };

            match outcome {
                StepOutcome::Success => {
                    ctx.logger
                        .debug(&format!("Validating output for '{}'", step_name));
                    if let Err(e) = step.validate_output(ctx, state) {
                        ctx.logger.error(&format!("Output validation failed: {}", e));
                        return Err(PipelineError::step_failed(&ctx.run_name, step_name, e));
                    }

                    ctx.logger.success(&format!("{} completed", step_name));
                    result.steps_completed.push(step_name.to_string());
                }
                StepOutcome::Skipped(reason) => {
                    ctx.logger.info(&format!("{} skipped: {}", step_name, reason));
                    result.steps_skipped.push(step_name.to_string());
                }
            }
        }

        let failed = state.failed_count();
        if failed == 0 {
            ctx.logger.success("Pipeline completed successfully");
        } else {
            ctx.logger
                .warn(&format!("Pipeline completed with {} failed job(s)", failed));
        }

        Ok(result)
    }

    /// Step names in order.
    pub fn step_names(&self) -> Vec<&str> {
        self.steps.iter().map(|s| s.name()).collect()
    }
}

impl Default for Pipeline {
    fn default() -> Self {
        Self::new()
    }
}

/// Handle for cancelling a running pipeline.
#[derive(Clone)]
pub struct CancelHandle {
    flag: Arc<AtomicBool>,
}

impl CancelHandle {
    /// Cancel the pipeline. It stops before the next job or step.
    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }

    /// The underlying flag, for registering signal handlers.
    pub fn as_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.flag)
    }
}

/// Result of a pipeline run.
#[derive(Debug, Clone)]
pub struct PipelineRunResult {
    /// Steps that completed successfully.
    pub steps_completed: Vec<String>,
    /// Steps that had nothing to do.
    pub steps_skipped: Vec<String>,
}

impl PipelineRunResult {
    pub fn all_completed(&self) -> bool {
        self.steps_skipped.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Settings;
    use crate::logging::{LogConfig, RunLogger};
    use crate::orchestrator::errors::StepResult;
    use crate::transcoder::{TranscodeOutput, TranscodeRequest, TranscodeResult, Transcoder};
    use std::sync::atomic::AtomicUsize;
    use tempfile::tempdir;

    struct NoopTranscoder;

    impl Transcoder for NoopTranscoder {
        fn name(&self) -> &str {
            "noop"
        }

        fn invoke(&self, _request: &TranscodeRequest) -> TranscodeResult<TranscodeOutput> {
            Ok(TranscodeOutput::default())
        }
    }

    struct CountingStep {
        name: &'static str,
        execute_count: Arc<AtomicUsize>,
        outcome: fn() -> StepResult<StepOutcome>,
    }

    impl CountingStep {
        fn new(name: &'static str, outcome: fn() -> StepResult<StepOutcome>) -> Self {
            Self {
                name,
                execute_count: Arc::new(AtomicUsize::new(0)),
                outcome,
            }
        }
    }

    impl PipelineStep for CountingStep {
        fn name(&self) -> &str {
            self.name
        }

        fn validate_input(&self, _ctx: &Context) -> StepResult<()> {
            Ok(())
        }

        fn execute(&self, _ctx: &Context, _state: &mut RunState) -> StepResult<StepOutcome> {
            self.execute_count.fetch_add(1, Ordering::SeqCst);
            (self.outcome)()
        }

        fn validate_output(&self, _ctx: &Context, _state: &RunState) -> StepResult<()> {
            Ok(())
        }
    }

    fn context(dir: &std::path::Path) -> Context {
        let logger = RunLogger::new("test_run", dir, LogConfig::default()).unwrap();
        Context::new(
            Settings::default(),
            "test_run",
            Arc::new(NoopTranscoder),
            Arc::new(logger),
        )
    }

    #[test]
    fn pipeline_builds_correctly() {
        let pipeline = Pipeline::new()
            .with_step(CountingStep::new("Step1", || Ok(StepOutcome::Success)))
            .with_step(CountingStep::new("Step2", || Ok(StepOutcome::Success)));

        assert_eq!(pipeline.step_names(), vec!["Step1", "Step2"]);
    }

    #[test]
    fn runs_steps_and_tracks_skips() {
        let dir = tempdir().unwrap();
        let ctx = context(dir.path());
        let mut state = RunState::new("r");

        let pipeline = Pipeline::new()
            .with_step(CountingStep::new("A", || Ok(StepOutcome::Success)))
            .with_step(CountingStep::new("B", || {
                Ok(StepOutcome::Skipped("nothing to do".into()))
            }));

        let result = pipeline.run(&ctx, &mut state).unwrap();
        assert_eq!(result.steps_completed, vec!["A"]);
        assert_eq!(result.steps_skipped, vec!["B"]);
        assert!(!result.all_completed());
    }

    #[test]
    fn step_error_aborts_run() {
        let dir = tempdir().unwrap();
        let ctx = context(dir.path());
        let mut state = RunState::new("r");

        let after = CountingStep::new("After", || Ok(StepOutcome::Success));
        let after_count = Arc::clone(&after.execute_count);
        let pipeline = Pipeline::new()
            .with_step(CountingStep::new("Broken", || {
                Err(StepError::invalid_input("bad"))
            }))
            .with_step(after);

        let err = pipeline.run(&ctx, &mut state).unwrap_err();
        assert!(matches!(err, PipelineError::StepFailed { .. }));
        assert_eq!(after_count.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn cancelled_step_maps_to_cancelled_run() {
        let dir = tempdir().unwrap();
        let ctx = context(dir.path());
        let mut state = RunState::new("r");

        let pipeline =
            Pipeline::new().with_step(CountingStep::new("Jobs", || Err(StepError::Cancelled)));

        assert!(matches!(
            pipeline.run(&ctx, &mut state),
            Err(PipelineError::Cancelled { .. })
        ));
    }

    #[test]
    fn cancel_before_start_runs_nothing() {
        let dir = tempdir().unwrap();
        let step = CountingStep::new("Step", || Ok(StepOutcome::Success));
        let count = Arc::clone(&step.execute_count);
        let pipeline = Pipeline::new().with_step(step);

        let handle = pipeline.cancel_handle();
        let ctx = context(dir.path()).with_cancel_handle(handle.clone());
        handle.cancel();
        assert!(pipeline.is_cancelled());
        assert!(ctx.is_cancelled());

        let mut state = RunState::new("r");
        assert!(pipeline.run(&ctx, &mut state).is_err());
        assert_eq!(count.load(Ordering::SeqCst), 0);
    }
}
