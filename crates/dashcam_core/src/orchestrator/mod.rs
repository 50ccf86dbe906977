//! Pipeline orchestrator.
//!
//! A run is a fixed sequence of steps sharing a read-only [`Context`] and
//! a mutable [`RunState`]:
//!
//! ```text
//! Pipeline
//!     ├── Step: Discover     (list + parse raw clips)
//!     ├── Step: Concatenate  (cluster per channel, join each session)
//!     └── Step: Compress     (pair outputs, encode, mark, clean up)
//! ```
//!
//! Every job consults the resume guard first, so re-running over the same
//! directories only does the work that is still missing.
//!
//! # Example
//!
//! ```ignore
//! use dashcam_core::orchestrator::{create_standard_pipeline, Context, RunState};
//!
//! let pipeline = create_standard_pipeline();
//! let ctx = Context::new(settings, "run_1", transcoder, logger)
//!     .with_cancel_handle(pipeline.cancel_handle());
//! let mut state = RunState::new("run_1");
//!
//! pipeline.run(&ctx, &mut state)?;
//! println!("{} failed", state.failed_count());
//! ```

mod errors;
mod pipeline;
mod step;
pub mod steps;
mod types;

pub use errors::{PipelineError, PipelineResult, StepError, StepResult};
pub use pipeline::{CancelHandle, Pipeline, PipelineRunResult};
pub use step::PipelineStep;
pub use steps::{CompressStep, ConcatenateStep, DiscoverStep};
pub use types::{
    Context, DiscoverOutput, JobReport, JobStatus, RunState, RunSummary, StepOutcome,
};

/// Create the standard pipeline: Discover, Concatenate, Compress.
pub fn create_standard_pipeline() -> Pipeline {
    Pipeline::new()
        .with_step(DiscoverStep::new())
        .with_step(ConcatenateStep::new())
        .with_step(CompressStep::new())
}
