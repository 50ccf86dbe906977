//! Pipeline step implementations.
//!
//! - Discover - list and parse the raw clips
//! - Concatenate - join each session into one file per channel
//! - Compress - pair session outputs and encode them

mod compress;
mod concatenate;
mod discover;

pub use compress::CompressStep;
pub use concatenate::ConcatenateStep;
pub use discover::DiscoverStep;

use std::fs;
use std::path::Path;

use crate::resume::{output_is_complete, partial_path};
use crate::transcoder::{TranscodeError, TranscodeRequest};

use super::types::Context;

/// Produce `target` through its hidden partial path.
///
/// `write` fills the partial file. The partial only replaces `target` when
/// it is non-empty; on any failure it is removed and `target` is left as
/// it was.
fn write_via_partial<F>(ctx: &Context, target: &Path, write: F) -> Result<(), String>
where
    F: FnOnce(&Path) -> Result<(), String>,
{
    let partial = partial_path(target);
    if partial.exists() {
        ctx.logger
            .debug(&format!("Removing stale {}", partial.display()));
        let _ = fs::remove_file(&partial);
    }

    if let Err(e) = write(&partial) {
        let _ = fs::remove_file(&partial);
        return Err(e);
    }

    if !output_is_complete(&partial) {
        let _ = fs::remove_file(&partial);
        return Err(TranscodeError::OutputMissing {
            tool: ctx.transcoder.name().to_string(),
            output: target.to_path_buf(),
        }
        .to_string());
    }

    fs::rename(&partial, target).map_err(|e| {
        let _ = fs::remove_file(&partial);
        format!("Failed to move result into {}: {}", target.display(), e)
    })
}

/// Invoke the transcoder, routing its stderr through the run logger.
fn run_transcoder(ctx: &Context, request: &TranscodeRequest) -> Result<(), String> {
    ctx.logger.clear_tail();
    ctx.logger.command(&ctx.transcoder.describe(request));

    match ctx.transcoder.invoke(request) {
        Ok(output) => {
            for line in &output.stderr_lines {
                ctx.logger.output_line(line);
            }
            Ok(())
        }
        Err(e) => {
            for line in e.stderr_lines() {
                ctx.logger.output_line(line);
            }
            ctx.logger.show_tail(ctx.transcoder.name());
            Err(e.to_string())
        }
    }
}
