//! Discover step - lists the input directory and parses clip names.

use std::path::{Path, PathBuf};

use crate::orchestrator::errors::{StepError, StepResult};
use crate::orchestrator::step::PipelineStep;
use crate::orchestrator::types::{Context, DiscoverOutput, RunState, StepOutcome};
use crate::scan;

/// Finds the camera files of the configured model.
///
/// Files that are not camera files (wrong extension or suffix) are ignored.
/// Files that look like camera files but whose timestamp does not parse are
/// reported as malformed and excluded. A missing input directory turns the
/// run into a compress-only run over the output directory.
pub struct DiscoverStep;

impl DiscoverStep {
    pub fn new() -> Self {
        Self
    }
}

/// Absolute form of `path` with symlinks resolved for the part that exists.
fn resolve(path: &Path) -> PathBuf {
    let absolute = std::path::absolute(path).unwrap_or_else(|_| path.to_path_buf());

    let mut existing = absolute.as_path();
    let mut missing = Vec::new();
    loop {
        if let Ok(canonical) = existing.canonicalize() {
            return missing
                .iter()
                .rev()
                .fold(canonical, |acc: PathBuf, name| acc.join(name));
        }
        match (existing.parent(), existing.file_name()) {
            (Some(parent), Some(name)) => {
                missing.push(name.to_os_string());
                existing = parent;
            }
            _ => return absolute,
        }
    }
}

impl Default for DiscoverStep {
    fn default() -> Self {
        Self::new()
    }
}

impl PipelineStep for DiscoverStep {
    fn name(&self) -> &str {
        "Discover"
    }

    fn description(&self) -> &str {
        "List and parse raw clips"
    }

    fn validate_input(&self, ctx: &Context) -> StepResult<()> {
        if ctx.output_dir.as_os_str().is_empty() {
            return Err(StepError::invalid_input("output folder is not set"));
        }
        if ctx.output_dir.exists() && !ctx.output_dir.is_dir() {
            return Err(StepError::invalid_input(format!(
                "output path {} is not a directory",
                ctx.output_dir.display()
            )));
        }

        // Cleanup acts on the output directory, so it must never see raw clips.
        if !ctx.input_dir.as_os_str().is_empty() && ctx.input_dir.is_dir() {
            let input = resolve(&ctx.input_dir);
            let output = resolve(&ctx.output_dir);
            if output.starts_with(&input) {
                return Err(StepError::invalid_input(format!(
                    "output folder {} must be outside the input folder {}",
                    output.display(),
                    input.display()
                )));
            }
        }
        Ok(())
    }

    fn execute(&self, ctx: &Context, state: &mut RunState) -> StepResult<StepOutcome> {
        if ctx.input_dir.as_os_str().is_empty() || !ctx.input_dir.is_dir() {
            state.discover = Some(DiscoverOutput {
                compress_only: true,
                ..Default::default()
            });
            return Ok(StepOutcome::Skipped(format!(
                "input directory '{}' not found, compressing existing outputs only",
                ctx.input_dir.display()
            )));
        }

        let files = scan::list_files(&ctx.input_dir)
            .map_err(|e| StepError::io_error("listing input directory", e))?;

        let mut output = DiscoverOutput::default();
        for path in &files {
            match ctx.grammar.clip_from_path(path) {
                Ok(Some(clip)) => output.clips.push(clip),
                Ok(None) => {
                    ctx.logger
                        .debug(&format!("Ignoring {}", path.display()));
                }
                Err(e) => {
                    ctx.logger.warn(&e.to_string());
                    output.malformed.push(
                        path.file_name()
                            .map(|n| n.to_string_lossy().to_string())
                            .unwrap_or_default(),
                    );
                }
            }
        }

        if output.clips.is_empty() {
            ctx.logger.info(&format!(
                "No {} clips in {}",
                ctx.settings.camera.model,
                ctx.input_dir.display()
            ));
        } else {
            ctx.logger.info(&format!(
                "Found {} {} clip(s) ({} other file(s), {} malformed)",
                output.clips.len(),
                ctx.settings.camera.model,
                files.len() - output.clips.len() - output.malformed.len(),
                output.malformed.len()
            ));
        }

        state.discover = Some(output);
        Ok(StepOutcome::Success)
    }

    fn validate_output(&self, _ctx: &Context, state: &RunState) -> StepResult<()> {
        if !state.has_discovery() {
            return Err(StepError::invalid_output("discovery result not recorded"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn resolve_keeps_missing_tail() {
        let dir = tempdir().unwrap();
        let base = dir.path().canonicalize().unwrap();

        assert_eq!(resolve(dir.path()), base);
        assert_eq!(
            resolve(&dir.path().join("out/sub")),
            base.join("out").join("sub")
        );
    }

    #[test]
    fn resolve_sees_through_dot_segments() {
        let dir = tempdir().unwrap();
        fs::create_dir(dir.path().join("input")).unwrap();
        let base = dir.path().canonicalize().unwrap();

        assert_eq!(
            resolve(&dir.path().join("input/../input")),
            base.join("input")
        );
    }
}
