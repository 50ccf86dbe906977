//! Completion markers.
//!
//! After a compression job succeeds, a small JSON file records which
//! session outputs it consumed. A later run can then tell that a session is
//! done even after its concatenated file was archived or deleted, without
//! guessing from output file names.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::transcoder::TranscodeMode;

/// Marker directory, relative to the output directory.
pub const MARKER_DIR: &str = ".dashcam/markers";

const MARKER_VERSION: u32 = 1;

/// Record of one completed compression job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompletionMarker {
    /// Marker format version.
    pub version: u32,
    /// File name of the compressed output.
    pub output: String,
    pub mode: TranscodeMode,
    /// Identities (file names) of the consumed session outputs.
    pub inputs: Vec<String>,
    /// RFC 3339 local time of completion.
    pub completed_at: String,
}

impl CompletionMarker {
    pub fn new(output: impl Into<String>, mode: TranscodeMode, inputs: Vec<String>) -> Self {
        Self {
            version: MARKER_VERSION,
            output: output.into(),
            mode,
            inputs,
            completed_at: chrono::Local::now().to_rfc3339(),
        }
    }
}

/// Markers of one output directory, loaded once per run.
#[derive(Debug)]
pub struct MarkerStore {
    dir: PathBuf,
    markers: Vec<CompletionMarker>,
}

impl MarkerStore {
    /// Load every marker under `<output_dir>/.dashcam/markers`.
    ///
    /// Unreadable or invalid marker files are logged and ignored; the
    /// filesystem checks still cover those outputs.
    pub fn load(output_dir: &Path) -> Self {
        let dir = output_dir.join(MARKER_DIR);
        let mut markers = Vec::new();

        let entries = match fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(_) => return Self { dir, markers },
        };

        for entry in entries.flatten() {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            match fs::read_to_string(&path) {
                Ok(content) => match serde_json::from_str::<CompletionMarker>(&content) {
                    Ok(marker) => markers.push(marker),
                    Err(e) => tracing::warn!("Ignoring marker {}: {}", path.display(), e),
                },
                Err(e) => tracing::warn!("Failed to read marker {}: {}", path.display(), e),
            }
        }

        tracing::debug!("Loaded {} completion marker(s)", markers.len());
        Self { dir, markers }
    }

    /// The marker that consumed `identity`, if any.
    pub fn records_input(&self, identity: &str) -> Option<&CompletionMarker> {
        self.markers
            .iter()
            .find(|m| m.inputs.iter().any(|i| i == identity))
    }

    /// Persist a marker as `<output>.json` and keep it in memory.
    pub fn record(&mut self, marker: CompletionMarker) -> io::Result<()> {
        fs::create_dir_all(&self.dir)?;

        let path = self.dir.join(format!("{}.json", marker.output));
        let json = serde_json::to_string_pretty(&marker)
            .map_err(|e| io::Error::new(io::ErrorKind::Other, e))?;

        let temp_file = path.with_extension("json.tmp");
        fs::write(&temp_file, &json)?;
        fs::rename(&temp_file, &path)?;

        self.markers.retain(|m| m.output != marker.output);
        self.markers.push(marker);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn markers_survive_reload() {
        let dir = tempdir().unwrap();

        let mut store = MarkerStore::load(dir.path());
        assert!(store.markers.is_empty());

        store
            .record(CompletionMarker::new(
                "2020_0101_120000_00.mp4",
                TranscodeMode::Composite,
                vec![
                    "2020_0101_120000_00_a.MP4".to_string(),
                    "2020_0101_120003_00_b.MP4".to_string(),
                ],
            ))
            .unwrap();

        let reloaded = MarkerStore::load(dir.path());
        assert_eq!(reloaded.markers.len(), 1);
        let marker = reloaded.records_input("2020_0101_120003_00_b.MP4").unwrap();
        assert_eq!(marker.output, "2020_0101_120000_00.mp4");
        assert_eq!(marker.mode, TranscodeMode::Composite);
        assert!(reloaded.records_input("2020_0101_130000_00_a.MP4").is_none());

        assert!(dir
            .path()
            .join(MARKER_DIR)
            .join("2020_0101_120000_00.mp4.json")
            .exists());
    }

    #[test]
    fn rerecording_replaces_in_memory_entry() {
        let dir = tempdir().unwrap();
        let mut store = MarkerStore::load(dir.path());

        let first = CompletionMarker::new("x.mp4", TranscodeMode::Solo, vec!["a".into()]);
        let second = CompletionMarker::new("x.mp4", TranscodeMode::Solo, vec!["b".into()]);
        store.record(first).unwrap();
        store.record(second).unwrap();

        assert_eq!(store.markers.len(), 1);
        assert!(store.records_input("a").is_none());
        assert_eq!(MarkerStore::load(dir.path()).markers.len(), 1);
    }

    #[test]
    fn invalid_marker_is_ignored() {
        let dir = tempdir().unwrap();
        let marker_dir = dir.path().join(MARKER_DIR);
        fs::create_dir_all(&marker_dir).unwrap();
        fs::write(marker_dir.join("broken.mp4.json"), "{ not json").unwrap();
        fs::write(marker_dir.join("notes.txt"), "hello").unwrap();

        assert!(MarkerStore::load(dir.path()).markers.is_empty());
    }
}
