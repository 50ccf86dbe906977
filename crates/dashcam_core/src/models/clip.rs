//! Clip and session structures.

use std::path::{Path, PathBuf};

use chrono::NaiveDateTime;

use super::enums::Channel;

/// A single camera file, as listed from disk.
///
/// Concatenated session outputs are named after their first clip, so they
/// parse into this same shape when the output directory is listed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClipFile {
    /// Full path to the file.
    pub path: PathBuf,
    /// File name (the grammar input).
    pub name: String,
    /// Lens channel from the filename suffix.
    pub channel: Channel,
    /// Naive capture timestamp. Only used for interval arithmetic.
    pub timestamp: NaiveDateTime,
    /// File name with channel suffix and extension removed.
    pub stem: String,
}

impl ClipFile {
    /// Signed seconds from `earlier` to this clip.
    pub fn seconds_since(&self, earlier: &ClipFile) -> i64 {
        (self.timestamp - earlier.timestamp).num_seconds()
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// One continuous recording: contiguous clips of a single channel.
///
/// Never empty. Its identity is the file name of the first clip.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    clips: Vec<ClipFile>,
}

impl Session {
    /// Start a session with its first clip.
    pub fn new(first: ClipFile) -> Self {
        Self { clips: vec![first] }
    }

    /// Append a clip that continues this session.
    pub fn push(&mut self, clip: ClipFile) {
        self.clips.push(clip);
    }

    /// Identity used for the concatenated output name and resume checks.
    pub fn identity(&self) -> &str {
        &self.first().name
    }

    /// Output stem of the first clip.
    pub fn stem(&self) -> &str {
        &self.first().stem
    }

    pub fn channel(&self) -> Channel {
        self.first().channel
    }

    pub fn first(&self) -> &ClipFile {
        &self.clips[0]
    }

    pub fn clips(&self) -> &[ClipFile] {
        &self.clips
    }

    pub fn len(&self) -> usize {
        self.clips.len()
    }

    /// Always false; kept for API symmetry with `len`.
    pub fn is_empty(&self) -> bool {
        self.clips.is_empty()
    }

    /// Paths of all clips, in order.
    pub fn paths(&self) -> Vec<PathBuf> {
        self.clips.iter().map(|c| c.path.clone()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn clip(name: &str, secs: u32) -> ClipFile {
        let ts = NaiveDate::from_ymd_opt(2020, 1, 1)
            .unwrap()
            .and_hms_opt(12, 0, 0)
            .unwrap()
            + chrono::TimeDelta::seconds(secs as i64);
        ClipFile {
            path: PathBuf::from("/in").join(name),
            name: name.to_string(),
            channel: Channel::Front,
            timestamp: ts,
            stem: name.trim_end_matches("_a.MP4").to_string(),
        }
    }

    #[test]
    fn session_identity_is_first_clip() {
        let mut session = Session::new(clip("first_a.MP4", 0));
        session.push(clip("second_a.MP4", 300));

        assert_eq!(session.identity(), "first_a.MP4");
        assert_eq!(session.stem(), "first");
        assert_eq!(session.len(), 2);
        assert_eq!(session.paths()[1], PathBuf::from("/in/second_a.MP4"));
    }

    #[test]
    fn seconds_since_is_signed() {
        let a = clip("a_a.MP4", 0);
        let b = clip("b_a.MP4", 300);
        assert_eq!(b.seconds_since(&a), 300);
        assert_eq!(a.seconds_since(&b), -300);
    }
}
