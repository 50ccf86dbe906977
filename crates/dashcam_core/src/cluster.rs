//! Session clustering.
//!
//! Groups one channel's clips into maximal runs of temporally contiguous
//! files. The camera rotates to a new file every `nominal` seconds, so two
//! neighbouring clips of one recording start roughly one clip length apart.

use crate::models::{ClipFile, ContinuityRule, Session};

/// Continuity rule plus its slack, applied uniformly to a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContinuityPolicy {
    pub rule: ContinuityRule,
    pub slack_secs: i64,
}

impl ContinuityPolicy {
    pub const fn new(rule: ContinuityRule, slack_secs: i64) -> Self {
        Self { rule, slack_secs }
    }

    /// Whether a clip starting `interval_secs` after its predecessor
    /// continues the same session.
    pub fn is_contiguous(&self, interval_secs: i64, nominal_secs: i64) -> bool {
        match self.rule {
            ContinuityRule::WithinDurationPlusSlack => {
                interval_secs.abs() <= nominal_secs + self.slack_secs
            }
            ContinuityRule::DeviationFromDuration => {
                (interval_secs - nominal_secs).abs() <= self.slack_secs
            }
        }
    }
}

/// Split clips into sessions.
///
/// `clips` must already be sorted by file name (timestamp order for every
/// supported grammar) and belong to a single channel; this function does
/// not re-sort. Empty input yields no sessions.
pub fn cluster(clips: Vec<ClipFile>, nominal_secs: u32, policy: ContinuityPolicy) -> Vec<Session> {
    let nominal = i64::from(nominal_secs);
    let mut sessions = Vec::new();
    let mut open: Option<Session> = None;

    for clip in clips {
        match open.as_mut() {
            Some(session) => {
                let previous = &session.clips()[session.len() - 1];
                let interval = clip.seconds_since(previous);
                if policy.is_contiguous(interval, nominal) {
                    session.push(clip);
                } else {
                    tracing::debug!(
                        "Session break before {} ({}s after {})",
                        clip.name,
                        interval,
                        previous.name
                    );
                    if let Some(done) = open.replace(Session::new(clip)) {
                        sessions.push(done);
                    }
                }
            }
            None => open = Some(Session::new(clip)),
        }
    }

    if let Some(last) = open {
        sessions.push(last);
    }

    sessions
}
