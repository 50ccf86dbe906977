//! Data models for dashcam-stitch.
//!
//! - Enums for channels, camera models, backends, cleanup modes
//! - Clip and session structures

mod clip;
mod enums;

// Re-export all public types
pub use clip::{ClipFile, Session};
pub use enums::{Backend, CameraModel, Channel, CleanupMode, ContinuityRule, JobKind};
