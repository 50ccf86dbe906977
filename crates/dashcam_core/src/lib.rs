//! Dashcam Core - clip reconciliation and resumable transcode orchestration.
//!
//! This crate contains all the logic with no CLI dependencies:
//! filename grammars, session clustering, front/back pairing, the resume
//! guard, and the pipeline that drives an external transcoder.

pub mod cluster;
pub mod config;
pub mod grammar;
pub mod logging;
pub mod models;
pub mod orchestrator;
pub mod pairing;
pub mod resume;
pub mod scan;
pub mod transcoder;

/// Returns the crate version.
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
