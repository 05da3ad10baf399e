//! Clipfit - Size-Capped Video Transcoding
//!
//! Fits video clips under an upload size cap: probes each clip's
//! duration, plans audio and video bitrates that keep the output under
//! the target, and drives an ffmpeg engine through a staged job
//! pipeline that cleans up after itself on every exit path.

pub mod cli;
pub mod config;
pub mod engine;
pub mod planner;
pub mod probe;
pub mod job;
pub mod batch;
pub mod input;
pub mod output;
pub mod progress;
pub mod error;
