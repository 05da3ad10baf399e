// Engine client adapter
//
// The encoding engine is consumed as a black box exposing a small
// capability set (load, virtual file IO, exec, probe) plus log and
// progress events:
// - EngineBackend: the raw capability surface an engine implements
// - client: lazily loaded, shared handle with typed outcomes
// - commands: argument vector builders for encode and probe calls
// - process: native backend driving ffmpeg/ffprobe binaries

pub mod client;
pub mod commands;
pub mod process;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::mpsc;

pub use client::*;
pub use commands::*;

use crate::error::Result;

/// Log messages starting with this mark an unrecoverable engine worker.
pub const FATAL_LOG_PREFIX: &str = "Aborted(";

/// Conventional success status for exec and probe.
pub const SUCCESS_STATUS: i32 = 0;

/// Status the probe reports on success when its report is redirected
/// into a virtual file with `-o`. Only honored for probe calls.
pub const PROBE_REDIRECT_SUCCESS_STATUS: i32 = -1;

/// One progress event from a running exec.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Progress {
    /// Fraction complete, 0.0 to 1.0.
    pub ratio: f64,
    /// Media time encoded so far, in microseconds.
    pub time_us: i64,
}

/// Per-call progress channel. Dropped when the call returns.
pub type ProgressSink = mpsc::UnboundedSender<Progress>;

/// Receives every engine log line for the lifetime of the engine.
pub type LogSink = Arc<dyn Fn(&str) + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EngineVariant {
    SingleThreaded,
    MultiThreaded,
}

/// Resolved engine assets handed to `load`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadConfig {
    pub variant: EngineVariant,
    pub core_url: String,
    pub wasm_url: String,
    /// Present only for the multi-threaded variant.
    pub worker_url: Option<String>,
}

impl LoadConfig {
    /// Pick the asset set. Isolated contexts can share memory with
    /// workers, so they get the multi-threaded build.
    pub fn resolve(asset_base: &str, isolated: bool) -> Self {
        let root = asset_base.trim_end_matches('/');
        let dir = if isolated { "ffmpeg-mt/" } else { "ffmpeg/" };
        let base = if root.is_empty() {
            dir.to_string()
        } else {
            format!("{}/{}", root, dir)
        };

        Self {
            variant: if isolated {
                EngineVariant::MultiThreaded
            } else {
                EngineVariant::SingleThreaded
            },
            core_url: format!("{}ffmpeg-core.js", base),
            wasm_url: format!("{}ffmpeg-core.wasm", base),
            worker_url: isolated.then(|| format!("{}ffmpeg-core.worker.js", base)),
        }
    }
}

/// Normalized completion of an exec or probe call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Completion {
    Success,
    Failed(i32),
}

impl Completion {
    pub fn from_exec_status(status: i32) -> Self {
        if status == SUCCESS_STATUS {
            Completion::Success
        } else {
            Completion::Failed(status)
        }
    }

    /// Probe calls also accept `PROBE_REDIRECT_SUCCESS_STATUS`.
    pub fn from_probe_status(status: i32) -> Self {
        if status == SUCCESS_STATUS || status == PROBE_REDIRECT_SUCCESS_STATUS {
            Completion::Success
        } else {
            Completion::Failed(status)
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Completion::Success)
    }
}

/// Raw capability surface of an encoding engine.
///
/// Status codes are returned untouched; `EngineHandle` normalizes them.
/// A run that ends without a status (a crashed worker, a killed process)
/// is an error, never a made-up status.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait EngineBackend: Send + Sync {
    /// Load the engine and start forwarding its log lines to `logs`.
    async fn load(&self, config: &LoadConfig, logs: LogSink) -> Result<()>;

    /// Create or replace a virtual file.
    async fn write_file(&self, name: &str, data: &[u8]) -> Result<bool>;

    /// Read a virtual file's bytes.
    async fn read_file(&self, name: &str) -> Result<Vec<u8>>;

    /// Remove a virtual file.
    async fn delete_file(&self, name: &str) -> Result<bool>;

    /// Run the encoder with an argument vector.
    async fn exec(&self, args: &[String], progress: Option<ProgressSink>) -> Result<i32>;

    /// Run the metadata probe with an argument vector.
    async fn probe(&self, args: &[String]) -> Result<i32>;
}
