use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{info, warn};

use crate::error::{ClipfitError, Result};
use crate::input::MediaInput;
use crate::job::{JobResult, Orchestrator, Stage};

/// Result for one input, in input order.
#[derive(Debug, Serialize)]
pub struct FileReport {
    pub name: String,
    pub result: JobResult,
}

#[derive(Debug, Default, Serialize)]
pub struct BatchReport {
    pub results: Vec<FileReport>,
}

impl BatchReport {
    pub fn succeeded(&self) -> usize {
        self.results.iter().filter(|r| r.result.is_success()).count()
    }

    pub fn skipped(&self) -> usize {
        self.results.iter().filter(|r| r.result.is_skipped()).count()
    }

    pub fn failed(&self) -> usize {
        self.results.iter().filter(|r| r.result.is_failed()).count()
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

/// Runs a selection of files through the orchestrator one at a time.
///
/// Jobs share the engine's filesystem and there is no per-job
/// namespacing, so files are never processed concurrently, and a second
/// batch cannot start while one is running.
pub struct BatchDriver {
    orchestrator: Orchestrator,
    busy: AtomicBool,
}

impl BatchDriver {
    pub fn new(orchestrator: Orchestrator) -> Self {
        Self {
            orchestrator,
            busy: AtomicBool::new(false),
        }
    }

    pub fn orchestrator(&self) -> &Orchestrator {
        &self.orchestrator
    }

    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::Acquire)
    }

    /// Process every input in order. One file failing never stops the
    /// others; an engine that cannot load or has aborted stops the batch.
    ///
    /// Each input is read just before its job and dropped right after it.
    pub async fn run(&self, inputs: Vec<MediaInput>) -> Result<BatchReport> {
        let _busy = BusyGuard::enter(&self.busy)?;
        info!("Starting batch of {} files", inputs.len());

        self.orchestrator.engine().acquire().await?;

        let mut report = BatchReport::default();
        for input in inputs {
            let name = input.name();
            let result = match input.load().await {
                Ok(file) => self.orchestrator.run(&file).await?,
                Err(e) => {
                    warn!("Failed to read {}: {}", name, e);
                    JobResult::Failed {
                        stage: Stage::StageIn,
                        cause: e.in_stage(ClipfitError::StageIn),
                    }
                }
            };
            report.results.push(FileReport { name, result });
        }

        info!(
            "Batch finished: {} succeeded, {} skipped, {} failed",
            report.succeeded(),
            report.skipped(),
            report.failed()
        );
        Ok(report)
    }
}

/// Marks the driver busy for as long as it is alive.
struct BusyGuard<'a> {
    flag: &'a AtomicBool,
}

impl<'a> BusyGuard<'a> {
    fn enter(flag: &'a AtomicBool) -> Result<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map_err(|_| ClipfitError::Busy)?;
        Ok(Self { flag })
    }
}

impl Drop for BusyGuard<'_> {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::Release);
    }
}
