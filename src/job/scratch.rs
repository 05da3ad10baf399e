use serde::Serialize;
use tracing::{debug, warn};

use crate::engine::EngineHandle;

/// What a virtual file is used for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FilePurpose {
    Input,
    ProbeOutput,
    EncodedOutput,
}

/// A named blob inside the engine's filesystem, owned by one job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VirtualFileHandle {
    pub name: String,
    pub purpose: FilePurpose,
}

/// Ledger of the virtual files a job may have created.
///
/// Files are tracked before the call that creates them, so a write or
/// exec that fails halfway still gets cleaned up. Each tracked file is
/// deleted at most once; delete failures are logged and dropped so they
/// never replace the job's real error.
#[derive(Debug, Default)]
pub struct JobScratch {
    files: Vec<VirtualFileHandle>,
}

impl JobScratch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn track<S: Into<String>>(&mut self, name: S, purpose: FilePurpose) -> VirtualFileHandle {
        let handle = VirtualFileHandle {
            name: name.into(),
            purpose,
        };
        if !self.files.contains(&handle) {
            self.files.push(handle.clone());
        }
        handle
    }

    pub fn tracked(&self) -> &[VirtualFileHandle] {
        &self.files
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    /// Delete one tracked file now. Untracked names are ignored.
    pub async fn release(&mut self, engine: &EngineHandle<'_>, name: &str) {
        if let Some(idx) = self.files.iter().position(|f| f.name == name) {
            let handle = self.files.remove(idx);
            delete_quietly(engine, &handle).await;
        }
    }

    /// Delete everything still tracked.
    pub async fn release_all(&mut self, engine: &EngineHandle<'_>) {
        for handle in std::mem::take(&mut self.files) {
            delete_quietly(engine, &handle).await;
        }
    }
}

async fn delete_quietly(engine: &EngineHandle<'_>, handle: &VirtualFileHandle) {
    match engine.delete_file(&handle.name).await {
        Ok(true) => debug!("Deleted {:?} file {}", handle.purpose, handle.name),
        Ok(false) => debug!("{:?} file {} was never created", handle.purpose, handle.name),
        Err(e) => warn!("Failed to delete {:?} file {}: {}", handle.purpose, handle.name, e),
    }
}
