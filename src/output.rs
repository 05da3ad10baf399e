use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::info;

use crate::error::{ClipfitError, Result};

/// Receives finished outputs.
#[async_trait]
pub trait OutputSink: Send + Sync {
    /// Hand over a named output. The bytes are owned by the sink afterwards.
    async fn deliver(&self, name: &str, bytes: Vec<u8>) -> Result<()>;
}

/// Writes outputs into a directory, creating it on first use.
pub struct DirectorySink {
    dir: PathBuf,
}

impl DirectorySink {
    pub fn new<P: AsRef<Path>>(dir: P) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

#[async_trait]
impl OutputSink for DirectorySink {
    async fn deliver(&self, name: &str, bytes: Vec<u8>) -> Result<()> {
        let file_name = Path::new(name)
            .file_name()
            .ok_or_else(|| ClipfitError::Delivery(format!("invalid output name {:?}", name)))?;
        let path = self.dir.join(file_name);

        fs::create_dir_all(&self.dir)
            .await
            .map_err(|e| ClipfitError::Delivery(format!("{}: {}", self.dir.display(), e)))?;
        fs::write(&path, &bytes)
            .await
            .map_err(|e| ClipfitError::Delivery(format!("{}: {}", path.display(), e)))?;

        info!("Saved {} ({} bytes)", path.display(), bytes.len());
        Ok(())
    }
}
