use std::sync::{Arc, OnceLock};
use tokio::sync::OnceCell;
use tracing::{debug, error, info};

use crate::error::{ClipfitError, Result};
use super::{Completion, EngineBackend, LoadConfig, LogSink, ProgressSink, FATAL_LOG_PREFIX};

/// Shared, lazily loaded engine.
///
/// One instance is shared by every job in a session. The first
/// `acquire` performs the load; callers arriving while it is in flight
/// wait for the same attempt. A failed load leaves the client unloaded
/// so the next `acquire` tries again.
pub struct EngineClient {
    backend: Arc<dyn EngineBackend>,
    load_config: LoadConfig,
    loaded: OnceCell<()>,
    fault: Arc<OnceLock<String>>,
}

impl EngineClient {
    pub fn new(backend: Arc<dyn EngineBackend>, load_config: LoadConfig) -> Self {
        Self {
            backend,
            load_config,
            loaded: OnceCell::new(),
            fault: Arc::new(OnceLock::new()),
        }
    }

    /// Load the engine if needed and return a handle to it.
    pub async fn acquire(&self) -> Result<EngineHandle<'_>> {
        self.loaded.get_or_try_init(|| self.load()).await?;
        self.check_fault()?;
        Ok(EngineHandle { client: self })
    }

    pub fn is_loaded(&self) -> bool {
        self.loaded.initialized()
    }

    /// First fatal log line seen, if any. Once set the engine is unusable.
    pub fn fatal_fault(&self) -> Option<&str> {
        self.fault.get().map(String::as_str)
    }

    async fn load(&self) -> Result<()> {
        info!("Loading encoding engine ({:?})", self.load_config.variant);
        debug!("Engine assets: {:?}", self.load_config);

        let fault = Arc::clone(&self.fault);
        let logs: LogSink = Arc::new(move |message: &str| {
            if message.starts_with(FATAL_LOG_PREFIX) {
                error!("Engine worker aborted: {}", message);
                let _ = fault.set(message.to_string());
            } else {
                info!(target: "clipfit::engine", "{}", message);
            }
        });

        self.backend
            .load(&self.load_config, logs)
            .await
            .map_err(|e| ClipfitError::LoadFailed(e.to_string()))?;

        info!("Encoding engine loaded");
        Ok(())
    }

    fn check_fault(&self) -> Result<()> {
        match self.fault.get() {
            Some(message) => Err(ClipfitError::FatalEngineFault(message.clone())),
            None => Ok(()),
        }
    }
}

/// Capability calls on a loaded engine.
///
/// Every call reports a latched fatal fault in preference to its own
/// result, since nothing the engine returns after an abort can be trusted.
#[derive(Clone, Copy)]
pub struct EngineHandle<'a> {
    client: &'a EngineClient,
}

impl<'a> EngineHandle<'a> {
    pub async fn write_file(&self, name: &str, data: &[u8]) -> Result<()> {
        let written = self.client.backend.write_file(name, data).await;
        self.client.check_fault()?;
        if written? {
            Ok(())
        } else {
            Err(ClipfitError::Engine(format!("engine refused to write {}", name)))
        }
    }

    pub async fn read_file(&self, name: &str) -> Result<Vec<u8>> {
        let data = self.client.backend.read_file(name).await;
        self.client.check_fault()?;
        data
    }

    pub async fn read_text(&self, name: &str) -> Result<String> {
        let data = self.read_file(name).await?;
        Ok(String::from_utf8_lossy(&data).into_owned())
    }

    /// Remove a virtual file. `Ok(false)` means it was not there.
    pub async fn delete_file(&self, name: &str) -> Result<bool> {
        let deleted = self.client.backend.delete_file(name).await;
        self.client.check_fault()?;
        deleted
    }

    /// Run the encoder. Progress for this call only goes to `progress`.
    pub async fn exec(&self, args: &[String], progress: Option<ProgressSink>) -> Result<Completion> {
        debug!("engine exec: {:?}", args);
        let status = self.client.backend.exec(args, progress).await;
        self.client.check_fault()?;
        Ok(Completion::from_exec_status(status?))
    }

    pub async fn probe(&self, args: &[String]) -> Result<Completion> {
        debug!("engine probe: {:?}", args);
        let status = self.client.backend.probe(args).await;
        self.client.check_fault()?;
        Ok(Completion::from_probe_status(status?))
    }
}
