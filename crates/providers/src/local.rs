//! Lifecycle of the local model: capability probe, load, release.
//!
//! Status moves `Idle -> Checking -> {Ready | Error | Unsupported}` and
//! `Ready -> Idle` on disable. `Unsupported` sticks for the rest of the process.

use shared::provider::{LocalStatus, ProviderSnapshot};
use shared::ProviderError;
use std::sync::{Arc, OnceLock};
use tokio::sync::mpsc::UnboundedSender;
use tokio::sync::watch;

use crate::backend::{LoadProgress, LocalEngine};

pub struct LocalRuntime {
    engine: Arc<dyn LocalEngine>,
    supported: OnceLock<bool>,
    snapshot: Arc<watch::Sender<ProviderSnapshot>>,
}

impl LocalRuntime {
    pub fn new(engine: Arc<dyn LocalEngine>, snapshot: Arc<watch::Sender<ProviderSnapshot>>) -> Self {
        Self {
            engine,
            supported: OnceLock::new(),
            snapshot,
        }
    }

    pub fn engine(&self) -> &Arc<dyn LocalEngine> {
        &self.engine
    }

    pub fn status(&self) -> LocalStatus {
        self.snapshot.borrow().local.clone()
    }

    fn set_status(&self, status: LocalStatus) {
        tracing::debug!(?status, "local model status");
        self.snapshot.send_modify(|s| s.local = status);
    }

    /// Probe for GPU acceleration. The first answer is cached.
    pub fn is_webgpu_supported(&self) -> bool {
        *self.supported.get_or_init(|| {
            let supported = self.engine.is_accelerated();
            tracing::info!(supported, "local inference capability probe");
            supported
        })
    }

    /// Probe, then fetch and warm the model.
    pub async fn activate(&self, progress: UnboundedSender<LoadProgress>) -> Result<(), ProviderError> {
        if self.status() == LocalStatus::Unsupported {
            return Err(ProviderError::Unsupported);
        }
        self.set_status(LocalStatus::Checking);

        if !self.is_webgpu_supported() {
            self.set_status(LocalStatus::Unsupported);
            return Err(ProviderError::Unsupported);
        }

        match self.engine.load(progress).await {
            Ok(()) => {
                self.set_status(LocalStatus::Ready);
                Ok(())
            }
            Err(e) => {
                tracing::warn!("local model failed to load: {}", e);
                self.set_status(LocalStatus::Error(e.to_string()));
                Err(e)
            }
        }
    }

    /// Release the model and go back to `Idle`.
    pub async fn deactivate(&self) {
        if let Err(e) = self.engine.unload().await {
            tracing::warn!("releasing local model: {}", e);
        }
        self.set_status(LocalStatus::Idle);
    }

    /// Shutdown hook. Safe to call any number of times, loaded or not.
    pub async fn clear_cache(&self) {
        if let Err(e) = self.engine.unload().await {
            tracing::warn!("clearing local model cache: {}", e);
        }
        if matches!(self.status(), LocalStatus::Ready | LocalStatus::Checking) {
            self.set_status(LocalStatus::Idle);
        }
    }
}
