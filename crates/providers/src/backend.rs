//! Seams between the gateway and the concrete inference backends.
//!
//! Uses async_trait so the gateway can hold `Arc<dyn ...>` and tests can swap
//! in scripted doubles.

use async_trait::async_trait;
use shared::{ApiKey, HistoryEntry, ProviderError};
use tokio::sync::mpsc::UnboundedSender;

/// Hosted generative API authenticated with a user-supplied key
#[async_trait]
pub trait RemoteChat: Send + Sync {
    /// Cheap authenticated call used to discover whether the key works.
    async fn verify_key(&self, key: &ApiKey) -> Result<(), ProviderError>;

    /// Produce the next bot turn. The last entry of `history` is the new user message.
    async fn generate(&self, key: &ApiKey, history: &[HistoryEntry]) -> Result<String, ProviderError>;
}

/// Model executed on this machine
#[async_trait]
pub trait LocalEngine: Send + Sync {
    /// Model tag this engine serves
    fn model(&self) -> &str;

    /// Whether a GPU backend is available. Must be side-effect free.
    fn is_accelerated(&self) -> bool;

    /// Fetch (first time only) and warm the model. Can take minutes.
    async fn load(&self, progress: UnboundedSender<LoadProgress>) -> Result<(), ProviderError>;

    async fn generate(&self, history: &[HistoryEntry]) -> Result<String, ProviderError>;

    /// Release the resident model. Idempotent.
    async fn unload(&self) -> Result<(), ProviderError>;
}

/// Progress report while a local model artifact is downloaded and compiled
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadProgress {
    pub status: String,
    pub completed: Option<u64>,
    pub total: Option<u64>,
}

impl LoadProgress {
    pub fn status(status: impl Into<String>) -> Self {
        Self {
            status: status.into(),
            completed: None,
            total: None,
        }
    }

    pub fn percent(&self) -> Option<u8> {
        match (self.completed, self.total) {
            (Some(done), Some(total)) if total > 0 => {
                Some(((done.min(total) as f64 / total as f64) * 100.0).round() as u8)
            }
            _ => None,
        }
    }
}
