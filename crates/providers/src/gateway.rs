//! Single source of truth for which backend answers chat messages.
//!
//! The gateway is constructed once and handed to every chat window that needs
//! it. It holds the active provider, the in-memory API key, and the
//! conversation history that gives the backend context. Every failure comes
//! back as a `ProviderError` value; nothing here panics or throws past the
//! boundary.

use parking_lot::RwLock;
use shared::provider::{LocalStatus, ProviderKind, ProviderSnapshot};
use shared::{ApiKey, HistoryEntry, ProviderError, Role};
use std::sync::Arc;
use tokio::sync::mpsc::UnboundedSender;
use tokio::sync::{watch, Mutex};

use crate::backend::{LoadProgress, LocalEngine, RemoteChat};
use crate::local::LocalRuntime;

#[derive(Debug, Default)]
struct ProviderState {
    active: ProviderKind,
    api_key: Option<ApiKey>,
}

struct Inner {
    remote: Arc<dyn RemoteChat>,
    local: LocalRuntime,
    state: RwLock<ProviderState>,
    history: RwLock<Vec<HistoryEntry>>,
    /// At most one chat request per conversation
    in_flight: Mutex<()>,
    /// Serializes provider transitions
    transition: Mutex<()>,
    snapshot: Arc<watch::Sender<ProviderSnapshot>>,
    max_context_entries: usize,
}

#[derive(Clone)]
pub struct ProviderGateway {
    inner: Arc<Inner>,
}

impl ProviderGateway {
    pub fn new(
        remote: Arc<dyn RemoteChat>,
        local: Arc<dyn LocalEngine>,
        max_context_entries: usize,
    ) -> Self {
        let (tx, _rx) = watch::channel(ProviderSnapshot::default());
        let snapshot = Arc::new(tx);
        Self {
            inner: Arc::new(Inner {
                remote,
                local: LocalRuntime::new(local, snapshot.clone()),
                state: RwLock::new(ProviderState::default()),
                history: RwLock::new(Vec::new()),
                in_flight: Mutex::new(()),
                transition: Mutex::new(()),
                snapshot,
                max_context_entries,
            }),
        }
    }

    pub fn provider(&self) -> ProviderKind {
        self.inner.state.read().active
    }

    pub fn local_status(&self) -> LocalStatus {
        self.inner.local.status()
    }

    pub fn is_webgpu_supported(&self) -> bool {
        self.inner.local.is_webgpu_supported()
    }

    /// Name of the local model tag, for the provider dialog.
    pub fn local_model(&self) -> String {
        self.inner.local.engine().model().to_string()
    }

    /// Notified on every provider or local-status change.
    pub fn subscribe(&self) -> watch::Receiver<ProviderSnapshot> {
        self.inner.snapshot.subscribe()
    }

    /// Snapshot of the conversation so far, oldest first.
    pub fn history(&self) -> Vec<HistoryEntry> {
        self.inner.history.read().clone()
    }

    pub fn clear_history(&self) {
        self.inner.history.write().clear();
        tracing::debug!("conversation history cleared");
    }

    fn set_active(&self, active: ProviderKind) {
        self.inner.state.write().active = active;
        self.inner.snapshot.send_modify(|s| s.active = active);
        tracing::info!(provider = active.as_str(), "active provider changed");
    }

    /// Accept any non-empty key and check it with one real call.
    ///
    /// On failure the active provider and history are left as they were.
    pub async fn enable_gemini(&self, api_key: &str) -> Result<String, ProviderError> {
        let key = ApiKey::new(api_key);
        if key.is_empty() {
            return Err(ProviderError::MissingKey);
        }
        let _guard = self
            .inner
            .transition
            .try_lock()
            .map_err(|_| ProviderError::Busy)?;

        if let Err(e) = self.inner.remote.verify_key(&key).await {
            tracing::warn!("gemini key rejected: {}", e);
            return Err(e);
        }

        let previous = self.provider();
        if previous == ProviderKind::Local {
            self.inner.local.deactivate().await;
        }
        self.inner.state.write().api_key = Some(key);
        self.set_active(ProviderKind::Gemini);

        Ok("Gemini is connected! Your key is kept in memory only and is forgotten when the assistant closes.".to_string())
    }

    /// Turn local mode on, or off if it is already on.
    pub async fn toggle_local(&self) -> Result<String, ProviderError> {
        let (tx, _rx) = tokio::sync::mpsc::unbounded_channel();
        self.toggle_local_with_progress(tx).await
    }

    pub async fn toggle_local_with_progress(
        &self,
        progress: UnboundedSender<LoadProgress>,
    ) -> Result<String, ProviderError> {
        let _guard = self
            .inner
            .transition
            .try_lock()
            .map_err(|_| ProviderError::Busy)?;

        if self.provider() == ProviderKind::Local {
            self.inner.local.deactivate().await;
            self.set_active(ProviderKind::None);
            return Ok("Local model turned off.".to_string());
        }

        self.inner.local.activate(progress).await?;
        self.set_active(ProviderKind::Local);
        Ok(format!(
            "Local model {} is ready. Your messages now stay on this machine.",
            self.inner.local.engine().model()
        ))
    }

    /// Send one user message to the active backend.
    ///
    /// The exchange is recorded in history, user entry first, only when the
    /// backend answers.
    pub async fn send_chat(&self, user_text: &str) -> Result<String, ProviderError> {
        let _guard = self
            .inner
            .in_flight
            .try_lock()
            .map_err(|_| ProviderError::Busy)?;

        let (active, key) = {
            let state = self.inner.state.read();
            (state.active, state.api_key.clone())
        };

        let user_entry = HistoryEntry::user(user_text);
        let context = self.context_with(&user_entry);

        let result = match active {
            ProviderKind::None => return Err(ProviderError::NoProvider),
            ProviderKind::Gemini => {
                let key = key.ok_or(ProviderError::MissingKey)?;
                self.inner.remote.generate(&key, &context).await
            }
            ProviderKind::Local => self.inner.local.engine().generate(&context).await,
        };

        match result {
            Ok(reply) => {
                let mut history = self.inner.history.write();
                history.push(user_entry);
                history.push(HistoryEntry::bot(reply.clone()));
                Ok(reply)
            }
            Err(e) => {
                tracing::warn!(provider = active.as_str(), "chat request failed: {}", e);
                Err(e)
            }
        }
    }

    /// Recent history plus the new entry, starting on a user turn.
    fn context_with(&self, user_entry: &HistoryEntry) -> Vec<HistoryEntry> {
        let history = self.inner.history.read();
        let start = history.len().saturating_sub(self.inner.max_context_entries);
        let mut context: Vec<HistoryEntry> = history[start..]
            .iter()
            .skip_while(|e| e.role == Role::Bot)
            .cloned()
            .collect();
        context.push(user_entry.clone());
        context
    }

    /// Shutdown hook: release the local model whether or not it was used.
    pub async fn clear_local_cache(&self) {
        self.inner.local.clear_cache().await;
        if self.provider() == ProviderKind::Local {
            self.set_active(ProviderKind::None);
        }
    }
}
