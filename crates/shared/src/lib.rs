pub mod chat;
pub mod error;
pub mod secret;
pub mod settings;

pub use chat::{ChatReply, HistoryEntry, Message, Role, Sender};
pub use error::{ErrorKind, ProviderError, ValidationError};
pub use secret::ApiKey;
pub use settings::AssistantSettings;

pub mod provider {
    use serde::{Deserialize, Serialize};

    /// Backend currently answering chat messages.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
    #[serde(rename_all = "lowercase")]
    pub enum ProviderKind {
        #[default]
        None,
        Gemini,
        Local,
    }

    impl ProviderKind {
        pub fn as_str(&self) -> &'static str {
            match self {
                ProviderKind::None => "none",
                ProviderKind::Gemini => "gemini",
                ProviderKind::Local => "local",
            }
        }

        pub fn display_name(&self) -> &'static str {
            match self {
                ProviderKind::None => "Offline assistant",
                ProviderKind::Gemini => "Gemini (Google)",
                ProviderKind::Local => "Local model",
            }
        }

        /// Whether a live backend is serving `send_chat`.
        pub fn is_live(&self) -> bool {
            !matches!(self, ProviderKind::None)
        }
    }

    /// Lifecycle of the local model as observed by the provider dialog.
    #[derive(Debug, Clone, PartialEq, Eq, Default)]
    pub enum LocalStatus {
        #[default]
        Idle,
        Checking,
        Ready,
        Error(String),
        /// No GPU backend; terminal for the session.
        Unsupported,
    }

    /// What subscribers of the gateway get notified with.
    #[derive(Debug, Clone, PartialEq, Eq, Default)]
    pub struct ProviderSnapshot {
        pub active: ProviderKind,
        pub local: LocalStatus,
    }
}
