//! Error types crossing the gateway boundary.
//!
//! Provider failures travel as data (`Result<_, ProviderError>`), and the
//! `Display` text of every variant is safe to show to the user as a chat bubble.

/// Fieldless classification of a [`ProviderError`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    NoProvider,
    MissingKey,
    InvalidKey,
    Quota,
    Network,
    Unsupported,
    ModelLoad,
    Busy,
    Backend,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProviderError {
    #[error("No AI provider is enabled. Add a Gemini API key or turn on the local model.")]
    NoProvider,

    #[error("Please enter an API key first.")]
    MissingKey,

    #[error("The API key was rejected: {0}")]
    InvalidKey(String),

    #[error("The AI service quota is exhausted, try again later: {0}")]
    Quota(String),

    #[error("Couldn't reach the AI service: {0}")]
    Network(String),

    #[error("Local models need GPU acceleration, which isn't available on this machine.")]
    Unsupported,

    #[error("The local model failed to load: {0}")]
    ModelLoad(String),

    #[error("Still working on the previous message.")]
    Busy,

    #[error("The AI service returned an error: {0}")]
    Backend(String),
}

impl ProviderError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ProviderError::NoProvider => ErrorKind::NoProvider,
            ProviderError::MissingKey => ErrorKind::MissingKey,
            ProviderError::InvalidKey(_) => ErrorKind::InvalidKey,
            ProviderError::Quota(_) => ErrorKind::Quota,
            ProviderError::Network(_) => ErrorKind::Network,
            ProviderError::Unsupported => ErrorKind::Unsupported,
            ProviderError::ModelLoad(_) => ErrorKind::ModelLoad,
            ProviderError::Busy => ErrorKind::Busy,
            ProviderError::Backend(_) => ErrorKind::Backend,
        }
    }
}

/// Input rejected by the controller before anything reaches the gateway
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("Message is empty")]
    EmptyMessage,

    #[error("Please enter an API key.")]
    EmptyKey,

    #[error("That doesn't look like a Gemini API key (they start with \"AIza\").")]
    MalformedKey,
}
