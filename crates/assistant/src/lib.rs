pub mod controller;
pub mod fallback;
pub mod profile;

pub use controller::{ChatController, Rejection, SendOutcome};
pub use fallback::FallbackResponder;
pub use profile::Profile;

use providers::{GeminiClient, LocalEngine, OllamaEngine, ProviderGateway};
use shared::AssistantSettings;
use std::sync::Arc;

/// Build the gateway and the offline responder from settings.
pub fn wire(settings: &AssistantSettings) -> anyhow::Result<(ProviderGateway, Arc<FallbackResponder>)> {
    let remote = GeminiClient::new(&settings.gemini)?;
    let local = OllamaEngine::new(&settings.local)?;
    tracing::info!(
        gemini_model = %settings.gemini.model,
        local_model = %local.model(),
        "providers configured"
    );
    let gateway = ProviderGateway::new(
        Arc::new(remote),
        Arc::new(local),
        settings.chat.max_context_entries,
    );
    let profile = Profile::load_or_bundled(settings.profile_path.as_deref());
    Ok((gateway, Arc::new(FallbackResponder::new(profile))))
}
