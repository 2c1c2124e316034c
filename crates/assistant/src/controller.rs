//! Chat window state: the message list, the typing indicator, and the choice
//! between the live gateway and the offline responder for each message.

use futures::FutureExt;
use parking_lot::Mutex;
use providers::{LoadProgress, ProviderGateway};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use shared::provider::ProviderKind;
use shared::settings::{ChatSettings, RehydrationPolicy};
use shared::{ChatReply, Message, ValidationError};
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::UnboundedSender;

use crate::fallback::FallbackResponder;

pub const UNEXPECTED_ERROR: &str = "Sorry, I encountered an error. Please try again.";

pub const NUDGE: &str = "💡 Want smarter answers? Add a Gemini API key with /key <API_KEY>, \
or run a model on this machine with /local.";

const WARNING_PREFIX: &str = "⚠️ ";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rejection {
    Empty,
    Busy,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SendOutcome {
    /// Nothing was appended and nothing was sent
    Rejected(Rejection),
    Replied {
        reply: Message,
        nudge: Option<Message>,
    },
}

/// Resets the typing flag however the send ends.
struct TypingGuard<'a>(&'a AtomicBool);

impl Drop for TypingGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

pub struct ChatController {
    gateway: ProviderGateway,
    responder: Arc<FallbackResponder>,
    settings: ChatSettings,
    messages: Mutex<Vec<Message>>,
    typing: AtomicBool,
    rng: Mutex<StdRng>,
}

impl ChatController {
    /// Seed the greeting, then pull whatever the gateway already remembers.
    pub fn mount(
        gateway: ProviderGateway,
        responder: Arc<FallbackResponder>,
        settings: ChatSettings,
    ) -> Self {
        let controller = Self {
            messages: Mutex::new(vec![Message::bot(settings.greeting.clone())]),
            gateway,
            responder,
            settings,
            typing: AtomicBool::new(false),
            rng: Mutex::new(StdRng::from_entropy()),
        };
        controller.rehydrate();
        tracing::debug!(
            provider = controller.provider().as_str(),
            messages = controller.messages.lock().len(),
            "chat window mounted"
        );
        controller
    }

    /// Replace the randomness source, e.g. with a seeded generator.
    pub fn with_rng(self, rng: StdRng) -> Self {
        *self.rng.lock() = rng;
        self
    }

    fn rehydrate(&self) {
        let history = self.gateway.history();
        if history.is_empty() {
            return;
        }
        let skip = match self.settings.rehydration {
            RehydrationPolicy::DropFirst => 1,
            RehydrationPolicy::KeepAll => 0,
        };
        let mut messages = self.messages.lock();
        messages.truncate(1);
        messages.extend(history.iter().skip(skip).map(Message::from_history));
    }

    pub fn messages(&self) -> Vec<Message> {
        self.messages.lock().clone()
    }

    pub fn is_typing(&self) -> bool {
        self.typing.load(Ordering::Acquire)
    }

    pub fn provider(&self) -> ProviderKind {
        self.gateway.provider()
    }

    pub fn gateway(&self) -> &ProviderGateway {
        &self.gateway
    }

    fn push(&self, message: Message) {
        self.messages.lock().push(message);
    }

    pub async fn send(&self, text: &str) -> SendOutcome {
        let text = match Self::validate_message(text) {
            Ok(text) => text,
            Err(_) => return SendOutcome::Rejected(Rejection::Empty),
        };
        if self
            .typing
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return SendOutcome::Rejected(Rejection::Busy);
        }
        let _typing = TypingGuard(&self.typing);

        self.push(Message::user(text));

        let (reply, nudge) = match AssertUnwindSafe(self.respond(text)).catch_unwind().await {
            Ok(pair) => pair,
            Err(_) => {
                tracing::error!("send pathway panicked");
                (Message::bot(UNEXPECTED_ERROR), None)
            }
        };

        self.push(reply.clone());
        if let Some(nudge) = &nudge {
            self.push(nudge.clone());
        }
        SendOutcome::Replied { reply, nudge }
    }

    async fn respond(&self, text: &str) -> (Message, Option<Message>) {
        if self.gateway.provider().is_live() {
            let reply = match self.gateway.send_chat(text).await {
                Ok(content) => content,
                Err(e) => format!("{}{}", WARNING_PREFIX, e),
            };
            return (Message::bot(reply), None);
        }

        let delay = self.fallback_delay();
        tokio::time::sleep(delay).await;
        let reply = Message::bot(self.responder.respond(text));
        let nudge = self.roll_nudge().then(|| Message::bot(NUDGE));
        (reply, nudge)
    }

    fn fallback_delay(&self) -> Duration {
        let range = self.settings.fallback_delay_ms;
        let ms = if range.max <= range.min {
            range.min
        } else {
            self.rng.lock().gen_range(range.min..=range.max)
        };
        Duration::from_millis(ms)
    }

    fn roll_nudge(&self) -> bool {
        let p = self.settings.nudge_probability.clamp(0.0, 1.0);
        self.rng.lock().gen_bool(p)
    }

    pub fn validate_message(text: &str) -> Result<&str, ValidationError> {
        let text = text.trim();
        if text.is_empty() {
            return Err(ValidationError::EmptyMessage);
        }
        Ok(text)
    }

    /// Key check done before the gateway sees anything. Advisory only.
    pub fn validate_api_key(key: &str) -> Result<&str, ValidationError> {
        let key = key.trim();
        if key.is_empty() {
            return Err(ValidationError::EmptyKey);
        }
        if !key.starts_with("AIza") {
            return Err(ValidationError::MalformedKey);
        }
        Ok(key)
    }

    pub async fn connect_gemini(&self, key: &str) -> ChatReply {
        match Self::validate_api_key(key) {
            Ok(key) => self.gateway.enable_gemini(key).await.into(),
            Err(e) => ChatReply::failed(e.to_string()),
        }
    }

    pub async fn toggle_local(&self, progress: UnboundedSender<LoadProgress>) -> ChatReply {
        self.gateway.toggle_local_with_progress(progress).await.into()
    }

    /// Start over: forget gateway history and drop everything but the greeting.
    pub fn new_conversation(&self) {
        self.gateway.clear_history();
        self.messages.lock().truncate(1);
    }

    /// Shutdown hook. Always releases the local model cache.
    pub async fn unload(&self) {
        self.gateway.clear_local_cache().await;
    }
}
