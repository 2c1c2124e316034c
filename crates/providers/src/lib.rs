pub mod backend;
pub mod gateway;
pub mod gemini;
pub mod local;
pub mod ollama;

pub use backend::{LoadProgress, LocalEngine, RemoteChat};
pub use gateway::ProviderGateway;
pub use gemini::GeminiClient;
pub use local::LocalRuntime;
pub use ollama::OllamaEngine;
