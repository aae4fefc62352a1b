//! Text-generation backends.
//!
//! `TextProvider` is an enum over concrete backends.  Add a new variant +
//! module in `providers/` for each additional backend.
//!
//! Provider instances are shared immutable capabilities; clone them freely.
//! Enum dispatch keeps callers free of trait objects and `async-trait`.

pub mod providers;

use crate::error::UpstreamError;
use crate::session::Turn;

#[derive(Debug, Clone)]
pub enum TextProvider {
    Ollama(providers::ollama::OllamaProvider),
    Dummy(providers::dummy::DummyProvider),
}

impl TextProvider {
    /// Continue a structured conversation. The last turn is the new user message.
    pub async fn chat(&self, history: &[Turn]) -> Result<String, UpstreamError> {
        match self {
            TextProvider::Ollama(p) => p.chat(history).await,
            TextProvider::Dummy(p) => p.chat(history).await,
        }
    }

    /// Single prompt, no history.
    pub async fn generate(&self, prompt: &str) -> Result<String, UpstreamError> {
        match self {
            TextProvider::Ollama(p) => p.generate(prompt).await,
            TextProvider::Dummy(p) => p.generate(prompt).await,
        }
    }

    pub async fn list_models(&self) -> Result<Vec<String>, UpstreamError> {
        match self {
            TextProvider::Ollama(p) => p.list_models().await,
            TextProvider::Dummy(p) => p.list_models().await,
        }
    }

    /// Model name used for requests, for logging and the startup banner.
    pub fn model(&self) -> &str {
        match self {
            TextProvider::Ollama(p) => p.model(),
            TextProvider::Dummy(_) => "dummy",
        }
    }
}
