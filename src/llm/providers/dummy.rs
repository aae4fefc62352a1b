//! Dummy text provider: echoes input back prefixed with `[echo]`.
//! Used to run the bot and its tests without an Ollama server.

use crate::error::UpstreamError;
use crate::session::Turn;

#[derive(Debug, Clone)]
pub struct DummyProvider;

impl DummyProvider {
    pub async fn chat(&self, history: &[Turn]) -> Result<String, UpstreamError> {
        let last = history.last().map(|t| t.content.as_str()).unwrap_or_default();
        Ok(format!("[echo] {last}"))
    }

    pub async fn generate(&self, prompt: &str) -> Result<String, UpstreamError> {
        Ok(format!("[echo] {prompt}"))
    }

    pub async fn list_models(&self) -> Result<Vec<String>, UpstreamError> {
        Ok(vec!["dummy".to_string()])
    }
}
