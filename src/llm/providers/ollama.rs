//! Ollama text-generation provider.
//!
//! Talks to a local or remote Ollama server:
//! - `POST /api/chat`    : structured conversation (role/content turns)
//! - `POST /api/generate`: single prompt, no history
//! - `GET  /api/tags`    : installed models
//!
//! Requests are non-streaming. All Ollama wire types are private to this
//! module; callers only see `String`s and [`UpstreamError`].

use std::time::Duration;

use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, trace};

use crate::error::UpstreamError;
use crate::session::Turn;

/// Constructed once at startup, then cheaply cloned because
/// `reqwest::Client` is an `Arc` internally.
#[derive(Debug, Clone)]
pub struct OllamaProvider {
    client: Client,
    api_url: String,
    model: String,
}

impl OllamaProvider {
    /// `api_url` is the server root, e.g. `http://localhost:11434`.
    pub fn new(api_url: String, model: String, timeout_seconds: u64) -> Result<Self, UpstreamError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_seconds))
            .build()
            .map_err(|e| UpstreamError::Request(format!("failed to build HTTP client: {e}")))?;

        Ok(Self { client, api_url: api_url.trim_end_matches('/').to_string(), model })
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub async fn chat(&self, history: &[Turn]) -> Result<String, UpstreamError> {
        let payload = ChatRequest {
            model: &self.model,
            messages: history
                .iter()
                .map(|t| WireMessage { role: t.role.as_str().to_string(), content: t.content.clone() })
                .collect(),
            stream: false,
        };

        debug!(model = %self.model, turns = history.len(), "sending ollama chat request");
        if tracing::enabled!(tracing::Level::TRACE) {
            let json = serde_json::to_string_pretty(&payload)
                .unwrap_or_else(|e| format!("<serialization failed: {e}>"));
            trace!(payload = %json, "full chat request payload");
        }

        let url = format!("{}/api/chat", self.api_url);
        let response = self.client.post(&url).json(&payload).send().await.map_err(|e| {
            error!(%url, error = %e, "ollama chat request failed (transport)");
            UpstreamError::from(e)
        })?;
        let parsed: ChatResponse = check_status(response).await?.json().await.map_err(|e| {
            error!(error = %e, "failed to deserialize ollama chat response");
            UpstreamError::Malformed(format!("chat response: {e}"))
        })?;

        let text = parsed
            .message
            .map(|m| m.content.trim().to_string())
            .ok_or_else(|| UpstreamError::Malformed("chat response has no message".into()))?;
        debug!(reply_len = text.len(), "received ollama chat reply");
        Ok(text)
    }

    pub async fn generate(&self, prompt: &str) -> Result<String, UpstreamError> {
        let payload = GenerateRequest { model: &self.model, prompt, stream: false };

        debug!(model = %self.model, prompt_len = prompt.len(), "sending ollama generate request");

        let url = format!("{}/api/generate", self.api_url);
        let response = self.client.post(&url).json(&payload).send().await.map_err(|e| {
            error!(%url, error = %e, "ollama generate request failed (transport)");
            UpstreamError::from(e)
        })?;
        let parsed: GenerateResponse = check_status(response).await?.json().await.map_err(|e| {
            error!(error = %e, "failed to deserialize ollama generate response");
            UpstreamError::Malformed(format!("generate response: {e}"))
        })?;

        Ok(parsed.response.trim().to_string())
    }

    pub async fn list_models(&self) -> Result<Vec<String>, UpstreamError> {
        let url = format!("{}/api/tags", self.api_url);
        let response = self.client.get(&url).send().await.map_err(|e| {
            error!(%url, error = %e, "ollama tags request failed (transport)");
            UpstreamError::from(e)
        })?;
        let parsed: TagsResponse = check_status(response)
            .await?
            .json()
            .await
            .map_err(|e| UpstreamError::Malformed(format!("tags response: {e}")))?;

        Ok(parsed.models.into_iter().map(|m| m.name).collect())
    }
}

// ── Private wire types ────────────────────────────────────────────────────────

#[derive(Debug, Serialize, Deserialize)]
struct WireMessage {
    role: String,
    content: String,
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<WireMessage>,
    stream: bool,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    message: Option<WireMessage>,
}

#[derive(Debug, Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    stream: bool,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    response: String,
}

#[derive(Debug, Deserialize)]
struct TagsResponse {
    #[serde(default)]
    models: Vec<ModelEntry>,
}

#[derive(Debug, Deserialize)]
struct ModelEntry {
    name: String,
}

// Ollama reports failures as `{"error": "..."}`.
#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: String,
}

/// Pass through a successful response, or turn the body into a status error.
async fn check_status(response: reqwest::Response) -> Result<reqwest::Response, UpstreamError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response
        .text()
        .await
        .unwrap_or_else(|_| "<failed to read error body>".to_string());
    let message = serde_json::from_str::<ErrorEnvelope>(&body)
        .map(|env| env.error)
        .unwrap_or(body);

    error!(%status, %message, "ollama returned HTTP error");
    Err(UpstreamError::Status { status: status.as_u16(), message })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trailing_slash_trimmed() {
        let p = OllamaProvider::new("http://localhost:11434/".into(), "llama3.1".into(), 5).unwrap();
        assert_eq!(p.api_url, "http://localhost:11434");
        assert_eq!(p.model(), "llama3.1");
    }

    #[test]
    fn chat_request_shape() {
        let payload = ChatRequest {
            model: "m",
            messages: vec![WireMessage { role: "user".into(), content: "hi".into() }],
            stream: false,
        };
        let v = serde_json::to_value(&payload).unwrap();
        assert_eq!(v["model"], "m");
        assert_eq!(v["stream"], false);
        assert_eq!(v["messages"][0]["role"], "user");
        assert_eq!(v["messages"][0]["content"], "hi");
    }

    #[test]
    fn tags_response_tolerates_extra_fields() {
        let body = r#"{"models":[{"name":"llama3.1:latest","size":4661224676,"digest":"abc"}]}"#;
        let parsed: TagsResponse = serde_json::from_str(body).unwrap();
        assert_eq!(parsed.models[0].name, "llama3.1:latest");
    }
}
