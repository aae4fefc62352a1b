//! ComfyUI image-generation provider.
//!
//! A generation is a three-step job:
//!
//! 1. `POST /prompt` with the workflow graph → `prompt_id`
//! 2. poll `GET /history/{prompt_id}` until the SaveImage node has output
//! 3. decode the inline data URL, or download the stored file via `GET /view`
//!
//! The whole job is bounded by `[image] timeout_seconds`.

use std::time::Duration;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, error, info};

use crate::config::ImageConfig;
use crate::error::UpstreamError;

use super::workflow::{self, OUTPUT_NODE, WorkflowParams};

#[derive(Debug, Clone)]
pub struct ComfyUiProvider {
    client: Client,
    api_url: String,
    params: WorkflowParams,
    poll_interval: Duration,
    timeout: Duration,
    /// Identifies this bot to ComfyUI's websocket progress feed.
    client_id: String,
}

impl ComfyUiProvider {
    pub fn new(config: &ImageConfig) -> Result<Self, UpstreamError> {
        let timeout = Duration::from_secs(config.timeout_seconds);
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| UpstreamError::Request(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            api_url: config.api_url.trim_end_matches('/').to_string(),
            params: WorkflowParams::from(config),
            poll_interval: Duration::from_millis(config.poll_interval_ms.max(1)),
            timeout,
            client_id: uuid::Uuid::new_v4().to_string(),
        })
    }

    pub async fn generate(&self, prompt: &str) -> Result<Vec<u8>, UpstreamError> {
        match tokio::time::timeout(self.timeout, self.run_job(prompt)).await {
            Ok(result) => result,
            Err(_) => {
                error!(timeout_secs = self.timeout.as_secs(), "comfyui generation timed out");
                Err(UpstreamError::Timeout(format!(
                    "image generation exceeded {}s",
                    self.timeout.as_secs()
                )))
            }
        }
    }

    async fn run_job(&self, prompt: &str) -> Result<Vec<u8>, UpstreamError> {
        let prompt_id = self.submit(prompt).await?;
        info!(%prompt_id, "comfyui job queued");
        let output = self.wait_for_output(&prompt_id).await?;
        let bytes = match output {
            ImageOutput::Inline(data) => decode_data_url(&data)?,
            ImageOutput::Stored { filename, subfolder, kind } => {
                self.download(&filename, &subfolder, &kind).await?
            }
        };
        info!(%prompt_id, bytes = bytes.len(), "comfyui image ready");
        Ok(bytes)
    }

    async fn submit(&self, prompt: &str) -> Result<String, UpstreamError> {
        let payload = QueueRequest {
            prompt: workflow::build(prompt, &self.params),
            client_id: &self.client_id,
        };
        let url = format!("{}/prompt", self.api_url);
        debug!(%url, prompt_len = prompt.len(), "submitting comfyui workflow");

        let response = self.client.post(&url).json(&payload).send().await.map_err(|e| {
            error!(%url, error = %e, "comfyui submit failed (transport)");
            UpstreamError::from(e)
        })?;
        let parsed: QueueResponse = check_status(response)
            .await?
            .json()
            .await
            .map_err(|e| UpstreamError::Malformed(format!("prompt response: {e}")))?;
        Ok(parsed.prompt_id)
    }

    async fn wait_for_output(&self, prompt_id: &str) -> Result<ImageOutput, UpstreamError> {
        let url = format!("{}/history/{prompt_id}", self.api_url);
        loop {
            let response = self.client.get(&url).send().await.map_err(UpstreamError::from)?;
            if response.status().is_success() {
                let history: Value = response
                    .json()
                    .await
                    .map_err(|e| UpstreamError::Malformed(format!("history response: {e}")))?;
                if let Some(output) = extract_output(&history, prompt_id)? {
                    return Ok(output);
                }
            } else {
                debug!(status = %response.status(), "comfyui history not ready");
            }
            tokio::time::sleep(self.poll_interval).await;
        }
    }

    async fn download(&self, filename: &str, subfolder: &str, kind: &str) -> Result<Vec<u8>, UpstreamError> {
        let url = format!("{}/view", self.api_url);
        debug!(%filename, %subfolder, "downloading comfyui output");
        let response = self
            .client
            .get(&url)
            .query(&[("filename", filename), ("subfolder", subfolder), ("type", kind)])
            .send()
            .await
            .map_err(UpstreamError::from)?;
        let bytes = check_status(response).await?.bytes().await.map_err(UpstreamError::from)?;
        Ok(bytes.to_vec())
    }
}

// ── History parsing ───────────────────────────────────────────────────────────

/// One entry of a SaveImage node's `images` array.
#[derive(Debug, Deserialize, PartialEq)]
#[serde(untagged)]
enum ImageOutput {
    /// `data:image/png;base64,...`
    Inline(String),
    Stored {
        filename: String,
        #[serde(default)]
        subfolder: String,
        #[serde(rename = "type", default = "default_output_kind")]
        kind: String,
    },
}

fn default_output_kind() -> String {
    "output".to_string()
}

/// Look for the finished image of `prompt_id` in a `/history` body.
///
/// `Ok(None)` means "not done yet, keep polling".
fn extract_output(history: &Value, prompt_id: &str) -> Result<Option<ImageOutput>, UpstreamError> {
    let Some(entry) = history.get(prompt_id) else {
        return Ok(None);
    };

    if entry.pointer("/status/status_str").and_then(Value::as_str) == Some("error") {
        let detail = entry
            .pointer("/status/messages")
            .map(Value::to_string)
            .unwrap_or_default();
        return Err(UpstreamError::Failed(format!("comfyui execution error {detail}")));
    }

    let Some(first) = entry.pointer(&format!("/outputs/{OUTPUT_NODE}/images/0")) else {
        if entry.pointer("/status/completed").and_then(Value::as_bool) == Some(true) {
            return Err(UpstreamError::Malformed(format!(
                "job {prompt_id} completed without an image on node {OUTPUT_NODE}"
            )));
        }
        return Ok(None);
    };
    serde_json::from_value(first.clone())
        .map(Some)
        .map_err(|e| UpstreamError::Malformed(format!("unexpected image output {first}: {e}")))
}

fn decode_data_url(data: &str) -> Result<Vec<u8>, UpstreamError> {
    let encoded = data.split_once(',').map_or(data, |(_, b64)| b64);
    BASE64
        .decode(encoded.trim())
        .map_err(|e| UpstreamError::Malformed(format!("invalid base64 image: {e}")))
}

// ── Private wire types ────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
struct QueueRequest<'a> {
    prompt: Value,
    client_id: &'a str,
}

#[derive(Debug, Deserialize)]
struct QueueResponse {
    prompt_id: String,
}

// Validation failures come back as `{"error": {"message": ...}, "node_errors": {...}}`.
#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    message: String,
}

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
        .map(|env| env.error.message)
        .unwrap_or(body);

    error!(%status, %message, "comfyui returned HTTP error");
    Err(UpstreamError::Status { status: status.as_u16(), message })
}
