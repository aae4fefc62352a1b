//! Dummy image provider: returns the prompt bytes as the "image".

use crate::error::UpstreamError;

#[derive(Debug, Clone)]
pub struct DummyImageProvider;

impl DummyImageProvider {
    pub async fn generate(&self, prompt: &str) -> Result<Vec<u8>, UpstreamError> {
        Ok(prompt.as_bytes().to_vec())
    }
}
