//! Image-generation backends.
//!
//! Same shape as [`crate::llm`]: an enum over concrete backends, cloned
//! freely, with `build` as the startup factory.

pub mod comfyui;
pub mod dummy;
pub mod workflow;

use crate::config::ImageConfig;
use crate::error::{AppError, UpstreamError};

#[derive(Debug, Clone)]
pub enum ImageProvider {
    ComfyUi(comfyui::ComfyUiProvider),
    Dummy(dummy::DummyImageProvider),
}

impl ImageProvider {
    /// Generate one image for `prompt` and return its encoded bytes (PNG for ComfyUI).
    pub async fn generate(&self, prompt: &str) -> Result<Vec<u8>, UpstreamError> {
        match self {
            ImageProvider::ComfyUi(p) => p.generate(prompt).await,
            ImageProvider::Dummy(p) => p.generate(prompt).await,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            ImageProvider::ComfyUi(_) => "comfyui",
            ImageProvider::Dummy(_) => "dummy",
        }
    }
}

/// Construct an `ImageProvider` from `[image]` config.
pub fn build(config: &ImageConfig) -> Result<ImageProvider, AppError> {
    match config.provider.as_str() {
        "dummy" => Ok(ImageProvider::Dummy(dummy::DummyImageProvider)),
        "comfyui" => {
            let p = comfyui::ComfyUiProvider::new(config)
                .map_err(|e| AppError::Config(format!("image provider: {e}")))?;
            Ok(ImageProvider::ComfyUi(p))
        }
        other => Err(AppError::Config(format!("unknown image provider: {other}"))),
    }
}
