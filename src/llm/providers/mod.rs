//! Text-generation backend implementations.
//!
//! `build(config)` is the factory, called once at startup.

pub mod dummy;
pub mod ollama;

use crate::config::TextConfig;
use crate::error::AppError;
use crate::llm::TextProvider;

/// Construct a `TextProvider` from `[text]` config.
pub fn build(config: &TextConfig) -> Result<TextProvider, AppError> {
    match config.provider.as_str() {
        "dummy" => Ok(TextProvider::Dummy(dummy::DummyProvider)),
        "ollama" => {
            let p = ollama::OllamaProvider::new(
                config.api_url.clone(),
                config.model.clone(),
                config.timeout_seconds,
            )
            .map_err(|e| AppError::Config(format!("text provider: {e}")))?;
            Ok(TextProvider::Ollama(p))
        }
        other => Err(AppError::Config(format!("unknown text provider: {other}"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn text_config(provider: &str) -> TextConfig {
        TextConfig {
            provider: provider.to_string(),
            api_url: "http://localhost:11434".to_string(),
            model: "llama3.1".to_string(),
            timeout_seconds: 5,
        }
    }

    #[test]
    fn builds_known_providers() {
        assert!(matches!(build(&text_config("dummy")), Ok(TextProvider::Dummy(_))));
        let ollama = build(&text_config("ollama")).unwrap();
        assert_eq!(ollama.model(), "llama3.1");
    }

    #[test]
    fn unknown_provider_errors() {
        let err = build(&text_config("gpt")).unwrap_err();
        assert!(err.to_string().contains("unknown text provider"));
    }
}
