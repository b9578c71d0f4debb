//! # Lumi Providers
//!
//! Chat-completion and embedding clients. Every OpenAI-compatible backend
//! (OpenAI, OpenRouter, DeepSeek, Groq, Ollama, llama.cpp) is handled by one
//! `OpenAiCompatibleProvider`; embeddings go through `OpenAiEmbeddingProvider`.

pub mod embedding;
pub mod openai_compatible;
pub mod provider_registry;

use std::sync::Arc;
use std::time::Duration;

use lumi_core::config::{EmbeddingConfig, LlmConfig};
use lumi_core::error::{LumiError, Result};
use lumi_core::traits::{ChatProvider, EmbeddingProvider};

/// Create the chat-completion provider named by `config.provider`.
pub fn create_chat_provider(config: &LlmConfig) -> Result<Arc<dyn ChatProvider>> {
    let name = config.provider.as_str();
    if name.starts_with("custom:") {
        return Ok(Arc::new(openai_compatible::OpenAiCompatibleProvider::custom(
            name, config,
        )?));
    }
    let registry = provider_registry::get_provider_config(name)
        .ok_or_else(|| LumiError::ProviderNotFound(name.into()))?;
    Ok(Arc::new(
        openai_compatible::OpenAiCompatibleProvider::from_registry(registry, config)?,
    ))
}

/// Create the embedding provider named by `config.provider`.
pub fn create_embedding_provider(config: &EmbeddingConfig) -> Result<Arc<dyn EmbeddingProvider>> {
    let name = config.provider.as_str();
    let registry = provider_registry::get_provider_config(name)
        .ok_or_else(|| LumiError::ProviderNotFound(name.into()))?;
    Ok(Arc::new(embedding::OpenAiEmbeddingProvider::from_registry(
        registry, config,
    )?))
}

/// HTTP client with a whole-request timeout.
pub fn build_http_client(timeout_secs: u64) -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(Duration::from_secs(timeout_secs.max(1)))
        .build()
        .map_err(|e| LumiError::Http(format!("failed to build HTTP client: {e}")))
}

pub(crate) fn map_send_error(name: &str, url: &str, e: reqwest::Error) -> LumiError {
    if e.is_timeout() {
        LumiError::Timeout(format!("{name} ({url})"))
    } else {
        LumiError::Http(format!("{name} connection failed ({url}): {e}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_provider() {
        let config = LlmConfig {
            provider: "nonexistent".into(),
            ..LlmConfig::default()
        };
        let err = create_chat_provider(&config).err().unwrap();
        assert!(matches!(err, LumiError::ProviderNotFound(_)));
    }

    #[test]
    fn test_create_with_explicit_key() {
        let config = LlmConfig {
            api_key: "sk-test".into(),
            ..LlmConfig::default()
        };
        let provider = create_chat_provider(&config).unwrap();
        assert_eq!(provider.name(), "openai");

        let config = EmbeddingConfig {
            api_key: "sk-test".into(),
            ..EmbeddingConfig::default()
        };
        let provider = create_embedding_provider(&config).unwrap();
        assert_eq!(provider.dimensions(), 1536);
    }
}
