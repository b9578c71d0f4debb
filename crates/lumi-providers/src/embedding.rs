//! OpenAI-compatible embeddings client.

use async_trait::async_trait;
use lumi_core::config::EmbeddingConfig;
use lumi_core::error::{LumiError, Result};
use lumi_core::traits::EmbeddingProvider;
use lumi_core::types::Embedding;
use serde::{Deserialize, Serialize};

use crate::provider_registry::{self, AuthStyle, ProviderConfig};

#[derive(Debug, Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a str,
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
}

/// Works with OpenAI's `/embeddings` API and any compatible endpoint.
pub struct OpenAiEmbeddingProvider {
    name: String,
    client: reqwest::Client,
    url: String,
    api_key: String,
    auth_style: AuthStyle,
    model: String,
    dims: usize,
}

impl OpenAiEmbeddingProvider {
    pub fn from_registry(registry: &ProviderConfig, config: &EmbeddingConfig) -> Result<Self> {
        let embeddings_path = registry.embeddings_path.ok_or_else(|| {
            LumiError::Config(format!("provider '{}' has no embeddings API", registry.name))
        })?;
        let api_key = provider_registry::resolve_api_key(registry, &config.api_key);
        if registry.auth_style == AuthStyle::Bearer && api_key.is_empty() {
            return Err(LumiError::ApiKeyMissing(registry.name.to_string()));
        }
        let base_url = provider_registry::resolve_base_url(registry, &config.endpoint);

        Ok(Self {
            name: registry.name.to_string(),
            client: crate::build_http_client(config.timeout_secs)?,
            url: format!("{base_url}{embeddings_path}"),
            api_key,
            auth_style: registry.auth_style,
            model: config.model.clone(),
            dims: config.dimensions,
        })
    }
}

#[async_trait]
impl EmbeddingProvider for OpenAiEmbeddingProvider {
    fn name(&self) -> &str {
        &self.name
    }

    fn model_name(&self) -> &str {
        &self.model
    }

    fn dimensions(&self) -> usize {
        self.dims
    }

    async fn embed(&self, text: &str) -> Result<Embedding> {
        let request = EmbeddingRequest {
            model: &self.model,
            input: text,
        };

        let mut req = self.client.post(&self.url).json(&request);
        if self.auth_style == AuthStyle::Bearer {
            req = req.header("Authorization", format!("Bearer {}", self.api_key));
        }

        let response = req
            .send()
            .await
            .map_err(|e| crate::map_send_error(&self.name, &self.url, e))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(LumiError::Embedding(format!(
                "{} API error {status}: {body}",
                self.name
            )));
        }

        let result: EmbeddingResponse = response
            .json()
            .await
            .map_err(|e| LumiError::Embedding(format!("malformed embedding response: {e}")))?;

        let values = result
            .data
            .into_iter()
            .next()
            .map(|d| d.embedding)
            .ok_or_else(|| LumiError::Embedding(format!("Empty response from {}", self.name)))?;

        Embedding::new(values, self.dims)
    }
}
