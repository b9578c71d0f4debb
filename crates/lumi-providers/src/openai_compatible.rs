//! Unified OpenAI-compatible chat-completion provider.
//!
//! Providers are distinguished only by endpoint URL, auth style and API key.

use async_trait::async_trait;
use lumi_core::config::LlmConfig;
use lumi_core::error::{LumiError, Result};
use lumi_core::traits::provider::{ChatProvider, GenerateParams};
use lumi_core::types::{ChatMessage, ProviderResponse, Usage};
use serde_json::{Value, json};

use crate::provider_registry::{self, AuthStyle, ProviderConfig};

pub struct OpenAiCompatibleProvider {
    name: String,
    api_key: String,
    base_url: String,
    chat_path: String,
    auth_style: AuthStyle,
    client: reqwest::Client,
}

impl OpenAiCompatibleProvider {
    /// Create from a known provider config.
    ///
    /// Resolution order:
    /// - API key: `config.api_key` > registry env vars > empty
    /// - Base URL: `config.endpoint` > env override > registry default
    pub fn from_registry(registry: &ProviderConfig, config: &LlmConfig) -> Result<Self> {
        let api_key = provider_registry::resolve_api_key(registry, &config.api_key);
        if registry.auth_style == AuthStyle::Bearer && api_key.is_empty() {
            return Err(LumiError::ApiKeyMissing(registry.name.to_string()));
        }

        Ok(Self {
            name: registry.name.to_string(),
            api_key,
            base_url: provider_registry::resolve_base_url(registry, &config.endpoint),
            chat_path: registry.chat_path.to_string(),
            auth_style: registry.auth_style,
            client: crate::build_http_client(config.timeout_secs)?,
        })
    }

    /// Create for a custom endpoint (e.g. "custom:https://my-server.com/v1").
    pub fn custom(endpoint: &str, config: &LlmConfig) -> Result<Self> {
        let base_url = endpoint
            .strip_prefix("custom:")
            .unwrap_or(endpoint)
            .trim_end_matches('/')
            .to_string();

        let auth_style = if config.api_key.is_empty() {
            AuthStyle::None
        } else {
            AuthStyle::Bearer
        };

        Ok(Self {
            name: "custom".to_string(),
            api_key: config.api_key.clone(),
            base_url,
            chat_path: "/chat/completions".to_string(),
            auth_style,
            client: crate::build_http_client(config.timeout_secs)?,
        })
    }

    fn apply_auth(&self, req: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match self.auth_style {
            AuthStyle::Bearer if !self.api_key.is_empty() => {
                req.header("Authorization", format!("Bearer {}", self.api_key))
            }
            _ => req,
        }
    }
}

#[async_trait]
impl ChatProvider for OpenAiCompatibleProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn chat(
        &self,
        messages: &[ChatMessage],
        params: &GenerateParams,
    ) -> Result<ProviderResponse> {
        let body = json!({
            "model": params.model,
            "temperature": params.temperature,
            "max_tokens": params.max_tokens,
            "messages": messages,
        });

        let url = format!("{}{}", self.base_url, self.chat_path);
        let req = self
            .client
            .post(&url)
            .header("Content-Type", "application/json")
            .json(&body);
        let req = self.apply_auth(req);

        let resp = req
            .send()
            .await
            .map_err(|e| crate::map_send_error(&self.name, &url, e))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            return Err(LumiError::Provider(format!(
                "{} API error {}: {}",
                self.name, status, text
            )));
        }

        let json: Value = resp
            .json()
            .await
            .map_err(|e| LumiError::Provider(format!("{} malformed response: {e}", self.name)))?;

        let choice = json["choices"]
            .get(0)
            .ok_or_else(|| LumiError::Provider("No choices in response".into()))?;

        let content = choice["message"]["content"].as_str().map(String::from);

        let usage = json["usage"].as_object().map(|u| Usage {
            prompt_tokens: u.get("prompt_tokens").and_then(|v| v.as_u64()).unwrap_or(0) as u32,
            completion_tokens: u
                .get("completion_tokens")
                .and_then(|v| v.as_u64())
                .unwrap_or(0) as u32,
            total_tokens: u.get("total_tokens").and_then(|v| v.as_u64()).unwrap_or(0) as u32,
        });

        Ok(ProviderResponse {
            content,
            finish_reason: choice["finish_reason"].as_str().map(String::from),
            usage,
        })
    }
}
