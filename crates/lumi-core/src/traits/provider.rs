//! Chat-completion provider trait.

use async_trait::async_trait;

use crate::error::Result;
use crate::types::{ChatMessage, ProviderResponse};

/// Sampling parameters for one completion.
#[derive(Debug, Clone, PartialEq)]
pub struct GenerateParams {
    pub model: String,
    pub temperature: f32,
    pub max_tokens: u32,
}

impl Default for GenerateParams {
    fn default() -> Self {
        Self {
            model: "gpt-3.5-turbo".into(),
            temperature: 0.7,
            max_tokens: 500,
        }
    }
}

#[async_trait]
pub trait ChatProvider: Send + Sync {
    fn name(&self) -> &str;

    async fn chat(&self, messages: &[ChatMessage], params: &GenerateParams)
    -> Result<ProviderResponse>;
}
