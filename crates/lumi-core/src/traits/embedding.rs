//! Embedding provider trait.

use async_trait::async_trait;

use crate::error::Result;
use crate::types::Embedding;

/// Turns text into a fixed-width vector.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    fn name(&self) -> &str;

    fn model_name(&self) -> &str;

    /// Width of every vector this provider returns.
    fn dimensions(&self) -> usize;

    /// Embed a single text. The result is validated against [`Self::dimensions`].
    async fn embed(&self, text: &str) -> Result<Embedding>;
}
