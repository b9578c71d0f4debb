//! Per-tenant FAQ retrieval by brute-force cosine ranking.

use std::sync::Arc;

use lumi_core::ErrorKind;
use lumi_core::observability::{Metrics, SYSTEM_TAG};
use lumi_core::traits::{EmbeddingProvider, FaqStore};
use lumi_core::types::{Embedding, Faq};

use crate::similarity::Similarity;

/// Embed `text`, swallowing any failure.
///
/// Records one `embedding_generation_total{tenant_id=tag}` event per call,
/// plus an error event when the call fails.
pub async fn generate_embedding(
    provider: &dyn EmbeddingProvider,
    metrics: &Metrics,
    tag: &str,
    text: &str,
) -> Option<Embedding> {
    match provider.embed(text).await {
        Ok(embedding) => {
            metrics.track_embedding(tag, true);
            Some(embedding)
        }
        Err(e) => {
            metrics.track_embedding(tag, false);
            tracing::error!(
                "Error generating embedding (tag={}, model={}, kind={}): {}",
                tag,
                provider.model_name(),
                e.kind(),
                e
            );
            None
        }
    }
}

/// An FAQ with its similarity to the query.
#[derive(Debug, Clone)]
pub struct ScoredFaq {
    pub faq: Faq,
    pub score: f32,
}

/// Ranked retrieval result.
///
/// `degraded` is set when the list is empty because something failed or
/// there was nothing to search, as opposed to a plain `top_k == 0`.
#[derive(Debug, Clone, Default)]
pub struct Retrieval {
    pub faqs: Vec<ScoredFaq>,
    pub degraded: Option<ErrorKind>,
}

impl Retrieval {
    fn degraded(kind: ErrorKind) -> Self {
        Self { faqs: Vec::new(), degraded: Some(kind) }
    }

    pub fn is_empty(&self) -> bool {
        self.faqs.is_empty()
    }

    pub fn ids(&self) -> Vec<String> {
        self.faqs.iter().map(|s| s.faq.id.clone()).collect()
    }
}

pub struct FaqRetriever {
    embedder: Arc<dyn EmbeddingProvider>,
    store: Arc<dyn FaqStore>,
    metrics: Arc<Metrics>,
    max_top_k: usize,
}

impl FaqRetriever {
    pub fn new(
        embedder: Arc<dyn EmbeddingProvider>,
        store: Arc<dyn FaqStore>,
        metrics: Arc<Metrics>,
        max_top_k: usize,
    ) -> Self {
        Self { embedder, store, metrics, max_top_k }
    }

    /// The `min(top_k, max_top_k)` most similar FAQs of `tenant_id`.
    ///
    /// Never fails. Ties keep store order, which is oldest first.
    pub async fn find_relevant(&self, tenant_id: &str, query: &str, top_k: usize) -> Retrieval {
        let Some(query_embedding) =
            generate_embedding(self.embedder.as_ref(), &self.metrics, SYSTEM_TAG, query).await
        else {
            tracing::error!("Failed to generate embedding for query (tenant={tenant_id})");
            return Retrieval::degraded(ErrorKind::TransientUpstream);
        };

        let faqs = match self.store.list_faqs(tenant_id).await {
            Ok(faqs) => faqs,
            Err(e) => {
                tracing::error!("Error loading FAQs for tenant {tenant_id}: {e}");
                return Retrieval::degraded(e.kind());
            }
        };
        if faqs.is_empty() {
            tracing::warn!("No FAQs found for tenant {tenant_id}");
            return Retrieval::degraded(ErrorKind::DataAbsent);
        }

        // Vectors from another model width cannot be compared; skip them.
        let dims = query_embedding.dimensions();
        let total = faqs.len();
        let comparable: Vec<Faq> = faqs
            .into_iter()
            .filter(|faq| faq.embedding.as_ref().is_some_and(|e| e.dimensions() == dims))
            .collect();
        let mismatched = total - comparable.len();
        if mismatched > 0 {
            tracing::warn!(
                "Skipped {mismatched} FAQ(s) for tenant {tenant_id} without a {dims}-dim embedding"
            );
        }

        let q = query_embedding.as_slice();
        let mut scored: Vec<ScoredFaq> = comparable
            .into_iter()
            .map(|faq| {
                let score = faq.similarity_to(q);
                ScoredFaq { faq, score }
            })
            .collect();
        if scored.is_empty() {
            tracing::warn!("No embedded FAQs for tenant {tenant_id}");
            return Retrieval::degraded(ErrorKind::DataAbsent);
        }

        // sort_by is stable
        scored.sort_by(|a, b| b.score.total_cmp(&a.score));
        scored.truncate(top_k.min(self.max_top_k));

        tracing::debug!(
            "Retrieved {} FAQs for tenant {} (top score {:?})",
            scored.len(),
            tenant_id,
            scored.first().map(|s| s.score)
        );
        Retrieval { faqs: scored, degraded: None }
    }
}
