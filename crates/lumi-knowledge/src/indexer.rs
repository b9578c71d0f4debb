//! Write-time FAQ embeddings.
//!
//! The embedding is a cached derived value: computed on create and on any
//! question/answer change, tagged with the owning tenant in metrics. When
//! the embedding call fails the FAQ is still stored, just without one, and
//! stays invisible to retrieval until a backfill succeeds.

use std::sync::Arc;

use lumi_core::error::Result;
use lumi_core::observability::Metrics;
use lumi_core::traits::{EmbeddingProvider, FaqStore};
use lumi_core::types::{Embedding, Faq, FaqUpdate};

use crate::retriever::generate_embedding;

/// Text that represents an FAQ in embedding space.
pub fn embedding_text(question: &str, answer: &str) -> String {
    format!("{question}\n{answer}")
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BackfillReport {
    pub embedded: usize,
    pub failed: usize,
}

pub struct FaqIndexer {
    embedder: Arc<dyn EmbeddingProvider>,
    store: Arc<dyn FaqStore>,
    metrics: Arc<Metrics>,
}

impl FaqIndexer {
    pub fn new(
        embedder: Arc<dyn EmbeddingProvider>,
        store: Arc<dyn FaqStore>,
        metrics: Arc<Metrics>,
    ) -> Self {
        Self { embedder, store, metrics }
    }

    async fn embed(&self, tenant_id: &str, question: &str, answer: &str) -> Option<Embedding> {
        generate_embedding(
            self.embedder.as_ref(),
            &self.metrics,
            tenant_id,
            &embedding_text(question, answer),
        )
        .await
    }

    pub async fn create_faq(&self, tenant_id: &str, question: &str, answer: &str) -> Result<Faq> {
        let embedding = self.embed(tenant_id, question, answer).await;
        if embedding.is_none() {
            tracing::warn!("Storing FAQ without embedding for tenant {tenant_id}");
        }
        self.store
            .create_faq(tenant_id, question, answer, embedding.as_ref())
            .await
    }

    /// Apply `update` and refresh the embedding. `None` if the FAQ does not exist.
    pub async fn update_faq(
        &self,
        tenant_id: &str,
        id: &str,
        update: &FaqUpdate,
    ) -> Result<Option<Faq>> {
        let Some(mut faq) = self.store.update_faq(tenant_id, id, update).await? else {
            return Ok(None);
        };
        if update.is_empty() {
            return Ok(Some(faq));
        }
        // The store already cleared the old vector; readers see no embedding until this lands.
        let embedding = self.embed(tenant_id, &faq.question, &faq.answer).await;
        self.store
            .set_embedding(tenant_id, id, embedding.as_ref())
            .await?;
        faq.embedding = embedding;
        Ok(Some(faq))
    }

    /// Embed every FAQ that has no embedding, or one from a model of another width.
    pub async fn backfill(&self, tenant_id: Option<&str>) -> Result<BackfillReport> {
        let pending = self
            .store
            .list_faqs_needing_embedding(tenant_id, self.embedder.dimensions())
            .await?;
        let mut report = BackfillReport::default();
        for faq in pending {
            match self.embed(&faq.tenant_id, &faq.question, &faq.answer).await {
                Some(embedding) => {
                    self.store
                        .set_embedding(&faq.tenant_id, &faq.id, Some(&embedding))
                        .await?;
                    report.embedded += 1;
                }
                None => report.failed += 1,
            }
        }
        tracing::info!(
            "Backfill finished: {} embedded, {} failed",
            report.embedded,
            report.failed
        );
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{GatedEmbedder, KeywordEmbedder};
    use lumi_core::traits::TenantStore;
    use lumi_db::SqliteStore;

    const KEYWORDS: &[&str] = &["refund", "shipping"];

    async fn setup() -> (Arc<SqliteStore>, String, Arc<Metrics>) {
        let store = Arc::new(SqliteStore::in_memory().unwrap());
        let tenant = store.create_tenant("acme", None, None).await.unwrap().id;
        (store, tenant, Arc::new(Metrics::new()))
    }

    #[tokio::test]
    async fn test_create_embeds_with_tenant_tag() {
        let (store, tenant, metrics) = setup().await;
        let indexer = FaqIndexer::new(
            Arc::new(KeywordEmbedder::new(KEYWORDS)),
            store.clone(),
            metrics.clone(),
        );
        let faq = indexer.create_faq(&tenant, "Refund?", "Within 30 days.").await.unwrap();
        assert!(store.get_faq(&tenant, &faq.id).await.unwrap().unwrap().has_embedding());
        assert_eq!(metrics.embedding_generations.get(&[tenant.as_str()]), 1);
    }

    #[tokio::test]
    async fn test_create_survives_embedding_failure() {
        let (store, tenant, metrics) = setup().await;
        let indexer = FaqIndexer::new(Arc::new(KeywordEmbedder::failing()), store.clone(), metrics.clone());
        let faq = indexer.create_faq(&tenant, "Refund?", "Yes.").await.unwrap();
        assert!(!faq.has_embedding());
        assert_eq!(metrics.embedding_errors.get(&[tenant.as_str()]), 1);
    }

    #[tokio::test]
    async fn test_update_refreshes_embedding() {
        let (store, tenant, metrics) = setup().await;
        let embedder = Arc::new(KeywordEmbedder::new(KEYWORDS));
        let indexer = FaqIndexer::new(embedder.clone(), store.clone(), metrics);
        let faq = indexer.create_faq(&tenant, "Refund?", "Yes.").await.unwrap();

        let update = FaqUpdate { question: Some("Shipping?".into()), answer: Some("2 days.".into()) };
        let updated = indexer.update_faq(&tenant, &faq.id, &update).await.unwrap().unwrap();
        let expected = embedder.vector(&embedding_text("Shipping?", "2 days."));
        assert_eq!(updated.embedding.unwrap().as_slice(), expected.as_slice());

        let missing = indexer.update_faq(&tenant, "nope", &update).await.unwrap();
        assert!(missing.is_none());
    }

    #[tokio::test]
    async fn test_update_clears_embedding_on_failure() {
        let (store, tenant, metrics) = setup().await;
        let good = FaqIndexer::new(Arc::new(KeywordEmbedder::new(KEYWORDS)), store.clone(), metrics.clone());
        let faq = good.create_faq(&tenant, "Refund?", "Yes.").await.unwrap();
        assert!(faq.has_embedding());

        let bad = FaqIndexer::new(Arc::new(KeywordEmbedder::failing()), store.clone(), metrics);
        let update = FaqUpdate { answer: Some("No.".into()), ..FaqUpdate::default() };
        bad.update_faq(&tenant, &faq.id, &update).await.unwrap();
        assert!(!store.get_faq(&tenant, &faq.id).await.unwrap().unwrap().has_embedding());
    }

    #[tokio::test]
    async fn test_no_stale_embedding_visible_while_reembedding() {
        let (store, tenant, metrics) = setup().await;
        let faq = store
            .create_faq(&tenant, "Refund?", "Yes.", Some(&Embedding::checked(vec![1.0, 0.0]).unwrap()))
            .await
            .unwrap();

        let embedder = Arc::new(GatedEmbedder::new(KEYWORDS));
        let indexer = Arc::new(FaqIndexer::new(embedder.clone(), store.clone(), metrics));
        let update = FaqUpdate { answer: Some("No.".into()), ..FaqUpdate::default() };
        let task = {
            let (indexer, tenant, id) = (indexer.clone(), tenant.clone(), faq.id.clone());
            tokio::spawn(async move { indexer.update_faq(&tenant, &id, &update).await })
        };

        // The new text is committed and the embedding call is in flight.
        embedder.entered.notified().await;
        let mid = store.get_faq(&tenant, &faq.id).await.unwrap().unwrap();
        assert_eq!(mid.answer, "No.");
        assert!(!mid.has_embedding());

        embedder.release.notify_one();
        let done = task.await.unwrap().unwrap().unwrap();
        assert!(done.has_embedding());
        assert!(store.get_faq(&tenant, &faq.id).await.unwrap().unwrap().has_embedding());
    }

    #[tokio::test]
    async fn test_backfill() {
        let (store, tenant, metrics) = setup().await;
        store.create_faq(&tenant, "Refund?", "Yes.", None).await.unwrap();
        store.create_faq(&tenant, "Shipping?", "Fast.", None).await.unwrap();
        // Left over from a wider model.
        let stale = Embedding::checked(vec![1.0, 0.0, 0.0]).unwrap();
        let old = store.create_faq(&tenant, "Refund window?", "30 days.", Some(&stale)).await.unwrap();

        let indexer = FaqIndexer::new(Arc::new(KeywordEmbedder::new(KEYWORDS)), store.clone(), metrics);
        let report = indexer.backfill(Some(&tenant)).await.unwrap();
        assert_eq!(report, BackfillReport { embedded: 3, failed: 0 });
        let refreshed = store.get_faq(&tenant, &old.id).await.unwrap().unwrap();
        assert_eq!(refreshed.embedding.unwrap().dimensions(), KEYWORDS.len());
        assert!(store.list_faqs_needing_embedding(None, KEYWORDS.len()).await.unwrap().is_empty());
    }
}
