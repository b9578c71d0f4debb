//! Grounded answer composition.
//!
//! retrieve → build context → prompt the chat model → answer or canned fallback.

use std::sync::Arc;

use lumi_core::ErrorKind;
use lumi_core::observability::Metrics;
use lumi_core::traits::{ChatProvider, GenerateParams};
use lumi_core::types::ChatMessage;

use crate::retriever::{FaqRetriever, ScoredFaq};

pub const NO_CONTEXT_RESPONSE: &str =
    "I couldn't find any relevant information to answer your question.";

pub const ERROR_RESPONSE: &str = "Sorry, I encountered an error while processing your request.";

pub const DEFAULT_SYSTEM_PROMPT: &str = "You are a helpful assistant. Answer the question based on the provided context. If the context doesn't contain relevant information, say so.";

/// The composer's answer. Always user-presentable.
#[derive(Debug, Clone, PartialEq)]
pub struct RagAnswer {
    pub text: String,
    /// Ids of the FAQs given to the model, in ranked order.
    pub sources: Vec<String>,
    /// Why a canned answer was returned, if one was.
    pub failure: Option<ErrorKind>,
}

pub struct ResponseComposer {
    retriever: FaqRetriever,
    chat: Arc<dyn ChatProvider>,
    metrics: Arc<Metrics>,
    params: GenerateParams,
}

impl ResponseComposer {
    pub fn new(
        retriever: FaqRetriever,
        chat: Arc<dyn ChatProvider>,
        metrics: Arc<Metrics>,
        params: GenerateParams,
    ) -> Self {
        Self { retriever, chat, metrics, params }
    }

    /// Answer `query` for `tenant_id`. Never fails.
    ///
    /// `system_prompt` is the caller's choice (request override or tenant
    /// default); blank or `None` falls back to [`DEFAULT_SYSTEM_PROMPT`].
    pub async fn get_response(
        &self,
        tenant_id: &str,
        query: &str,
        system_prompt: Option<&str>,
        top_k: usize,
    ) -> RagAnswer {
        self.metrics.track_rag_attempt(tenant_id);

        let retrieval = self.retriever.find_relevant(tenant_id, query, top_k).await;
        if retrieval.is_empty() {
            tracing::warn!(
                "No relevant FAQs found for tenant {} ({})",
                tenant_id,
                retrieval.degraded.map(|k| k.as_str()).unwrap_or("no matches")
            );
            return RagAnswer {
                text: NO_CONTEXT_RESPONSE.to_string(),
                sources: Vec::new(),
                failure: Some(retrieval.degraded.unwrap_or(ErrorKind::DataAbsent)),
            };
        }

        let sources = retrieval.ids();
        let system = system_prompt
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .unwrap_or(DEFAULT_SYSTEM_PROMPT);
        let messages = [
            ChatMessage::system(system),
            ChatMessage::user(user_turn(&build_context(&retrieval.faqs), query)),
        ];

        let failure = match self.chat.chat(&messages, &self.params).await {
            Ok(resp) => match resp.content.filter(|c| !c.trim().is_empty()) {
                Some(text) => return RagAnswer { text, sources, failure: None },
                None => {
                    tracing::error!("Empty completion for tenant {tenant_id}");
                    ErrorKind::TransientUpstream
                }
            },
            Err(e) => {
                tracing::error!("Error generating RAG response for tenant {tenant_id}: {e}");
                e.kind()
            }
        };

        self.metrics.track_rag_failure(tenant_id);
        RagAnswer {
            text: ERROR_RESPONSE.to_string(),
            sources,
            failure: Some(failure),
        }
    }
}

/// `Q: ...\nA: ...` blocks joined by a blank line, in ranked order.
pub fn build_context(faqs: &[ScoredFaq]) -> String {
    faqs.iter()
        .map(|s| format!("Q: {}\nA: {}", s.faq.question, s.faq.answer))
        .collect::<Vec<_>>()
        .join("\n\n")
}

pub fn user_turn(context: &str, query: &str) -> String {
    format!("Context:\n{context}\n\nQuestion: {query}")
}
