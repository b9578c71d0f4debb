//! # Lumi Knowledge
//!
//! The RAG pipeline: embed the question, rank the tenant's FAQs by cosine
//! similarity, and ask a chat model to answer from that context.
//!
//! Nothing in this crate returns an error to the end user. Failures resolve
//! to canned answers and are reported through [`lumi_core::ErrorKind`] and
//! the metrics registry.

pub mod composer;
pub mod indexer;
pub mod retriever;
pub mod similarity;

pub use composer::{DEFAULT_SYSTEM_PROMPT, ERROR_RESPONSE, NO_CONTEXT_RESPONSE, RagAnswer, ResponseComposer};
pub use indexer::{BackfillReport, FaqIndexer};
pub use retriever::{FaqRetriever, Retrieval, ScoredFaq, generate_embedding};
pub use similarity::{Similarity, cosine_similarity};

#[cfg(test)]
pub(crate) mod testing;
