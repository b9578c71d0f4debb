//! Traits at each seam of the pipeline.

pub mod channel;
pub mod embedding;
pub mod provider;
pub mod store;

pub use channel::Channel;
pub use embedding::EmbeddingProvider;
pub use provider::{ChatProvider, GenerateParams};
pub use store::{FaqStore, MessageStore, Store, TenantStore};
