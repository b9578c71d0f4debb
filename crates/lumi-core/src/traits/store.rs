//! Persistence collaborators.
//!
//! Every FAQ and message operation takes the owning tenant id so that a
//! lookup can never cross a tenant boundary.

use async_trait::async_trait;

use crate::error::Result;
use crate::types::{Embedding, Faq, FaqUpdate, Message, MessageRole, Tenant, TenantUpdate};

#[async_trait]
pub trait TenantStore: Send + Sync {
    async fn create_tenant(
        &self,
        name: &str,
        api_key: Option<&str>,
        system_prompt: Option<&str>,
    ) -> Result<Tenant>;

    async fn get_tenant(&self, id: &str) -> Result<Option<Tenant>>;

    async fn get_tenant_by_name(&self, name: &str) -> Result<Option<Tenant>>;

    async fn get_tenant_by_api_key(&self, api_key: &str) -> Result<Option<Tenant>>;

    async fn list_tenants(&self) -> Result<Vec<Tenant>>;

    async fn update_tenant(&self, id: &str, update: &TenantUpdate) -> Result<Option<Tenant>>;

    /// Delete a tenant together with its FAQs and messages.
    async fn delete_tenant(&self, id: &str) -> Result<bool>;

    /// Cheap round-trip used by readiness checks.
    async fn ping(&self) -> Result<()>;
}

#[async_trait]
pub trait FaqStore: Send + Sync {
    async fn create_faq(
        &self,
        tenant_id: &str,
        question: &str,
        answer: &str,
        embedding: Option<&Embedding>,
    ) -> Result<Faq>;

    async fn get_faq(&self, tenant_id: &str, id: &str) -> Result<Option<Faq>>;

    /// All FAQs of a tenant, oldest first (ties in insertion order).
    async fn list_faqs(&self, tenant_id: &str) -> Result<Vec<Faq>>;

    /// Apply a partial update. Changing the question or answer clears the
    /// stored embedding atomically with the text.
    async fn update_faq(&self, tenant_id: &str, id: &str, update: &FaqUpdate)
    -> Result<Option<Faq>>;

    async fn delete_faq(&self, tenant_id: &str, id: &str) -> Result<bool>;

    /// Replace (or clear) the cached embedding of one FAQ.
    async fn set_embedding(&self, tenant_id: &str, id: &str, embedding: Option<&Embedding>)
    -> Result<()>;

    /// FAQs with no embedding or one whose width is not `dimensions`,
    /// optionally restricted to one tenant.
    async fn list_faqs_needing_embedding(
        &self,
        tenant_id: Option<&str>,
        dimensions: usize,
    ) -> Result<Vec<Faq>>;
}

#[async_trait]
pub trait MessageStore: Send + Sync {
    async fn append_message(
        &self,
        tenant_id: &str,
        user_id: &str,
        content: &str,
        role: MessageRole,
    ) -> Result<Message>;

    /// Most recent messages first.
    async fn list_messages(&self, tenant_id: &str, limit: usize) -> Result<Vec<Message>>;
}

/// Everything the gateway needs from the relational store.
pub trait Store: TenantStore + FaqStore + MessageStore {}

impl<T: TenantStore + FaqStore + MessageStore> Store for T {}
