//! Hand-written collaborators for pipeline tests.

use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use chrono::Utc;
use lumi_core::error::{LumiError, Result};
use lumi_core::traits::{ChatProvider, EmbeddingProvider, FaqStore, GenerateParams};
use lumi_core::types::{ChatMessage, Embedding, Faq, FaqUpdate, ProviderResponse, Role};

pub fn faq(id: &str, tenant_id: &str, embedding: Option<Vec<f32>>) -> Faq {
    let now = Utc::now();
    Faq {
        id: id.into(),
        tenant_id: tenant_id.into(),
        question: format!("question {id}"),
        answer: format!("answer {id}"),
        embedding: embedding.map(|v| Embedding::checked(v).unwrap()),
        created_at: now,
        updated_at: now,
    }
}

/// Bag-of-keywords embedder: component `i` counts keyword `i` in the text.
pub struct KeywordEmbedder {
    keywords: Vec<&'static str>,
    fail: bool,
    pub calls: AtomicUsize,
}

impl KeywordEmbedder {
    pub fn new(keywords: &[&'static str]) -> Self {
        Self { keywords: keywords.to_vec(), fail: false, calls: AtomicUsize::new(0) }
    }

    pub fn failing() -> Self {
        Self { keywords: vec!["x"], fail: true, calls: AtomicUsize::new(0) }
    }

    pub fn vector(&self, text: &str) -> Vec<f32> {
        let lower = text.to_lowercase();
        self.keywords
            .iter()
            .map(|k| lower.matches(k).count() as f32)
            .collect()
    }
}

#[async_trait]
impl EmbeddingProvider for KeywordEmbedder {
    fn name(&self) -> &str {
        "keyword"
    }

    fn model_name(&self) -> &str {
        "keyword-bag"
    }

    fn dimensions(&self) -> usize {
        self.keywords.len()
    }

    async fn embed(&self, text: &str) -> Result<Embedding> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(LumiError::Timeout("embedding".into()));
        }
        Embedding::new(self.vector(text), self.keywords.len())
    }
}

/// Embedder that parks every call until `release` is notified.
pub struct GatedEmbedder {
    inner: KeywordEmbedder,
    pub entered: tokio::sync::Notify,
    pub release: tokio::sync::Notify,
}

impl GatedEmbedder {
    pub fn new(keywords: &[&'static str]) -> Self {
        Self {
            inner: KeywordEmbedder::new(keywords),
            entered: tokio::sync::Notify::new(),
            release: tokio::sync::Notify::new(),
        }
    }
}

#[async_trait]
impl EmbeddingProvider for GatedEmbedder {
    fn name(&self) -> &str {
        "gated"
    }

    fn model_name(&self) -> &str {
        self.inner.model_name()
    }

    fn dimensions(&self) -> usize {
        self.inner.dimensions()
    }

    async fn embed(&self, text: &str) -> Result<Embedding> {
        self.entered.notify_one();
        self.release.notified().await;
        self.inner.embed(text).await
    }
}

pub enum ChatBehavior {
    /// Reply with the answer of the first FAQ in the context.
    FirstAnswer,
    Fail,
    Empty,
}

/// Chat model double that records every prompt it receives.
pub struct RecordingChat {
    behavior: ChatBehavior,
    pub prompts: Mutex<Vec<(Vec<ChatMessage>, GenerateParams)>>,
}

impl RecordingChat {
    pub fn new(behavior: ChatBehavior) -> Self {
        Self { behavior, prompts: Mutex::new(Vec::new()) }
    }

    pub fn calls(&self) -> usize {
        self.prompts.lock().unwrap().len()
    }

    pub fn last_prompt(&self) -> (Vec<ChatMessage>, GenerateParams) {
        self.prompts.lock().unwrap().last().cloned().unwrap()
    }
}

#[async_trait]
impl ChatProvider for RecordingChat {
    fn name(&self) -> &str {
        "recording"
    }

    async fn chat(&self, messages: &[ChatMessage], params: &GenerateParams) -> Result<ProviderResponse> {
        self.prompts.lock().unwrap().push((messages.to_vec(), params.clone()));
        match self.behavior {
            ChatBehavior::FirstAnswer => {
                let user = messages
                    .iter()
                    .find(|m| m.role == Role::User)
                    .map(|m| m.content.clone())
                    .unwrap_or_default();
                let answer = user
                    .lines()
                    .find_map(|l| l.strip_prefix("A: "))
                    .unwrap_or("no idea")
                    .to_string();
                Ok(ProviderResponse { content: Some(answer), ..ProviderResponse::default() })
            }
            ChatBehavior::Fail => Err(LumiError::Provider("upstream 503".into())),
            ChatBehavior::Empty => Ok(ProviderResponse::default()),
        }
    }
}

/// FaqStore whose every call fails.
pub struct BrokenStore;

#[async_trait]
impl FaqStore for BrokenStore {
    async fn create_faq(&self, _: &str, _: &str, _: &str, _: Option<&Embedding>) -> Result<Faq> {
        Err(LumiError::Storage("disk on fire".into()))
    }
    async fn get_faq(&self, _: &str, _: &str) -> Result<Option<Faq>> {
        Err(LumiError::Storage("disk on fire".into()))
    }
    async fn list_faqs(&self, _: &str) -> Result<Vec<Faq>> {
        Err(LumiError::Storage("disk on fire".into()))
    }
    async fn update_faq(&self, _: &str, _: &str, _: &FaqUpdate) -> Result<Option<Faq>> {
        Err(LumiError::Storage("disk on fire".into()))
    }
    async fn delete_faq(&self, _: &str, _: &str) -> Result<bool> {
        Err(LumiError::Storage("disk on fire".into()))
    }
    async fn set_embedding(&self, _: &str, _: &str, _: Option<&Embedding>) -> Result<()> {
        Err(LumiError::Storage("disk on fire".into()))
    }
    async fn list_faqs_needing_embedding(&self, _: Option<&str>, _: usize) -> Result<Vec<Faq>> {
        Err(LumiError::Storage("disk on fire".into()))
    }
}
