//! In-process app fixture with hand-written collaborators.

use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use axum::Router;
use axum::response::Response;
use lumi_core::config::LumiConfig;
use lumi_core::error::{LumiError, Result};
use lumi_core::observability::Metrics;
use lumi_core::traits::{Channel, ChatProvider, EmbeddingProvider, GenerateParams, TenantStore};
use lumi_core::types::{ChatMessage, Embedding, OutgoingMessage, ProviderResponse, Role, Tenant};
use lumi_db::SqliteStore;

use crate::server::{AppState, build_router_from_arc};

pub const KEYWORDS: &[&str] = &["hours", "refund", "shipping", "open"];
pub const API_KEY: &str = "test-api-key";

/// Bag-of-keywords embedder.
pub struct KeywordEmbedder {
    pub calls: AtomicUsize,
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
        KEYWORDS.len()
    }

    async fn embed(&self, text: &str) -> Result<Embedding> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let lower = text.to_lowercase();
        let v = KEYWORDS.iter().map(|k| lower.matches(k).count() as f32).collect();
        Embedding::new(v, KEYWORDS.len())
    }
}

/// Replies with the first `A: ` line of the context.
pub struct ScriptedChat {
    pub prompts: Mutex<Vec<Vec<ChatMessage>>>,
}

impl ScriptedChat {
    pub fn calls(&self) -> usize {
        self.prompts.lock().unwrap().len()
    }

    pub fn last_system_prompt(&self) -> String {
        self.prompts.lock().unwrap().last().unwrap()[0].content.clone()
    }
}

#[async_trait]
impl ChatProvider for ScriptedChat {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn chat(&self, messages: &[ChatMessage], _: &GenerateParams) -> Result<ProviderResponse> {
        self.prompts.lock().unwrap().push(messages.to_vec());
        let answer = messages
            .iter()
            .filter(|m| m.role == Role::User)
            .flat_map(|m| m.content.lines())
            .find_map(|l| l.strip_prefix("A: "))
            .unwrap_or("no idea")
            .to_string();
        Ok(ProviderResponse { content: Some(answer), ..ProviderResponse::default() })
    }
}

/// Records outbound messages; fails every send while `fail` is set.
#[derive(Default)]
pub struct RecordingChannel {
    pub sent: Mutex<Vec<OutgoingMessage>>,
    pub fail: AtomicBool,
}

impl RecordingChannel {
    pub fn sent(&self) -> Vec<OutgoingMessage> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl Channel for RecordingChannel {
    fn name(&self) -> &str {
        "recording"
    }

    async fn send(&self, message: OutgoingMessage) -> Result<String> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(LumiError::Channel("WhatsApp API error 500".into()));
        }
        self.sent.lock().unwrap().push(message);
        Ok("wamid.test".into())
    }
}

pub struct TestApp {
    pub state: Arc<AppState>,
    pub store: Arc<SqliteStore>,
    pub embedder: Arc<KeywordEmbedder>,
    pub chat: Arc<ScriptedChat>,
    pub channel: Arc<RecordingChannel>,
    /// Named "default" so the webhook resolves to it; owns one embedded FAQ.
    pub tenant: Tenant,
}

impl TestApp {
    pub async fn new() -> Self {
        Self::with_config(|_| {}).await
    }

    pub async fn with_config(configure: impl FnOnce(&mut LumiConfig)) -> Self {
        let mut config = LumiConfig::default();
        configure(&mut config);
        Self::build(config, SqliteStore::in_memory().unwrap()).await
    }

    /// Backed by a database file so a test can open a second connection to it.
    pub async fn with_db_file(path: &Path) -> Self {
        Self::build(LumiConfig::default(), SqliteStore::open(path).unwrap()).await
    }

    async fn build(config: LumiConfig, store: SqliteStore) -> Self {
        let store = Arc::new(store);
        let embedder = Arc::new(KeywordEmbedder { calls: AtomicUsize::new(0) });
        let chat = Arc::new(ScriptedChat { prompts: Mutex::new(Vec::new()) });
        let channel = Arc::new(RecordingChannel::default());
        let state = Arc::new(AppState::new(
            config,
            store.clone(),
            embedder.clone(),
            chat.clone(),
            channel.clone(),
            Arc::new(Metrics::new()),
        ));

        let tenant = store
            .create_tenant("default", Some(API_KEY), None)
            .await
            .unwrap();
        state
            .indexer
            .create_faq(&tenant.id, "What are your opening hours?", "9 to 5, Monday to Friday.")
            .await
            .unwrap();
        embedder.calls.store(0, Ordering::SeqCst);

        Self { state, store, embedder, chat, channel, tenant }
    }

    pub fn router(&self) -> Router {
        build_router_from_arc(self.state.clone())
    }
}

/// Buffer for log lines emitted on the current thread.
#[derive(Clone, Default)]
pub struct LogCapture(Arc<Mutex<Vec<u8>>>);

impl LogCapture {
    pub fn contents(&self) -> String {
        String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
    }
}

impl std::io::Write for LogCapture {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

/// Route this thread's `tracing` output into a buffer until the guard drops.
pub fn capture_logs() -> (LogCapture, tracing::subscriber::DefaultGuard) {
    let logs = LogCapture::default();
    let writer = logs.clone();
    let subscriber = tracing_subscriber::fmt()
        .with_writer(move || writer.clone())
        .with_ansi(false)
        .with_max_level(tracing::Level::DEBUG)
        .finish();
    (logs, tracing::subscriber::set_default(subscriber))
}

pub async fn body_text(resp: Response) -> String {
    let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
    String::from_utf8(bytes.to_vec()).unwrap()
}

pub async fn body_json(resp: Response) -> serde_json::Value {
    serde_json::from_str(&body_text(resp).await).unwrap()
}
