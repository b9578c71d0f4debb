//! SQLite store for tenants, FAQs and messages.

use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use lumi_core::error::{LumiError, Result};
use lumi_core::traits::{FaqStore, MessageStore, TenantStore};
use lumi_core::types::{Embedding, Faq, FaqUpdate, Message, MessageRole, Tenant, TenantUpdate};
use rusqlite::{Connection, OptionalExtension, params};

/// Shared SELECT column lists.
const TENANT_SELECT: &str =
    "SELECT id, name, api_key, system_prompt, created_at, updated_at FROM tenants";
const FAQ_SELECT: &str =
    "SELECT id, tenant_id, question, answer, embedding, created_at, updated_at FROM faqs";
const MESSAGE_SELECT: &str =
    "SELECT id, tenant_id, user_id, content, role, created_at FROM messages";

/// SQLite-backed store. One connection behind a mutex, locked per operation.
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

fn now() -> DateTime<Utc> {
    Utc::now()
}

/// Fixed-width RFC 3339 so that text ordering matches time ordering.
fn ts(t: &DateTime<Utc>) -> String {
    t.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_ts(idx: usize, s: String) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(&s)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e)))
}

fn row_to_tenant(row: &rusqlite::Row) -> rusqlite::Result<Tenant> {
    Ok(Tenant {
        id: row.get(0)?,
        name: row.get(1)?,
        api_key: row.get(2)?,
        system_prompt: row.get(3)?,
        created_at: parse_ts(4, row.get(4)?)?,
        updated_at: parse_ts(5, row.get(5)?)?,
    })
}

fn row_to_faq(row: &rusqlite::Row) -> rusqlite::Result<Faq> {
    let blob: Option<Vec<u8>> = row.get(4)?;
    let embedding = match blob {
        Some(bytes) => Some(Embedding::from_le_bytes(&bytes).map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(4, rusqlite::types::Type::Blob, Box::new(e))
        })?),
        None => None,
    };
    Ok(Faq {
        id: row.get(0)?,
        tenant_id: row.get(1)?,
        question: row.get(2)?,
        answer: row.get(3)?,
        embedding,
        created_at: parse_ts(5, row.get(5)?)?,
        updated_at: parse_ts(6, row.get(6)?)?,
    })
}

fn row_to_message(row: &rusqlite::Row) -> rusqlite::Result<Message> {
    let role: String = row.get(4)?;
    let role = MessageRole::parse(&role).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            4,
            rusqlite::types::Type::Text,
            format!("unknown message role '{role}'").into(),
        )
    })?;
    Ok(Message {
        id: row.get(0)?,
        tenant_id: row.get(1)?,
        user_id: row.get(2)?,
        content: row.get(3)?,
        role,
        created_at: parse_ts(5, row.get(5)?)?,
    })
}

fn db_err(op: &str) -> impl Fn(rusqlite::Error) -> LumiError + '_ {
    move |e| match &e {
        rusqlite::Error::SqliteFailure(f, _) if f.code == rusqlite::ErrorCode::ConstraintViolation => {
            LumiError::InvalidInput(format!("{op}: {e}"))
        }
        _ => LumiError::Storage(format!("{op}: {e}")),
    }
}

impl SqliteStore {
    /// Open or create the database at `path` and run migrations.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && path != Path::new(":memory:") {
                std::fs::create_dir_all(parent)?;
            }
        }
        let conn = Connection::open(path).map_err(db_err("DB open"))?;
        Self::init(conn)
    }

    /// Fresh private in-memory database.
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(db_err("DB open"))?;
        Self::init(conn)
    }

    fn init(conn: Connection) -> Result<Self> {
        // foreign_keys is per-connection and off by default
        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA synchronous = NORMAL;
             PRAGMA busy_timeout = 5000;
             PRAGMA foreign_keys = ON;",
        )
        .map_err(db_err("DB pragma"))?;

        let store = Self { conn: Mutex::new(conn) };
        store.migrate()?;
        Ok(store)
    }

    fn migrate(&self) -> Result<()> {
        self.conn()?
            .execute_batch(
                "
            CREATE TABLE IF NOT EXISTS tenants (
                id TEXT PRIMARY KEY,
                name TEXT UNIQUE NOT NULL,
                api_key TEXT UNIQUE,
                system_prompt TEXT,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS faqs (
                id TEXT PRIMARY KEY,
                tenant_id TEXT NOT NULL REFERENCES tenants(id) ON DELETE CASCADE,
                question TEXT NOT NULL,
                answer TEXT NOT NULL,
                embedding BLOB,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_faqs_tenant ON faqs(tenant_id, created_at);

            CREATE TABLE IF NOT EXISTS messages (
                id TEXT PRIMARY KEY,
                tenant_id TEXT NOT NULL REFERENCES tenants(id) ON DELETE CASCADE,
                user_id TEXT NOT NULL,
                content TEXT NOT NULL,
                role TEXT NOT NULL CHECK (role IN ('user', 'assistant')),
                created_at TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_messages_tenant ON messages(tenant_id, created_at);
            ",
            )
            .map_err(db_err("Migration"))?;
        Ok(())
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| LumiError::Storage("database mutex poisoned".into()))
    }

    fn query_tenant(&self, clause: &str, value: &str) -> Result<Option<Tenant>> {
        self.conn()?
            .query_row(
                &format!("{TENANT_SELECT} WHERE {clause}=?1"),
                params![value],
                row_to_tenant,
            )
            .optional()
            .map_err(db_err("Get tenant"))
    }

    fn fetch_faq(conn: &Connection, tenant_id: &str, id: &str) -> Result<Option<Faq>> {
        conn.query_row(
            &format!("{FAQ_SELECT} WHERE tenant_id=?1 AND id=?2"),
            params![tenant_id, id],
            row_to_faq,
        )
        .optional()
        .map_err(db_err("Get FAQ"))
    }
}

#[async_trait]
impl TenantStore for SqliteStore {
    async fn create_tenant(
        &self,
        name: &str,
        api_key: Option<&str>,
        system_prompt: Option<&str>,
    ) -> Result<Tenant> {
        let name = name.trim();
        if name.is_empty() {
            return Err(LumiError::InvalidInput("tenant name is empty".into()));
        }
        let id = uuid::Uuid::new_v4().to_string();
        let t = now();
        self.conn()?
            .execute(
                "INSERT INTO tenants (id, name, api_key, system_prompt, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?5)",
                params![id, name, api_key, system_prompt, ts(&t)],
            )
            .map_err(db_err("Insert tenant"))?;

        tracing::info!("Created tenant '{}' ({})", name, id);
        Ok(Tenant {
            id,
            name: name.to_string(),
            api_key: api_key.map(String::from),
            system_prompt: system_prompt.map(String::from),
            created_at: t,
            updated_at: t,
        })
    }

    async fn get_tenant(&self, id: &str) -> Result<Option<Tenant>> {
        self.query_tenant("id", id)
    }

    async fn get_tenant_by_name(&self, name: &str) -> Result<Option<Tenant>> {
        self.query_tenant("name", name)
    }

    async fn get_tenant_by_api_key(&self, api_key: &str) -> Result<Option<Tenant>> {
        if api_key.is_empty() {
            return Ok(None);
        }
        self.query_tenant("api_key", api_key)
    }

    async fn list_tenants(&self) -> Result<Vec<Tenant>> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare(&format!("{TENANT_SELECT} ORDER BY created_at, rowid"))
            .map_err(db_err("Prepare"))?;
        let tenants = stmt
            .query_map([], row_to_tenant)
            .map_err(db_err("Query tenants"))?
            .collect::<rusqlite::Result<Vec<_>>>()
            .map_err(db_err("Read tenant"))?;
        Ok(tenants)
    }

    async fn update_tenant(&self, id: &str, update: &TenantUpdate) -> Result<Option<Tenant>> {
        if let Some(name) = &update.name {
            if name.trim().is_empty() {
                return Err(LumiError::InvalidInput("tenant name is empty".into()));
            }
        }
        let conn = self.conn()?;
        let changed = conn
            .execute(
                "UPDATE tenants SET
                    name = COALESCE(?1, name),
                    api_key = COALESCE(?2, api_key),
                    system_prompt = COALESCE(?3, system_prompt),
                    updated_at = ?4
                 WHERE id = ?5",
                params![
                    update.name.as_deref().map(str::trim),
                    update.api_key,
                    update.system_prompt,
                    ts(&now()),
                    id
                ],
            )
            .map_err(db_err("Update tenant"))?;
        if changed == 0 {
            return Ok(None);
        }
        conn.query_row(&format!("{TENANT_SELECT} WHERE id=?1"), params![id], row_to_tenant)
            .optional()
            .map_err(db_err("Get tenant"))
    }

    async fn delete_tenant(&self, id: &str) -> Result<bool> {
        let removed = self
            .conn()?
            .execute("DELETE FROM tenants WHERE id=?1", params![id])
            .map_err(db_err("Delete tenant"))?;
        if removed > 0 {
            tracing::info!("Deleted tenant {} with its FAQs and messages", id);
        }
        Ok(removed > 0)
    }

    async fn ping(&self) -> Result<()> {
        self.conn()?
            .query_row("SELECT 1", [], |row| row.get::<_, i64>(0))
            .map_err(db_err("Ping"))?;
        Ok(())
    }
}

#[async_trait]
impl FaqStore for SqliteStore {
    async fn create_faq(
        &self,
        tenant_id: &str,
        question: &str,
        answer: &str,
        embedding: Option<&Embedding>,
    ) -> Result<Faq> {
        if question.trim().is_empty() || answer.trim().is_empty() {
            return Err(LumiError::InvalidInput("question and answer are required".into()));
        }
        let id = uuid::Uuid::new_v4().to_string();
        let t = now();
        self.conn()?
            .execute(
                "INSERT INTO faqs (id, tenant_id, question, answer, embedding, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?6)",
                params![
                    id,
                    tenant_id,
                    question,
                    answer,
                    embedding.map(Embedding::to_le_bytes),
                    ts(&t)
                ],
            )
            .map_err(db_err("Insert FAQ"))?;

        Ok(Faq {
            id,
            tenant_id: tenant_id.to_string(),
            question: question.to_string(),
            answer: answer.to_string(),
            embedding: embedding.cloned(),
            created_at: t,
            updated_at: t,
        })
    }

    async fn get_faq(&self, tenant_id: &str, id: &str) -> Result<Option<Faq>> {
        Self::fetch_faq(&*self.conn()?, tenant_id, id)
    }

    async fn list_faqs(&self, tenant_id: &str) -> Result<Vec<Faq>> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare(&format!("{FAQ_SELECT} WHERE tenant_id=?1 ORDER BY created_at, rowid"))
            .map_err(db_err("Prepare"))?;
        let faqs = stmt
            .query_map(params![tenant_id], row_to_faq)
            .map_err(db_err("Query FAQs"))?
            .collect::<rusqlite::Result<Vec<_>>>()
            .map_err(db_err("Read FAQ"))?;
        Ok(faqs)
    }

    async fn update_faq(
        &self,
        tenant_id: &str,
        id: &str,
        update: &FaqUpdate,
    ) -> Result<Option<Faq>> {
        let blank = |v: &Option<String>| v.as_deref().is_some_and(|s| s.trim().is_empty());
        if blank(&update.question) || blank(&update.answer) {
            return Err(LumiError::InvalidInput("question and answer must not be empty".into()));
        }
        let conn = self.conn()?;
        // A text change invalidates the stored vector in the same statement.
        let changed = conn
            .execute(
                "UPDATE faqs SET
                    question = COALESCE(?1, question),
                    answer = COALESCE(?2, answer),
                    embedding = CASE WHEN ?1 IS NULL AND ?2 IS NULL THEN embedding ELSE NULL END,
                    updated_at = ?3
                 WHERE tenant_id = ?4 AND id = ?5",
                params![update.question, update.answer, ts(&now()), tenant_id, id],
            )
            .map_err(db_err("Update FAQ"))?;
        if changed == 0 {
            return Ok(None);
        }
        Self::fetch_faq(&conn, tenant_id, id)
    }

    async fn delete_faq(&self, tenant_id: &str, id: &str) -> Result<bool> {
        let removed = self
            .conn()?
            .execute(
                "DELETE FROM faqs WHERE tenant_id=?1 AND id=?2",
                params![tenant_id, id],
            )
            .map_err(db_err("Delete FAQ"))?;
        Ok(removed > 0)
    }

    async fn set_embedding(
        &self,
        tenant_id: &str,
        id: &str,
        embedding: Option<&Embedding>,
    ) -> Result<()> {
        let changed = self
            .conn()?
            .execute(
                "UPDATE faqs SET embedding = ?1 WHERE tenant_id = ?2 AND id = ?3",
                params![embedding.map(Embedding::to_le_bytes), tenant_id, id],
            )
            .map_err(db_err("Set embedding"))?;
        if changed == 0 {
            return Err(LumiError::NotFound(format!("FAQ {id}")));
        }
        Ok(())
    }

    async fn list_faqs_needing_embedding(
        &self,
        tenant_id: Option<&str>,
        dimensions: usize,
    ) -> Result<Vec<Faq>> {
        let conn = self.conn()?;
        // Blobs are little-endian f32, four bytes per component.
        let mut stmt = conn
            .prepare(&format!(
                "{FAQ_SELECT} WHERE (embedding IS NULL OR length(embedding) != ?2)
                   AND (?1 IS NULL OR tenant_id = ?1)
                 ORDER BY created_at, rowid"
            ))
            .map_err(db_err("Prepare"))?;
        let blob_len = (dimensions * 4) as i64;
        let faqs = stmt
            .query_map(params![tenant_id, blob_len], row_to_faq)
            .map_err(db_err("Query FAQs"))?
            .collect::<rusqlite::Result<Vec<_>>>()
            .map_err(db_err("Read FAQ"))?;
        Ok(faqs)
    }
}

#[async_trait]
impl MessageStore for SqliteStore {
    async fn append_message(
        &self,
        tenant_id: &str,
        user_id: &str,
        content: &str,
        role: MessageRole,
    ) -> Result<Message> {
        let id = uuid::Uuid::new_v4().to_string();
        let t = now();
        self.conn()?
            .execute(
                "INSERT INTO messages (id, tenant_id, user_id, content, role, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![id, tenant_id, user_id, content, role.as_str(), ts(&t)],
            )
            .map_err(db_err("Insert message"))?;
        Ok(Message {
            id,
            tenant_id: tenant_id.to_string(),
            user_id: user_id.to_string(),
            content: content.to_string(),
            role,
            created_at: t,
        })
    }

    async fn list_messages(&self, tenant_id: &str, limit: usize) -> Result<Vec<Message>> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare(&format!(
                "{MESSAGE_SELECT} WHERE tenant_id=?1 ORDER BY created_at DESC, rowid DESC LIMIT ?2"
            ))
            .map_err(db_err("Prepare"))?;
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let messages = stmt
            .query_map(params![tenant_id, limit], row_to_message)
            .map_err(db_err("Query messages"))?
            .collect::<rusqlite::Result<Vec<_>>>()
            .map_err(db_err("Read message"))?;
        Ok(messages)
    }
}
