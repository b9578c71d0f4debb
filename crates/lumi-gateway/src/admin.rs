//! Admin API: tenant, FAQ and message-log management under `/admin`.
//!
//! FAQ writes go through the indexer so every stored FAQ carries an
//! embedding of its current text, or none at all if embedding failed.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use lumi_core::traits::{FaqStore, MessageStore, TenantStore};
use lumi_core::types::{Faq, FaqUpdate, Tenant, TenantUpdate};
use rand::Rng;
use rand::distributions::Alphanumeric;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::error::ApiError;
use crate::server::AppState;

type ApiResult<T> = Result<T, ApiError>;

const DEFAULT_MESSAGE_LIMIT: usize = 50;
const MAX_MESSAGE_LIMIT: usize = 500;

/// `{items, total}` list envelope.
fn list<T: Serialize>(items: Vec<T>) -> Json<Value> {
    let total = items.len();
    Json(json!({ "items": items, "total": total }))
}

fn generate_api_key() -> String {
    let token: String = rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(32)
        .map(char::from)
        .collect();
    format!("lumi_{token}")
}

async fn require_tenant(state: &AppState, id: &str) -> ApiResult<Tenant> {
    state
        .store
        .get_tenant(id)
        .await?
        .ok_or_else(|| ApiError::not_found(format!("Tenant {id} not found")))
}

/// FAQ as seen by admins: the vector itself stays server-side.
fn faq_view(faq: &Faq) -> Value {
    json!({
        "id": faq.id,
        "tenant_id": faq.tenant_id,
        "question": faq.question,
        "answer": faq.answer,
        "has_embedding": faq.has_embedding(),
        "created_at": faq.created_at,
        "updated_at": faq.updated_at,
    })
}

// ── Tenants ──────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct CreateTenant {
    pub name: String,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default)]
    pub system_prompt: Option<String>,
}

pub async fn list_tenants(State(state): State<Arc<AppState>>) -> ApiResult<Json<Value>> {
    Ok(list(state.store.list_tenants().await?))
}

pub async fn create_tenant(
    State(state): State<Arc<AppState>>,
    Json(req): Json<CreateTenant>,
) -> ApiResult<(StatusCode, Json<Tenant>)> {
    let name = req.name.trim();
    if name.is_empty() {
        return Err(ApiError::bad_request("Tenant name must not be empty"));
    }
    if state.store.get_tenant_by_name(name).await?.is_some() {
        return Err(ApiError::new(
            StatusCode::CONFLICT,
            format!("Tenant {name} already exists"),
        ));
    }
    let tenant = state
        .store
        .create_tenant(name, req.api_key.as_deref(), req.system_prompt.as_deref())
        .await?;
    tracing::info!("Created tenant {} ({})", tenant.name, tenant.id);
    Ok((StatusCode::CREATED, Json(tenant)))
}

pub async fn get_tenant(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> ApiResult<Json<Tenant>> {
    Ok(Json(require_tenant(&state, &id).await?))
}

pub async fn update_tenant(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(update): Json<TenantUpdate>,
) -> ApiResult<Json<Tenant>> {
    state
        .store
        .update_tenant(&id, &update)
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::not_found(format!("Tenant {id} not found")))
}

/// Deletes the tenant with all its FAQs and messages.
pub async fn delete_tenant(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> ApiResult<Json<Value>> {
    if !state.store.delete_tenant(&id).await? {
        return Err(ApiError::not_found(format!("Tenant {id} not found")));
    }
    tracing::info!("Deleted tenant {id}");
    Ok(Json(json!({ "deleted": true, "id": id })))
}

/// Issue a fresh API key. The previous key stops working immediately.
pub async fn rotate_api_key(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> ApiResult<Json<Value>> {
    let update = TenantUpdate {
        api_key: Some(generate_api_key()),
        ..TenantUpdate::default()
    };
    let tenant = state
        .store
        .update_tenant(&id, &update)
        .await?
        .ok_or_else(|| ApiError::not_found(format!("Tenant {id} not found")))?;
    tracing::info!("Rotated API key for tenant {id}");
    Ok(Json(json!({ "id": tenant.id, "api_key": tenant.api_key })))
}

// ── FAQs ─────────────────────────────────────────────────

#[derive(Debug, Clone, Deserialize)]
pub struct CreateFaq {
    pub question: String,
    pub answer: String,
}

impl CreateFaq {
    fn validate(&self) -> Result<(), String> {
        if self.question.trim().is_empty() || self.answer.trim().is_empty() {
            return Err("question and answer must not be empty".into());
        }
        Ok(())
    }
}

#[derive(Debug, Deserialize)]
pub struct BulkImport {
    pub items: Vec<CreateFaq>,
}

#[derive(Debug, Default, Serialize)]
pub struct BulkImportResponse {
    pub success_count: usize,
    pub error_count: usize,
    pub errors: Vec<String>,
}

pub async fn list_faqs(
    State(state): State<Arc<AppState>>,
    Path(tenant_id): Path<String>,
) -> ApiResult<Json<Value>> {
    require_tenant(&state, &tenant_id).await?;
    let faqs = state.store.list_faqs(&tenant_id).await?;
    Ok(list(faqs.iter().map(faq_view).collect::<Vec<_>>()))
}

pub async fn create_faq(
    State(state): State<Arc<AppState>>,
    Path(tenant_id): Path<String>,
    Json(req): Json<CreateFaq>,
) -> ApiResult<(StatusCode, Json<Value>)> {
    require_tenant(&state, &tenant_id).await?;
    req.validate().map_err(ApiError::bad_request)?;
    let faq = state
        .indexer
        .create_faq(&tenant_id, req.question.trim(), req.answer.trim())
        .await?;
    Ok((StatusCode::CREATED, Json(faq_view(&faq))))
}

pub async fn get_faq(
    State(state): State<Arc<AppState>>,
    Path((tenant_id, faq_id)): Path<(String, String)>,
) -> ApiResult<Json<Value>> {
    state
        .store
        .get_faq(&tenant_id, &faq_id)
        .await?
        .map(|faq| Json(faq_view(&faq)))
        .ok_or_else(|| ApiError::not_found(format!("FAQ {faq_id} not found")))
}

pub async fn update_faq(
    State(state): State<Arc<AppState>>,
    Path((tenant_id, faq_id)): Path<(String, String)>,
    Json(update): Json<FaqUpdate>,
) -> ApiResult<Json<Value>> {
    state
        .indexer
        .update_faq(&tenant_id, &faq_id, &update)
        .await?
        .map(|faq| Json(faq_view(&faq)))
        .ok_or_else(|| ApiError::not_found(format!("FAQ {faq_id} not found")))
}

pub async fn delete_faq(
    State(state): State<Arc<AppState>>,
    Path((tenant_id, faq_id)): Path<(String, String)>,
) -> ApiResult<Json<Value>> {
    if !state.store.delete_faq(&tenant_id, &faq_id).await? {
        return Err(ApiError::not_found(format!("FAQ {faq_id} not found")));
    }
    Ok(Json(json!({ "deleted": true, "id": faq_id })))
}

/// Import many FAQs; one bad item does not stop the rest.
pub async fn bulk_import_faqs(
    State(state): State<Arc<AppState>>,
    Path(tenant_id): Path<String>,
    Json(req): Json<BulkImport>,
) -> ApiResult<Json<BulkImportResponse>> {
    require_tenant(&state, &tenant_id).await?;

    let mut report = BulkImportResponse::default();
    for (i, item) in req.items.iter().enumerate() {
        let outcome = match item.validate() {
            Ok(()) => state
                .indexer
                .create_faq(&tenant_id, item.question.trim(), item.answer.trim())
                .await
                .map(|_| ())
                .map_err(|e| e.to_string()),
            Err(msg) => Err(msg),
        };
        match outcome {
            Ok(()) => report.success_count += 1,
            Err(msg) => {
                report.error_count += 1;
                report.errors.push(format!("Item {i}: {msg}"));
            }
        }
    }
    tracing::info!(
        "Bulk import for tenant {tenant_id}: {} imported, {} failed",
        report.success_count,
        report.error_count
    );
    Ok(Json(report))
}

// ── Messages ─────────────────────────────────────────────

#[derive(Debug, Default, Deserialize)]
pub struct MessagesQuery {
    pub limit: Option<usize>,
}

/// Conversation log, most recent first.
pub async fn list_messages(
    State(state): State<Arc<AppState>>,
    Path(tenant_id): Path<String>,
    Query(q): Query<MessagesQuery>,
) -> ApiResult<Json<Value>> {
    require_tenant(&state, &tenant_id).await?;
    let limit = q
        .limit
        .unwrap_or(DEFAULT_MESSAGE_LIMIT)
        .min(MAX_MESSAGE_LIMIT);
    Ok(list(state.store.list_messages(&tenant_id, limit).await?))
}
