//! Public API route handlers.

use std::collections::HashMap;
use std::sync::Arc;

use axum::Json;
use axum::body::Bytes;
use axum::extract::{Query, State};
use axum::http::{HeaderMap, StatusCode, header};
use axum::response::{IntoResponse, Response};
use lumi_channels::WhatsAppChannel;
use lumi_core::traits::{MessageStore, TenantStore};
use lumi_core::types::{MessageRole, OutgoingMessage, Tenant};
use serde::Deserialize;
use serde_json::{Value, json};

use crate::error::ApiError;
use crate::server::AppState;

/// `user_id` recorded on assistant replies.
const ASSISTANT_USER_ID: &str = "system";

const QUERY_FAILED: &str = "An error occurred while processing your query.";

fn now() -> String {
    chrono::Utc::now().to_rfc3339()
}

pub async fn root() -> Json<Value> {
    Json(json!({
        "message": "Welcome to Lumi API",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

/// Liveness check.
pub async fn health_check() -> Json<Value> {
    Json(json!({
        "status": "healthy",
        "timestamp": now(),
    }))
}

/// Readiness check: the store must answer.
pub async fn ready(State(state): State<Arc<AppState>>) -> Json<Value> {
    let status = match state.store.ping().await {
        Ok(()) => "ready",
        Err(e) => {
            tracing::warn!("Readiness check failed: {e}");
            "not ready"
        }
    };
    Json(json!({
        "status": status,
        "timestamp": now(),
        "uptime_secs": state.start_time.elapsed().as_secs(),
    }))
}

/// Prometheus text exposition.
pub async fn metrics(State(state): State<Arc<AppState>>) -> Response {
    (
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4; charset=utf-8")],
        state.metrics.render(),
    )
        .into_response()
}

// ── RAG query ────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct QueryRequest {
    pub query: String,
    #[serde(default)]
    pub system_prompt: Option<String>,
    #[serde(default)]
    pub top_k: Option<usize>,
}

/// Resolve the calling tenant from `X-API-Key`.
async fn authenticate(state: &AppState, headers: &HeaderMap) -> Result<Tenant, ApiError> {
    let key = headers
        .get("X-API-Key")
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|k| !k.is_empty())
        .ok_or_else(|| ApiError::unauthorized("Missing API key"))?;

    match state.store.get_tenant_by_api_key(key).await {
        Ok(Some(tenant)) => Ok(tenant),
        Ok(None) => Err(ApiError::unauthorized("Invalid API key")),
        Err(e) => {
            tracing::error!("API key lookup failed: {e}");
            Err(ApiError::new(StatusCode::INTERNAL_SERVER_ERROR, QUERY_FAILED))
        }
    }
}

/// Answer a question from the calling tenant's FAQs.
pub async fn rag_query(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(req): Json<QueryRequest>,
) -> Result<Json<Value>, ApiError> {
    let tenant = authenticate(&state, &headers).await?;

    let query = req.query.trim();
    if query.is_empty() {
        return Err(ApiError::bad_request("Query must not be empty"));
    }
    state
        .metrics
        .tenant_requests
        .inc(&[tenant.id.as_str(), "/rag/query"]);

    let top_k = req.top_k.unwrap_or(state.config.retrieval.default_top_k);
    // Request override, then the tenant's own default.
    let system_prompt = req
        .system_prompt
        .as_deref()
        .filter(|s| !s.trim().is_empty())
        .or(tenant.system_prompt.as_deref());

    let answer = state
        .composer
        .get_response(&tenant.id, query, system_prompt, top_k)
        .await;

    // Degraded answers are still answers; the kind only goes to the log.
    if let Some(kind) = answer.failure {
        tracing::warn!(
            "RAG query degraded (operation=rag_query, tenant={}, kind={kind})",
            tenant.id
        );
    }

    Ok(Json(json!({
        "response": answer.text,
        "sources": answer.sources,
    })))
}

// ── WhatsApp webhook ─────────────────────────────────────

/// `hub.mode` or `hub_mode`.
fn hub_param<'a>(params: &'a HashMap<String, String>, name: &str) -> &'a str {
    params
        .get(&format!("hub.{name}"))
        .or_else(|| params.get(&format!("hub_{name}")))
        .map(String::as_str)
        .unwrap_or("")
}

/// WhatsApp webhook verification (GET): echo the challenge as an integer.
pub async fn whatsapp_webhook_verify(
    State(state): State<Arc<AppState>>,
    Query(params): Query<HashMap<String, String>>,
) -> Response {
    let tenant = state.config.whatsapp.tenant_id.as_str();
    let expected = state.config.whatsapp.verify_token.as_str();
    if expected.is_empty() {
        tracing::error!(
            "Webhook verification attempted but WH_TOKEN is not configured (operation=webhook_verify, tenant={tenant})"
        );
        return ApiError::new(
            StatusCode::INTERNAL_SERVER_ERROR,
            "Webhook token not configured",
        )
        .into_response();
    }

    let mode = hub_param(&params, "mode");
    let token = hub_param(&params, "verify_token");
    if mode != "subscribe" || token != expected {
        tracing::warn!(
            "Webhook verification failed (operation=webhook_verify, tenant={tenant}, mode={mode:?})"
        );
        return ApiError::new(StatusCode::FORBIDDEN, "Verification failed").into_response();
    }

    match hub_param(&params, "challenge").parse::<i64>() {
        Ok(challenge) => {
            tracing::info!("WhatsApp webhook verified (operation=webhook_verify, tenant={tenant})");
            Json(challenge).into_response()
        }
        Err(_) => ApiError::bad_request("Invalid challenge").into_response(),
    }
}

fn webhook_status(status: &str, message: &str) -> Json<Value> {
    Json(json!({ "status": status, "message": message }))
}

/// The tenant that owns WhatsApp traffic, by id or else by name.
async fn webhook_tenant(state: &AppState) -> lumi_core::Result<Option<Tenant>> {
    let key = state.config.whatsapp.tenant_id.as_str();
    if let Some(tenant) = state.store.get_tenant(key).await? {
        return Ok(Some(tenant));
    }
    state.store.get_tenant_by_name(key).await
}

/// WhatsApp webhook handler (POST). Always 200; the outcome is in the body.
pub async fn whatsapp_webhook(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Json<Value> {
    let secret = state.config.whatsapp.app_secret.as_str();
    if !secret.is_empty() {
        let signature = headers
            .get("X-Hub-Signature-256")
            .and_then(|v| v.to_str().ok())
            .unwrap_or("");
        if !WhatsAppChannel::verify_signature(secret, &body, signature) {
            tracing::warn!("Rejected webhook payload with invalid signature");
            return webhook_status("error", "Invalid signature");
        }
    }

    let payload: Value = match serde_json::from_slice(&body) {
        Ok(v) => v,
        Err(e) => {
            tracing::warn!("Malformed webhook payload: {e}");
            return webhook_status("error", "Invalid payload");
        }
    };

    let Some(inbound) = WhatsAppChannel::parse_webhook_message(&payload) else {
        tracing::debug!("Webhook payload carried no message");
        return webhook_status("ok", "No valid message found");
    };

    let Some((from, text)) = inbound.text().filter(|(_, t)| !t.trim().is_empty()) else {
        tracing::info!("Non-text message received: {}", inbound.kind.as_str());
        return webhook_status("ok", "Non-text message received");
    };

    handle_text_message(&state, from, text).await
}

/// Persist the user turn, answer it, persist the reply, then deliver it.
async fn handle_text_message(state: &AppState, from: &str, text: &str) -> Json<Value> {
    let tenant = match webhook_tenant(state).await {
        Ok(Some(t)) => t,
        Ok(None) => {
            tracing::error!(
                "Webhook tenant {:?} does not exist",
                state.config.whatsapp.tenant_id
            );
            return webhook_status("error", "Tenant not configured");
        }
        Err(e) => {
            tracing::error!("Webhook tenant lookup failed: {e}");
            return webhook_status("error", "Failed to process message");
        }
    };
    tracing::info!("Received message from {from} for tenant {}", tenant.id);
    state
        .metrics
        .tenant_requests
        .inc(&[tenant.id.as_str(), "/webhook"]);

    if let Err(e) = state
        .store
        .append_message(&tenant.id, from, text, MessageRole::User)
        .await
    {
        tracing::error!("Failed to store user message for tenant {}: {e}", tenant.id);
        return webhook_status("error", "Failed to process message");
    }

    let answer = state
        .composer
        .get_response(
            &tenant.id,
            text,
            tenant.system_prompt.as_deref(),
            state.config.retrieval.default_top_k,
        )
        .await;

    if let Err(e) = state
        .store
        .append_message(&tenant.id, ASSISTANT_USER_ID, &answer.text, MessageRole::Assistant)
        .await
    {
        tracing::error!("Failed to store assistant message for tenant {}: {e}", tenant.id);
        return webhook_status("error", "Failed to process message");
    }

    let reply = OutgoingMessage { to: from.to_string(), content: answer.text };
    match state.channel.send(reply).await {
        Ok(id) => {
            tracing::info!("Response sent to {from} ({id})");
            webhook_status("ok", "Message processed successfully")
        }
        Err(e) => {
            tracing::error!("Failed to send response to {from} via {}: {e}", state.channel.name());
            webhook_status("error", "Failed to send response")
        }
    }
}
