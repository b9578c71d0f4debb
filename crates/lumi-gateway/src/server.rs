//! HTTP server implementation using Axum.

use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::Router;
use axum::extract::{MatchedPath, Request, State};
use axum::http::{HeaderValue, Method, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use lumi_core::config::LumiConfig;
use lumi_core::observability::Metrics;
use lumi_core::traits::{
    Channel, ChatProvider, EmbeddingProvider, FaqStore, GenerateParams, Store,
};
use lumi_knowledge::{FaqIndexer, FaqRetriever, ResponseComposer};
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::error::ApiError;

/// Shared state for the gateway server.
pub struct AppState {
    pub config: Arc<LumiConfig>,
    pub store: Arc<dyn Store>,
    pub composer: Arc<ResponseComposer>,
    /// Write path for FAQs; keeps embeddings in step with their text.
    pub indexer: Arc<FaqIndexer>,
    /// Outbound replies for webhook messages.
    pub channel: Arc<dyn Channel>,
    pub metrics: Arc<Metrics>,
    pub start_time: Instant,
}

impl AppState {
    /// Wire the pipeline around one concrete store.
    pub fn new<S: Store + 'static>(
        config: LumiConfig,
        store: Arc<S>,
        embedder: Arc<dyn EmbeddingProvider>,
        chat: Arc<dyn ChatProvider>,
        channel: Arc<dyn Channel>,
        metrics: Arc<Metrics>,
    ) -> Self {
        let params = GenerateParams {
            model: config.llm.model.clone(),
            temperature: config.llm.temperature,
            max_tokens: config.llm.max_tokens,
        };
        let faqs: Arc<dyn FaqStore> = store.clone();
        let retriever = FaqRetriever::new(
            embedder.clone(),
            faqs.clone(),
            metrics.clone(),
            config.retrieval.max_top_k,
        );
        let composer = ResponseComposer::new(retriever, chat, metrics.clone(), params);
        let indexer = FaqIndexer::new(embedder, faqs, metrics.clone());

        Self {
            config: Arc::new(config),
            store,
            composer: Arc::new(composer),
            indexer: Arc::new(indexer),
            channel,
            metrics,
            start_time: Instant::now(),
        }
    }
}

/// Admin auth middleware: validates the X-Admin-Token header.
async fn require_admin(State(state): State<Arc<AppState>>, req: Request, next: Next) -> Response {
    // No admin token configured, allow all
    let expected = state.config.gateway.admin_token.as_str();
    if expected.is_empty() {
        return next.run(req).await;
    }

    let provided = req
        .headers()
        .get("X-Admin-Token")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("");
    if provided == expected {
        return next.run(req).await;
    }

    tracing::warn!("Rejected admin request: {} {}", req.method(), req.uri().path());
    ApiError::unauthorized("Invalid or missing admin token").into_response()
}

/// Request count, 5xx count, in-flight gauge and latency per route.
async fn track_metrics(State(state): State<Arc<AppState>>, req: Request, next: Next) -> Response {
    let method = req.method().to_string();
    // Route templates keep label cardinality bounded.
    let endpoint = req
        .extensions()
        .get::<MatchedPath>()
        .map(|p| p.as_str().to_string())
        .unwrap_or_else(|| req.uri().path().to_string());
    let labels = [method.as_str(), endpoint.as_str()];

    state.metrics.http_active.add(&labels, 1);
    let started = Instant::now();
    let response = next.run(req).await;
    let elapsed = started.elapsed();
    state.metrics.http_active.add(&labels, -1);

    let status = response.status();
    state.metrics.http_duration.observe(&labels, elapsed.as_secs_f64());
    state
        .metrics
        .http_requests
        .inc(&[method.as_str(), endpoint.as_str(), status.as_str()]);
    if status.is_server_error() {
        state.metrics.http_errors.inc(&labels);
        tracing::error!("Error processing request: {method} {endpoint} - Status: {status}");
    } else {
        tracing::debug!(
            "Request: {method} {endpoint} - Status: {status} - {}ms",
            elapsed.as_millis()
        );
    }
    response
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    let cors = CorsLayer::new()
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers(Any)
        .max_age(Duration::from_secs(3600));

    let parsed: Vec<HeaderValue> = origins
        .iter()
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .filter_map(|s| s.parse().ok())
        .collect();
    if parsed.is_empty() {
        cors.allow_origin(Any)
    } else {
        tracing::info!("CORS restricted to {} origin(s)", parsed.len());
        cors.allow_origin(AllowOrigin::list(parsed))
    }
}

/// Build the Axum router with all routes.
pub fn build_router(state: AppState) -> Router {
    build_router_from_arc(Arc::new(state))
}

pub fn build_router_from_arc(shared: Arc<AppState>) -> Router {
    use crate::admin;
    use crate::routes;

    // Admin routes: require a valid admin token when one is configured
    let protected = Router::new()
        .route(
            "/admin/tenants",
            get(admin::list_tenants).post(admin::create_tenant),
        )
        .route(
            "/admin/tenants/{id}",
            get(admin::get_tenant)
                .put(admin::update_tenant)
                .delete(admin::delete_tenant),
        )
        .route("/admin/tenants/{id}/api-key", post(admin::rotate_api_key))
        .route(
            "/admin/tenants/{id}/faqs",
            get(admin::list_faqs).post(admin::create_faq),
        )
        .route("/admin/tenants/{id}/faqs/bulk", post(admin::bulk_import_faqs))
        .route(
            "/admin/tenants/{id}/faqs/{faq_id}",
            get(admin::get_faq)
                .put(admin::update_faq)
                .delete(admin::delete_faq),
        )
        .route("/admin/tenants/{id}/messages", get(admin::list_messages))
        .route_layer(axum::middleware::from_fn_with_state(
            shared.clone(),
            require_admin,
        ));

    // Public routes: tenants authenticate per request, the webhook must be reachable by Meta
    let public = Router::new()
        .route("/", get(routes::root))
        .route("/health", get(routes::health_check))
        .route("/ready", get(routes::ready))
        .route("/metrics", get(routes::metrics))
        .route("/rag/query", post(routes::rag_query))
        .route(
            "/webhook",
            get(routes::whatsapp_webhook_verify).post(routes::whatsapp_webhook),
        );

    protected
        .merge(public)
        .route_layer(axum::middleware::from_fn_with_state(
            shared.clone(),
            track_metrics,
        ))
        .fallback(|| async { ApiError::new(StatusCode::NOT_FOUND, "Not Found") })
        .layer(cors_layer(&shared.config.gateway.cors_origins))
        .layer(TraceLayer::new_for_http())
        .with_state(shared)
}

/// Start the HTTP server.
pub async fn start(state: AppState) -> anyhow::Result<()> {
    let addr = format!(
        "{}:{}",
        state.config.gateway.host, state.config.gateway.port
    );
    let app = build_router(state);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Lumi API listening on http://{addr}");
    axum::serve(listener, app).await?;
    Ok(())
}
