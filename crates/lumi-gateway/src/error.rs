//! JSON error responses (`{"detail": ...}`).

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use lumi_core::error::LumiError;
use serde_json::json;

/// An HTTP error with a client-safe message.
#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub detail: String,
}

impl ApiError {
    pub fn new(status: StatusCode, detail: impl Into<String>) -> Self {
        Self { status, detail: detail.into() }
    }

    pub fn bad_request(detail: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, detail)
    }

    pub fn unauthorized(detail: impl Into<String>) -> Self {
        Self::new(StatusCode::UNAUTHORIZED, detail)
    }

    pub fn not_found(detail: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, detail)
    }

    pub fn internal() -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, "Internal server error")
    }
}

/// Store and pipeline errors. Only input errors pass their text through.
impl From<LumiError> for ApiError {
    fn from(e: LumiError) -> Self {
        match e {
            LumiError::NotFound(what) => Self::not_found(format!("{what} not found")),
            LumiError::InvalidInput(msg) => Self::bad_request(msg),
            other => {
                tracing::error!("Request failed ({}): {}", other.kind(), other);
                Self::internal()
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(json!({ "detail": self.detail }))).into_response()
    }
}
