//! # Lumi Gateway
//!
//! Axum HTTP surface: the tenant-facing `/rag/query` endpoint, the WhatsApp
//! webhook, the `/admin` API and the health/metrics endpoints.

pub mod admin;
pub mod error;
pub mod routes;
pub mod server;

#[cfg(test)]
pub(crate) mod testing;

pub use error::ApiError;
pub use server::{AppState, build_router, start};
