//! # Lumi Core
//!
//! Shared building blocks for every Lumi crate: the tenant/FAQ/message data
//! model, the traits that sit at each pipeline seam (embedding, chat, store,
//! channel), configuration, errors, and the observability counters.

pub mod config;
pub mod error;
pub mod observability;
pub mod traits;
pub mod types;

pub use config::LumiConfig;
pub use error::{ErrorKind, LumiError, Result};
pub use observability::Metrics;
