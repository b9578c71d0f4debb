//! # Lumi DB
//!
//! SQLite implementation of the store traits from `lumi-core`.

pub mod sqlite;

pub use sqlite::SqliteStore;
