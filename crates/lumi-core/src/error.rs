//! Error types for Lumi.

use serde::Serialize;
use thiserror::Error;

/// Coarse failure classification used for degradation signalling.
///
/// Pipeline components never surface a [`LumiError`] to end users; they
/// resolve it to a fallback and keep the kind so callers and tests can tell
/// an upstream outage apart from an empty FAQ set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Embedding, chat-completion or delivery call failed or timed out.
    TransientUpstream,
    /// Nothing to work with: no FAQs, no embeddings, no matches.
    DataAbsent,
    /// Missing secret, missing API key, unknown provider.
    Configuration,
    /// Payload or input did not have the expected shape.
    MalformedInput,
    /// The relational store failed.
    Storage,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::TransientUpstream => "transient_upstream",
            Self::DataAbsent => "data_absent",
            Self::Configuration => "configuration",
            Self::MalformedInput => "malformed_input",
            Self::Storage => "storage",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error)]
pub enum LumiError {
    #[error("HTTP error: {0}")]
    Http(String),

    #[error("Request timed out: {0}")]
    Timeout(String),

    #[error("Provider error: {0}")]
    Provider(String),

    #[error("Embedding error: {0}")]
    Embedding(String),

    #[error("Channel error: {0}")]
    Channel(String),

    #[error("API key missing for provider: {0}")]
    ApiKeyMissing(String),

    #[error("Provider not found: {0}")]
    ProviderNotFound(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Embedding dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl LumiError {
    /// Classify this error for degradation signalling and metrics.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Http(_)
            | Self::Timeout(_)
            | Self::Provider(_)
            | Self::Embedding(_)
            | Self::Channel(_) => ErrorKind::TransientUpstream,
            Self::ApiKeyMissing(_) | Self::ProviderNotFound(_) | Self::Config(_) => {
                ErrorKind::Configuration
            }
            Self::NotFound(_) => ErrorKind::DataAbsent,
            Self::InvalidInput(_) | Self::DimensionMismatch { .. } | Self::Serialization(_) => {
                ErrorKind::MalformedInput
            }
            Self::Storage(_) | Self::Io(_) => ErrorKind::Storage,
        }
    }
}

pub type Result<T> = std::result::Result<T, LumiError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_upstream_errors_are_transient() {
        assert_eq!(LumiError::Timeout("chat".into()).kind(), ErrorKind::TransientUpstream);
        assert_eq!(LumiError::Http("503".into()).kind(), ErrorKind::TransientUpstream);
        assert_eq!(LumiError::Embedding("bad".into()).kind(), ErrorKind::TransientUpstream);
    }

    #[test]
    fn test_config_errors() {
        assert_eq!(LumiError::ApiKeyMissing("openai".into()).kind(), ErrorKind::Configuration);
        assert_eq!(LumiError::Config("no token".into()).kind(), ErrorKind::Configuration);
    }

    #[test]
    fn test_dimension_mismatch_message() {
        let err = LumiError::DimensionMismatch { expected: 1536, actual: 3 };
        assert_eq!(err.kind(), ErrorKind::MalformedInput);
        assert!(err.to_string().contains("expected 1536, got 3"));
    }
}
