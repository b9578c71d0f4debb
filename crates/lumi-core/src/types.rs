//! Data model shared across the workspace.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{LumiError, Result};

/// Isolation boundary for FAQs, messages and queries.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tenant {
    pub id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    /// Default system prompt used when a query does not carry its own.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system_prompt: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Partial tenant update. `None` leaves the field untouched.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TenantUpdate {
    pub name: Option<String>,
    pub api_key: Option<String>,
    pub system_prompt: Option<String>,
}

/// A fixed-width embedding vector.
///
/// Always non-empty and finite. Width checks against the configured model
/// happen at write time through [`Embedding::new`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Embedding(Vec<f32>);

impl Embedding {
    /// Validate `values` against the expected dimensionality.
    pub fn new(values: Vec<f32>, expected_dims: usize) -> Result<Self> {
        if values.len() != expected_dims {
            return Err(LumiError::DimensionMismatch {
                expected: expected_dims,
                actual: values.len(),
            });
        }
        Self::checked(values)
    }

    /// Accept a vector of any width (stored rows, tests).
    pub fn checked(values: Vec<f32>) -> Result<Self> {
        if values.is_empty() {
            return Err(LumiError::InvalidInput("embedding is empty".into()));
        }
        if values.iter().any(|v| !v.is_finite()) {
            return Err(LumiError::InvalidInput(
                "embedding contains non-finite values".into(),
            ));
        }
        Ok(Self(values))
    }

    pub fn as_slice(&self) -> &[f32] {
        &self.0
    }

    pub fn dimensions(&self) -> usize {
        self.0.len()
    }

    /// Little-endian `f32` encoding used for BLOB storage.
    pub fn to_le_bytes(&self) -> Vec<u8> {
        self.0.iter().flat_map(|v| v.to_le_bytes()).collect()
    }

    pub fn from_le_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.len() % 4 != 0 {
            return Err(LumiError::Storage(format!(
                "embedding blob length {} is not a multiple of 4",
                bytes.len()
            )));
        }
        let values = bytes
            .chunks_exact(4)
            .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
            .collect();
        Self::checked(values)
    }
}

/// A question/answer pair owned by one tenant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Faq {
    pub id: String,
    pub tenant_id: String,
    pub question: String,
    pub answer: String,
    /// `None` until computed; such FAQs never take part in retrieval.
    #[serde(default, skip_serializing)]
    pub embedding: Option<Embedding>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Faq {
    pub fn has_embedding(&self) -> bool {
        self.embedding.is_some()
    }
}

/// Partial FAQ update.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct FaqUpdate {
    pub question: Option<String>,
    pub answer: Option<String>,
}

impl FaqUpdate {
    pub fn is_empty(&self) -> bool {
        self.question.is_none() && self.answer.is_none()
    }
}

/// Who authored a logged conversation turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    User,
    Assistant,
}

impl MessageRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Assistant => "assistant",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "user" => Some(Self::User),
            "assistant" => Some(Self::Assistant),
            _ => None,
        }
    }
}

/// A logged conversation turn (audit only).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub id: String,
    pub tenant_id: String,
    pub user_id: String,
    pub content: String,
    pub role: MessageRole,
    pub created_at: DateTime<Utc>,
}

/// Chat-completion message role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

/// One message in a chat-completion request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self { role: Role::System, content: content.into() }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self { role: Role::User, content: content.into() }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Usage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

/// Result of a chat-completion call.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProviderResponse {
    pub content: Option<String>,
    pub finish_reason: Option<String>,
    pub usage: Option<Usage>,
}

/// A reply going out through a messaging channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutgoingMessage {
    /// Recipient address (phone number for WhatsApp).
    pub to: String,
    pub content: String,
}
