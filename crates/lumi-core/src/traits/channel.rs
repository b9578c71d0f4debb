//! Outbound messaging channel.

use async_trait::async_trait;

use crate::error::Result;
use crate::types::OutgoingMessage;

#[async_trait]
pub trait Channel: Send + Sync {
    fn name(&self) -> &str;

    /// Deliver a message. Returns the channel's message id.
    async fn send(&self, message: OutgoingMessage) -> Result<String>;
}
