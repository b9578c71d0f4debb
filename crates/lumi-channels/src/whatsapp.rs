//! WhatsApp Business Cloud API channel.
//!
//! Outbound messages go through the Graph API; inbound messages arrive on the
//! gateway webhook and are decoded here with [`WhatsAppChannel::parse_webhook_message`].

use async_trait::async_trait;
use hmac::{Hmac, Mac};
use lumi_core::config::WhatsAppConfig;
use lumi_core::error::{LumiError, Result};
use lumi_core::traits::Channel;
use lumi_core::types::OutgoingMessage;
use serde_json::{Value, json};
use sha2::Sha256;

const GRAPH_BASE_URL: &str = "https://graph.facebook.com";

/// Content type of an inbound WhatsApp message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MessageKind {
    Text,
    Image,
    Audio,
    Document,
    Other(String),
}

impl MessageKind {
    fn parse(s: &str) -> Self {
        match s {
            "text" => Self::Text,
            "image" => Self::Image,
            "audio" => Self::Audio,
            "document" => Self::Document,
            other => Self::Other(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::Text => "text",
            Self::Image => "image",
            Self::Audio => "audio",
            Self::Document => "document",
            Self::Other(s) => s,
        }
    }
}

/// First message of a webhook envelope.
///
/// `content` is the text body for text messages and the media id for
/// image/audio/document messages.
#[derive(Debug, Clone, PartialEq)]
pub struct InboundMessage {
    pub message_id: Option<String>,
    pub from: Option<String>,
    pub timestamp: Option<String>,
    pub kind: MessageKind,
    pub content: Option<String>,
}

impl InboundMessage {
    /// Sender and body of a text message, if this is one with both present.
    pub fn text(&self) -> Option<(&str, &str)> {
        if self.kind != MessageKind::Text {
            return None;
        }
        match (self.from.as_deref(), self.content.as_deref()) {
            (Some(from), Some(body)) if !from.is_empty() => Some((from, body)),
            _ => None,
        }
    }
}

pub struct WhatsAppChannel {
    config: WhatsAppConfig,
    base_url: String,
    client: reqwest::Client,
}

impl WhatsAppChannel {
    pub fn new(config: WhatsAppConfig) -> Result<Self> {
        Self::with_base_url(config, GRAPH_BASE_URL)
    }

    /// Point the client at a different Graph API host.
    pub fn with_base_url(config: WhatsAppConfig, base_url: &str) -> Result<Self> {
        if config.access_token.is_empty() || config.phone_number_id.is_empty() {
            tracing::warn!("WhatsApp credentials not configured, outbound delivery will fail");
        }
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(config.timeout_secs.max(1)))
            .build()
            .map_err(|e| LumiError::Channel(format!("failed to build WhatsApp client: {e}")))?;
        Ok(Self {
            config,
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
        })
    }

    fn messages_url(&self) -> String {
        format!(
            "{}/{}/{}/messages",
            self.base_url, self.config.api_version, self.config.phone_number_id
        )
    }

    async fn post_message(&self, to: &str, body: Value) -> Result<String> {
        if self.config.access_token.is_empty() || self.config.phone_number_id.is_empty() {
            return Err(LumiError::Config("WhatsApp credentials not configured".into()));
        }

        let response = self
            .client
            .post(self.messages_url())
            .header("Authorization", format!("Bearer {}", self.config.access_token))
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    LumiError::Timeout(format!("WhatsApp send to {to}"))
                } else {
                    LumiError::Channel(format!("WhatsApp API request failed: {e}"))
                }
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            return Err(LumiError::Channel(format!(
                "WhatsApp API error {}: {}",
                status, error_text
            )));
        }

        let result: Value = response
            .json()
            .await
            .map_err(|e| LumiError::Channel(format!("Invalid WhatsApp response: {e}")))?;

        let msg_id = result["messages"][0]["id"]
            .as_str()
            .unwrap_or("unknown")
            .to_string();

        tracing::info!("WhatsApp message sent: {} -> {}", msg_id, to);
        Ok(msg_id)
    }

    /// Send a text message. Returns the WhatsApp message id.
    pub async fn send_text_message(&self, to: &str, text: &str) -> Result<String> {
        let body = json!({
            "messaging_product": "whatsapp",
            "recipient_type": "individual",
            "to": to,
            "type": "text",
            "text": { "body": text }
        });
        self.post_message(to, body).await
    }

    /// Send a pre-approved template message.
    pub async fn send_template_message(
        &self,
        to: &str,
        template_name: &str,
        language_code: &str,
        components: Option<Vec<Value>>,
    ) -> Result<String> {
        let mut template = json!({
            "name": template_name,
            "language": { "code": language_code }
        });
        if let Some(components) = components.filter(|c| !c.is_empty()) {
            template["components"] = Value::Array(components);
        }
        let body = json!({
            "messaging_product": "whatsapp",
            "recipient_type": "individual",
            "to": to,
            "type": "template",
            "template": template
        });
        self.post_message(to, body).await
    }

    /// Extract `entry[0].changes[0].value.messages[0]` from a webhook body.
    ///
    /// Returns `None` for anything that is not a message notification
    /// (status callbacks, malformed envelopes).
    pub fn parse_webhook_message(body: &Value) -> Option<InboundMessage> {
        let message = body
            .get("entry")?
            .as_array()?
            .first()?
            .get("changes")?
            .as_array()?
            .first()?
            .get("value")?
            .get("messages")?
            .as_array()?
            .first()?;
        if !message.is_object() {
            return None;
        }

        let field = |key: &str| message.get(key).and_then(Value::as_str).map(String::from);
        let kind = MessageKind::parse(message.get("type").and_then(Value::as_str).unwrap_or(""));
        let content = match kind {
            MessageKind::Text => message["text"]["body"].as_str().map(String::from),
            MessageKind::Image | MessageKind::Audio | MessageKind::Document => {
                message[kind.as_str()]["id"].as_str().map(String::from)
            }
            MessageKind::Other(_) => None,
        };

        Some(InboundMessage {
            message_id: field("id"),
            from: field("from"),
            timestamp: field("timestamp"),
            kind,
            content,
        })
    }

    /// Check an `X-Hub-Signature-256: sha256=<hex>` header against the raw body.
    pub fn verify_signature(app_secret: &str, body: &[u8], header: &str) -> bool {
        let Some(digest) = header.strip_prefix("sha256=") else {
            return false;
        };
        let Ok(expected) = hex::decode(digest) else {
            return false;
        };
        let Ok(mut mac) = Hmac::<Sha256>::new_from_slice(app_secret.as_bytes()) else {
            return false;
        };
        mac.update(body);
        mac.verify_slice(&expected).is_ok()
    }
}

#[async_trait]
impl Channel for WhatsAppChannel {
    fn name(&self) -> &str {
        "whatsapp"
    }

    async fn send(&self, message: OutgoingMessage) -> Result<String> {
        self.send_text_message(&message.to, &message.content).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn config() -> WhatsAppConfig {
        WhatsAppConfig {
            access_token: "wa-token".into(),
            phone_number_id: "12345".into(),
            ..WhatsAppConfig::default()
        }
    }

    fn envelope(message: Value) -> Value {
        json!({
            "object": "whatsapp_business_account",
            "entry": [{"changes": [{"value": {"messages": [message]}}]}]
        })
    }

    fn sign(secret: &str, body: &[u8]) -> String {
        let mut mac = Hmac::<Sha256>::new_from_slice(secret.as_bytes()).unwrap();
        mac.update(body);
        format!("sha256={}", hex::encode(mac.finalize().into_bytes()))
    }

    #[test]
    fn test_parse_text_message() {
        let body = envelope(json!({
            "id": "wamid.1", "from": "15551234567", "timestamp": "1700000000",
            "type": "text", "text": {"body": "What is Lumi?"}
        }));
        let msg = WhatsAppChannel::parse_webhook_message(&body).unwrap();
        assert_eq!(msg.kind, MessageKind::Text);
        assert_eq!(msg.message_id.as_deref(), Some("wamid.1"));
        assert_eq!(msg.text(), Some(("15551234567", "What is Lumi?")));
    }

    #[test]
    fn test_parse_media_messages() {
        for kind in ["image", "audio", "document"] {
            let mut message = json!({"id": "wamid.2", "from": "1555", "type": kind});
            message[kind] = json!({"id": "media-9"});
            let body = envelope(message);
            let msg = WhatsAppChannel::parse_webhook_message(&body).unwrap();
            assert_eq!(msg.kind.as_str(), kind);
            assert_eq!(msg.content.as_deref(), Some("media-9"));
            assert!(msg.text().is_none());
        }
    }

    #[test]
    fn test_parse_unknown_type() {
        let body = envelope(json!({"id": "x", "from": "1555", "type": "sticker"}));
        let msg = WhatsAppChannel::parse_webhook_message(&body).unwrap();
        assert_eq!(msg.kind, MessageKind::Other("sticker".into()));
        assert!(msg.content.is_none());
    }

    #[test]
    fn test_parse_malformed_envelopes() {
        assert!(WhatsAppChannel::parse_webhook_message(&json!({})).is_none());
        assert!(WhatsAppChannel::parse_webhook_message(&json!({"entry": []})).is_none());
        assert!(WhatsAppChannel::parse_webhook_message(&json!({"entry": [{"changes": []}]})).is_none());
        let statuses = json!({"entry": [{"changes": [{"value": {"statuses": [{"id": "s"}]}}]}]});
        assert!(WhatsAppChannel::parse_webhook_message(&statuses).is_none());
    }

    #[test]
    fn test_verify_signature() {
        let body = br#"{"entry":[]}"#;
        let sig = sign("app-secret", body);
        assert!(WhatsAppChannel::verify_signature("app-secret", body, &sig));
        assert!(!WhatsAppChannel::verify_signature("other", body, &sig));
        assert!(!WhatsAppChannel::verify_signature("app-secret", b"tampered", &sig));
        assert!(!WhatsAppChannel::verify_signature("app-secret", body, "sha1=abc"));
        assert!(!WhatsAppChannel::verify_signature("app-secret", body, "sha256=zz"));
        assert!(!WhatsAppChannel::verify_signature("app-secret", body, "sha256=abc"));
        assert!(!WhatsAppChannel::verify_signature("app-secret", body, "sha256="));
    }

    #[test]
    fn test_verify_signature_accepts_uppercase_hex() {
        let body = br#"{"entry":[]}"#;
        let sig = sign("app-secret", body).to_uppercase().replacen("SHA256=", "sha256=", 1);
        assert!(WhatsAppChannel::verify_signature("app-secret", body, &sig));
    }

    #[tokio::test]
    async fn test_send_text_message() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v17.0/12345/messages"))
            .and(header("Authorization", "Bearer wa-token"))
            .and(body_partial_json(json!({
                "messaging_product": "whatsapp",
                "to": "1555",
                "type": "text",
                "text": {"body": "hi"}
            })))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({"messages": [{"id": "wamid.out"}]})),
            )
            .expect(1)
            .mount(&server)
            .await;

        let channel = WhatsAppChannel::with_base_url(config(), &server.uri()).unwrap();
        let id = channel.send_text_message("1555", "hi").await.unwrap();
        assert_eq!(id, "wamid.out");
    }

    #[tokio::test]
    async fn test_send_template_message() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v17.0/12345/messages"))
            .and(body_partial_json(json!({
                "type": "template",
                "template": {"name": "welcome", "language": {"code": "en_US"}}
            })))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({"messages": [{"id": "wamid.t"}]})),
            )
            .expect(1)
            .mount(&server)
            .await;

        let channel = WhatsAppChannel::with_base_url(config(), &server.uri()).unwrap();
        let id = channel
            .send_template_message("1555", "welcome", "en_US", None)
            .await
            .unwrap();
        assert_eq!(id, "wamid.t");
    }

    #[tokio::test]
    async fn test_send_failure_is_channel_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(401).set_body_string("bad token"))
            .mount(&server)
            .await;

        let channel = WhatsAppChannel::with_base_url(config(), &server.uri()).unwrap();
        let err = channel
            .send(OutgoingMessage { to: "1555".into(), content: "hi".into() })
            .await
            .unwrap_err();
        assert!(matches!(err, LumiError::Channel(_)));
    }

    #[tokio::test]
    async fn test_send_without_credentials() {
        let channel = WhatsAppChannel::new(WhatsAppConfig::default()).unwrap();
        let err = channel.send_text_message("1555", "hi").await.unwrap_err();
        assert!(matches!(err, LumiError::Config(_)));
    }
}
