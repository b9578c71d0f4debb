//! # Lumi Channels
//!
//! Outbound delivery and inbound payload parsing for messaging platforms.

pub mod whatsapp;

pub use whatsapp::{InboundMessage, MessageKind, WhatsAppChannel};
