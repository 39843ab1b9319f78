//! Message protocol definitions
//!
//! Inbound frames are flat JSON objects tagged by `type`; outbound frames
//! are plain text lines.

use std::sync::Arc;

use serde::Deserialize;

use crate::types::{ConnectionId, Payload};

/// Client → Hub message
///
/// Uses tagged enum with snake_case naming. Extra keys are ignored.
#[derive(Debug, PartialEq, Eq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Set the display name and announce the participant
    Join { username: String },
    /// Send a chat line to everyone else
    Chat { message: String },
    /// Any other `type` value
    #[serde(other)]
    Unknown,
}

impl ClientMessage {
    /// Decode a single inbound text frame
    pub fn decode(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }
}

/// Format a chat or history line
pub fn chat_line(name: &str, text: &str) -> Payload {
    Arc::from(format!("{}: {}", name, text))
}

/// Format a join announcement
pub fn join_line(name: &str) -> Payload {
    Arc::from(format!("{} joined the chat", name))
}

/// A message to fan out, consumed by one Hub pass
#[derive(Debug, Clone)]
pub struct BroadcastMessage {
    /// Sender to skip; `None` for system announcements
    pub origin: Option<ConnectionId>,
    pub payload: Payload,
}

impl BroadcastMessage {
    /// Message sent by a participant, never echoed back to it
    pub fn chat(origin: ConnectionId, payload: Payload) -> Self {
        Self {
            origin: Some(origin),
            payload,
        }
    }

    /// Hub-generated message delivered to every member
    pub fn system(payload: Payload) -> Self {
        Self {
            origin: None,
            payload,
        }
    }
}
