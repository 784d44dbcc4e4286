//! WebSocket message types: envelope and client commands.
//!
//! Every frame in either direction is a [`WsMessage`]:
//!
//! ```json
//! { "id": "...", "type": "event", "event": "user:tokens:updated",
//!   "timestamp": "2026-01-01T00:00:00Z", "payload": { ... } }
//! ```

use axum::extract::ws::Message;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::error::RealtimeError;

fn new_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// Top-level WebSocket message envelope.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WsMessage {
    /// Client-provided ID for requests; server-generated for events.
    #[serde(default = "new_id")]
    pub id: String,
    /// Message type discriminator.
    #[serde(rename = "type")]
    pub msg_type: WsMessageType,
    /// Outbound message name for `event` frames.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event: Option<String>,
    /// ISO-8601 timestamp.
    #[serde(default = "Utc::now")]
    pub timestamp: DateTime<Utc>,
    /// Variant-specific payload.
    #[serde(default)]
    pub payload: Value,
}

/// Discriminator for WebSocket message types.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum WsMessageType {
    /// Client → Server command.
    Command,
    /// Server → Client response to a command.
    Response,
    /// Server → Client pushed event.
    Event,
    /// Server → Client error.
    Error,
}

impl WsMessage {
    /// Server-pushed event frame.
    #[must_use]
    pub fn event(name: &str, payload: Value) -> Self {
        Self {
            id: new_id(),
            msg_type: WsMessageType::Event,
            event: Some(name.to_string()),
            timestamp: Utc::now(),
            payload,
        }
    }

    /// Response to the command with id `id`.
    #[must_use]
    pub fn response(id: impl Into<String>, payload: Value) -> Self {
        Self {
            id: id.into(),
            msg_type: WsMessageType::Response,
            event: None,
            timestamp: Utc::now(),
            payload,
        }
    }

    /// Error frame with an HTTP-style `code`.
    #[must_use]
    pub fn error(id: impl Into<String>, code: u16, message: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            msg_type: WsMessageType::Error,
            event: None,
            timestamp: Utc::now(),
            payload: json!({ "code": code, "message": message.into() }),
        }
    }

    /// Error frame for a [`RealtimeError`], carrying both the HTTP status
    /// and the gateway error code.
    #[must_use]
    pub fn from_error(id: impl Into<String>, err: &RealtimeError) -> Self {
        let mut frame = Self::error(id, err.status_code().as_u16(), err.to_string());
        if let Some(payload) = frame.payload.as_object_mut() {
            payload.insert("errorCode".to_string(), json!(err.error_code()));
        }
        frame
    }

    /// Encodes the envelope as a text frame.
    ///
    /// # Errors
    ///
    /// Returns a [`serde_json::Error`] if the payload cannot be serialized.
    pub fn to_frame(&self) -> Result<Message, serde_json::Error> {
        serde_json::to_string(self).map(Message::text)
    }
}

/// Commands that a client can send over WebSocket, carried in the
/// `payload` of a `command` frame.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "command", rename_all = "snake_case")]
pub enum WsCommand {
    /// In-band credential for clients that cannot set upgrade headers.
    Authenticate {
        /// Bearer token.
        token: String,
    },
    /// Join a room (`gym:<id>`, `user:<id>:tokens`, `admin:<topic>`).
    Subscribe {
        /// Room key.
        room: String,
    },
    /// Leave a room.
    Unsubscribe {
        /// Room key.
        room: String,
    },
    /// Application-level keepalive.
    Ping,
}

impl WsCommand {
    /// Parses the command out of a client frame.
    ///
    /// # Errors
    ///
    /// Returns [`RealtimeError::InvalidRequest`] if the frame is not a
    /// `command` or its payload names no known command.
    pub fn from_message(msg: &WsMessage) -> Result<Self, RealtimeError> {
        if msg.msg_type != WsMessageType::Command {
            return Err(RealtimeError::InvalidRequest(
                "expected a command frame".to_string(),
            ));
        }
        Self::deserialize(&msg.payload)
            .map_err(|e| RealtimeError::InvalidRequest(format!("unknown command: {e}")))
    }
}
