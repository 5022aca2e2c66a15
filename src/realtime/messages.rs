//! Push channel wire messages.

use crate::api::wire;
use crate::error::{Result, SyncError};
use crate::types::Notification;
use serde::Serialize;
use serde_json::Value;

/// Frames the client sends.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Sent once the transport is ready.
    Authenticate {
        #[serde(rename = "userId")]
        user_id: String,
    },
    Ping,
}

/// Decoded server frames.
#[derive(Clone, Debug, PartialEq)]
pub enum PushEvent {
    Notification(Notification),
    /// Any event type the core does not interpret.
    Other { event: String, data: Value },
}

impl PushEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            PushEvent::Notification(_) => EventKind::Notification,
            PushEvent::Other { event, .. } => EventKind::Other(event.clone()),
        }
    }
}

/// Handler registry key.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum EventKind {
    Notification,
    Other(String),
}

impl EventKind {
    pub fn other(name: impl Into<String>) -> Self {
        EventKind::Other(name.into())
    }
}

/// Decode a text frame of the form `{"type": "...", "data": {...}}`.
pub fn decode_frame(text: &str) -> Result<PushEvent> {
    let value: Value = serde_json::from_str(text)?;
    let Value::Object(mut obj) = value else {
        return Err(SyncError::Serialization("push frame is not an object".into()));
    };

    let event = match obj.remove("type").or_else(|| obj.remove("event")) {
        Some(Value::String(event)) => event,
        _ => return Err(SyncError::Serialization("push frame without type".into())),
    };
    let data = obj
        .remove("data")
        .or_else(|| obj.remove("payload"))
        .unwrap_or(Value::Null);

    match event.as_str() {
        "notification" => Ok(PushEvent::Notification(wire::parse_notification(data)?)),
        _ => Ok(PushEvent::Other { event, data }),
    }
}
