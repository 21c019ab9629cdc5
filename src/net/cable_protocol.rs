//! Action Cable JSON wire format.
//!
//! Commands carry the channel identifier as a JSON *string* (the server
//! echoes it back verbatim), and `message` commands carry their payload as
//! a second nested JSON string.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Build the subscription descriptor `{ "channel": <name>, ...params }`.
///
/// A `channel` key inside `params` is overridden by `channel`.
#[must_use]
pub fn descriptor(channel: &str, params: &Map<String, Value>) -> Map<String, Value> {
    let mut descriptor = params.clone();
    descriptor.insert("channel".to_owned(), Value::String(channel.to_owned()));
    descriptor
}

/// Identifier string for a descriptor.
#[must_use]
pub fn identifier(descriptor: &Map<String, Value>) -> String {
    Value::Object(descriptor.clone()).to_string()
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CommandKind {
    Subscribe,
    Unsubscribe,
    Message,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Command {
    pub command: CommandKind,
    pub identifier: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<String>,
}

impl Command {
    #[must_use]
    pub fn subscribe(identifier: &str) -> Self {
        Self { command: CommandKind::Subscribe, identifier: identifier.to_owned(), data: None }
    }

    #[must_use]
    pub fn unsubscribe(identifier: &str) -> Self {
        Self { command: CommandKind::Unsubscribe, identifier: identifier.to_owned(), data: None }
    }

    /// `message` command invoking `action` on the server-side channel.
    #[must_use]
    pub fn perform(identifier: &str, action: &str, mut data: Map<String, Value>) -> Self {
        data.insert("action".to_owned(), Value::String(action.to_owned()));
        Self {
            command: CommandKind::Message,
            identifier: identifier.to_owned(),
            data: Some(Value::Object(data).to_string()),
        }
    }

    /// # Errors
    ///
    /// Returns an error if the command cannot be serialized.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

/// A decoded server frame.
#[derive(Clone, Debug, PartialEq)]
pub enum CableEvent {
    Welcome,
    Ping,
    Confirm { identifier: String },
    Reject { identifier: String },
    Disconnect { reason: Option<String>, reconnect: bool },
    Message { identifier: String, message: Value },
    /// A frame with an unrecognized `type`.
    Unknown(String),
}

#[derive(Deserialize)]
struct RawFrame {
    #[serde(rename = "type")]
    kind: Option<String>,
    identifier: Option<String>,
    message: Option<Value>,
    reason: Option<String>,
    reconnect: Option<bool>,
}

#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    #[error("invalid cable frame: {0}")]
    Json(#[from] serde_json::Error),
    #[error("cable frame missing `{0}`")]
    MissingField(&'static str),
}

/// Decode one text frame from the server.
///
/// # Errors
///
/// Returns an error if the frame is not JSON or lacks a field its type
/// requires.
pub fn parse_event(text: &str) -> Result<CableEvent, ProtocolError> {
    let raw: RawFrame = serde_json::from_str(text)?;
    let event = match raw.kind.as_deref() {
        Some("welcome") => CableEvent::Welcome,
        Some("ping") => CableEvent::Ping,
        Some("confirm_subscription") => {
            CableEvent::Confirm { identifier: raw.identifier.ok_or(ProtocolError::MissingField("identifier"))? }
        }
        Some("reject_subscription") => {
            CableEvent::Reject { identifier: raw.identifier.ok_or(ProtocolError::MissingField("identifier"))? }
        }
        Some("disconnect") => CableEvent::Disconnect { reason: raw.reason, reconnect: raw.reconnect.unwrap_or(false) },
        Some(other) => CableEvent::Unknown(other.to_owned()),
        None => CableEvent::Message {
            identifier: raw.identifier.ok_or(ProtocolError::MissingField("identifier"))?,
            message: raw.message.ok_or(ProtocolError::MissingField("message"))?,
        },
    };
    Ok(event)
}

#[cfg(test)]
#[path = "cable_protocol_test.rs"]
mod tests;
