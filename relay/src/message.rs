use crate::error::{Error, ErrorKind, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Error text sent back to a client whose message could not be processed.
pub const PROCESSING_FAILED: &str = "Failed to process message";

/// Inbound client actions, decoded once at the boundary.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "action")]
pub enum Action {
    #[serde(rename = "setName")]
    SetName { name: String },
    #[serde(rename = "sendPublic")]
    SendPublic { message: String },
    #[serde(rename = "sendPrivate")]
    SendPrivate { to: String, message: String },
}

impl Action {
    const KNOWN: [&'static str; 3] = ["setName", "sendPublic", "sendPrivate"];

    /// Decode a raw message body.
    ///
    /// A body that is not a JSON object, or a known action with missing or
    /// mistyped fields, is `MalformedMessage`. An object whose `action` is
    /// absent or not one of the known tags is `UnrecognizedAction`.
    pub fn decode(body: &str) -> Result<Action> {
        let value: Value = serde_json::from_str(body).map_err(|e| {
            Error::with_source(ErrorKind::MalformedMessage("body is not valid JSON".into()), e)
        })?;

        let object = value.as_object().ok_or_else(|| {
            Error::new(ErrorKind::MalformedMessage(
                "body is not a JSON object".to_string(),
            ))
        })?;

        match object.get("action") {
            None => return Err(Error::new(ErrorKind::UnrecognizedAction(None))),
            Some(Value::String(tag)) if Self::KNOWN.contains(&tag.as_str()) => {}
            Some(other) => {
                let tag = match other {
                    Value::String(tag) => tag.clone(),
                    other => other.to_string(),
                };
                return Err(Error::new(ErrorKind::UnrecognizedAction(Some(tag))));
            }
        }

        serde_json::from_value(value).map_err(|e| {
            Error::with_source(
                ErrorKind::MalformedMessage("action fields are invalid".into()),
                e,
            )
        })
    }

    pub fn name(&self) -> &'static str {
        match self {
            Action::SetName { .. } => "setName",
            Action::SendPublic { .. } => "sendPublic",
            Action::SendPrivate { .. } => "sendPrivate",
        }
    }
}

/// Events sent to clients. Each serializes to an object with exactly one key.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum OutboundEvent {
    Members(Vec<String>),
    SystemMessage(String),
    PublicMessage(String),
    PrivateMessage(String),
    Error(String),
}

impl OutboundEvent {
    pub fn joined(name: &str) -> Self {
        OutboundEvent::SystemMessage(format!("{name} has joined the chat"))
    }

    pub fn left(name: &str) -> Self {
        OutboundEvent::SystemMessage(format!("{name} has left the chat"))
    }

    pub fn public(sender: &str, text: &str) -> Self {
        OutboundEvent::PublicMessage(format!("{sender}: {text}"))
    }

    pub fn private(sender: &str, text: &str) -> Self {
        OutboundEvent::PrivateMessage(format!("{sender}: {text}"))
    }

    pub fn processing_failed() -> Self {
        OutboundEvent::Error(PROCESSING_FAILED.to_string())
    }

    pub fn event_type(&self) -> &'static str {
        match self {
            OutboundEvent::Members(_) => "members",
            OutboundEvent::SystemMessage(_) => "systemMessage",
            OutboundEvent::PublicMessage(_) => "publicMessage",
            OutboundEvent::PrivateMessage(_) => "privateMessage",
            OutboundEvent::Error(_) => "error",
        }
    }

    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string(self).map_err(|e| Error::with_source(ErrorKind::Serialization, e))
    }
}
