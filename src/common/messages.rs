//! Canonical message types for relay communication.
//!
//! This module defines the single source of truth for the structured
//! events that leave the relay and the platform messages that pass through it.

use serde::{Deserialize, Serialize};

/// Classification bucket of an output event.
///
/// Serialized as its numeric value (`MessageType` on the wire).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "u8", try_from = "u8")]
pub enum EventKind {
    /// Regular in-game guild chat.
    Wynn = 0,
    /// Guild notifications (raids, rewards, territory actions).
    Guild = 1,
    /// Preformatted line originating from the platform side.
    Passthrough = 2,
}

impl From<EventKind> for u8 {
    fn from(kind: EventKind) -> Self {
        kind as u8
    }
}

impl TryFrom<u8> for EventKind {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Self::Wynn),
            1 => Ok(Self::Guild),
            2 => Ok(Self::Passthrough),
            other => Err(format!("unknown message type {}", other)),
        }
    }
}

/// Structured event broadcast to every connected session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputEvent {
    #[serde(rename = "MessageType")]
    pub kind: EventKind,
    #[serde(rename = "HeaderContent")]
    pub header: String,
    #[serde(rename = "TextContent")]
    pub body: String,
}

impl OutputEvent {
    pub fn new(kind: EventKind, header: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            kind,
            header: header.into(),
            body: body.into(),
        }
    }
}

/// Message originating from the chat platform, relayed to all sessions.
///
/// Only `Content` is interpreted; every other field is carried verbatim.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlatformMessage {
    #[serde(rename = "Content")]
    pub content: String,
    #[serde(flatten)]
    pub fields: serde_json::Map<String, serde_json::Value>,
}

#[cfg(test)]
impl PlatformMessage {
    pub fn new(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            fields: serde_json::Map::new(),
        }
    }

    /// Attach an extra field.
    pub fn with_field(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.fields.insert(key.into(), value.into());
        self
    }
}
