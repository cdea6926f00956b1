//! Wire frames exchanged with mod clients.
//!
//! Every frame is a JSON object `{"event": <name>, "data": <payload>}`.
//! Frames without a payload omit `data`.

use serde::{Deserialize, Serialize};

use crate::common::{OutputEvent, PlatformMessage};

/// Frames sent by a client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "camelCase")]
pub enum ClientFrame {
    /// First frame of every connection.
    Hello { token: String, version: String },
    /// Raw line for the main stream.
    WynnMessage(String),
    /// Raw line for the secondary (high-rank) stream.
    HrMessage(String),
    /// Preformatted `header: content` line from the platform side.
    DiscordOnlyWynnMessage(String),
    /// Structured platform message to relay to every session.
    DiscordMessage(PlatformMessage),
    ListOnline,
    Sync,
}

impl ClientFrame {
    /// Event name, for logging.
    pub fn event_name(&self) -> &'static str {
        match self {
            Self::Hello { .. } => "hello",
            Self::WynnMessage(_) => "wynnMessage",
            Self::HrMessage(_) => "hrMessage",
            Self::DiscordOnlyWynnMessage(_) => "discordOnlyWynnMessage",
            Self::DiscordMessage(_) => "discordMessage",
            Self::ListOnline => "listOnline",
            Self::Sync => "sync",
        }
    }
}

/// Frames sent by the relay.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "camelCase")]
pub enum ServerFrame {
    /// Handshake accepted.
    Welcome { identity: String },
    WynnMessage(OutputEvent),
    DiscordMessage(PlatformMessage),
    OnlineList(Vec<String>),
    /// Request-level failure. The connection stays open unless stated otherwise.
    Error { reason: String },
}

impl ServerFrame {
    pub fn error(reason: impl Into<String>) -> Self {
        Self::Error {
            reason: reason.into(),
        }
    }
}
