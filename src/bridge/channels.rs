//! Relay event channel.
//!
//! Connection tasks never touch relay state directly: they send
//! `RelayEvent`s to the relay task through a `RelayHandle`.

use tokio::sync::{mpsc, oneshot};

use crate::bridge::state::SessionId;
use crate::common::PlatformMessage;
use crate::protocol::frames::ServerFrame;

/// A line or message submitted by a session.
#[derive(Debug, Clone, PartialEq)]
pub enum Submission {
    /// Raw line for the main stream.
    Main(String),
    /// Raw line for the secondary stream.
    Secondary(String),
    /// Preformatted `header: content` line.
    Passthrough(String),
    /// Structured platform message.
    Platform(PlatformMessage),
}

/// Events processed by the relay task, one at a time.
#[derive(Debug)]
pub enum RelayEvent {
    Connect {
        identity: String,
        mod_version: String,
        outbound: mpsc::UnboundedSender<ServerFrame>,
        reply: oneshot::Sender<SessionId>,
    },
    Submit {
        session: SessionId,
        submission: Submission,
    },
    Sync {
        session: SessionId,
    },
    ListOnline {
        reply: oneshot::Sender<Vec<String>>,
    },
    Disconnect {
        session: SessionId,
        reason: String,
    },
}

/// Cloneable sender side of the relay event channel.
#[derive(Debug, Clone)]
pub struct RelayHandle {
    tx: mpsc::UnboundedSender<RelayEvent>,
}

impl RelayHandle {
    /// Create a handle and the receiver the relay task listens on.
    pub fn new() -> (Self, mpsc::UnboundedReceiver<RelayEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    /// Register a session. Returns `None` if the relay task has stopped.
    pub async fn connect(
        &self,
        identity: String,
        mod_version: String,
        outbound: mpsc::UnboundedSender<ServerFrame>,
    ) -> Option<SessionId> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(RelayEvent::Connect {
                identity,
                mod_version,
                outbound,
                reply,
            })
            .ok()?;
        rx.await.ok()
    }

    pub fn submit(&self, session: SessionId, submission: Submission) -> bool {
        self.tx
            .send(RelayEvent::Submit {
                session,
                submission,
            })
            .is_ok()
    }

    pub fn sync(&self, session: SessionId) -> bool {
        self.tx.send(RelayEvent::Sync { session }).is_ok()
    }

    pub async fn list_online(&self) -> Option<Vec<String>> {
        let (reply, rx) = oneshot::channel();
        self.tx.send(RelayEvent::ListOnline { reply }).ok()?;
        rx.await.ok()
    }

    pub fn disconnect(&self, session: SessionId, reason: impl Into<String>) -> bool {
        self.tx
            .send(RelayEvent::Disconnect {
                session,
                reason: reason.into(),
            })
            .is_ok()
    }
}
