//! Live session bookkeeping.
//!
//! Owned by the relay task together with the sequence coordinator, so no
//! locking is needed.

use std::collections::BTreeMap;

use tokio::sync::mpsc;
use tracing::debug;

use crate::bridge::sequence::{SequenceCoordinator, SessionCursor, StreamKind};
use crate::protocol::frames::ServerFrame;

pub type SessionId = u64;

/// An authenticated mod client.
#[derive(Debug)]
pub struct Session {
    pub id: SessionId,
    pub identity: String,
    pub mod_version: String,
    pub cursor: SessionCursor,
    outbound: mpsc::UnboundedSender<ServerFrame>,
}

impl Session {
    /// Queue a frame for this session. Returns false if its connection is gone.
    pub fn send(&self, frame: ServerFrame) -> bool {
        self.outbound.send(frame).is_ok()
    }
}

/// All active sessions, ordered by id.
#[derive(Debug, Default)]
pub struct SessionRegistry {
    sessions: BTreeMap<SessionId, Session>,
    next_id: SessionId,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a session and return its id.
    pub fn insert(
        &mut self,
        identity: String,
        mod_version: String,
        cursor: SessionCursor,
        outbound: mpsc::UnboundedSender<ServerFrame>,
    ) -> SessionId {
        self.next_id += 1;
        let id = self.next_id;
        self.sessions.insert(
            id,
            Session {
                id,
                identity,
                mod_version,
                cursor,
                outbound,
            },
        );
        id
    }

    pub fn remove(&mut self, id: SessionId) -> Option<Session> {
        self.sessions.remove(&id)
    }

    pub fn get(&self, id: SessionId) -> Option<&Session> {
        self.sessions.get(&id)
    }

    pub fn get_mut(&mut self, id: SessionId) -> Option<&mut Session> {
        self.sessions.get_mut(&id)
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Identities of all active sessions, in connection order.
    pub fn identities(&self) -> Vec<String> {
        self.sessions.values().map(|s| s.identity.clone()).collect()
    }

    /// Send a frame to every session. Returns the number of sessions reached.
    pub fn broadcast(&self, frame: &ServerFrame) -> usize {
        let mut delivered = 0;
        for session in self.sessions.values() {
            if session.send(frame.clone()) {
                delivered += 1;
            } else {
                debug!(
                    session = session.id,
                    identity = %session.identity,
                    "Outbound channel closed, skipping"
                );
            }
        }
        delivered
    }

    /// Resync one stream for every session. Returns how many cursors moved.
    pub fn resync_all(&mut self, coordinator: &SequenceCoordinator, stream: StreamKind) -> usize {
        self.sessions
            .values_mut()
            .map(|session| coordinator.resync(stream, &mut session.cursor))
            .filter(|moved| *moved)
            .count()
    }

    /// Drop every session, closing their outbound channels.
    pub fn clear(&mut self) {
        self.sessions.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::{EventKind, OutputEvent};

    #[test]
    fn test_ids_are_unique_and_ordered() {
        let mut registry = SessionRegistry::new();
        let (tx, _rx) = mpsc::unbounded_channel();

        let a = registry.insert("Alice".into(), "1.0.0".into(), SessionCursor::default(), tx.clone());
        let b = registry.insert("Bob".into(), "1.0.0".into(), SessionCursor::default(), tx);

        assert_ne!(a, b);
        assert_eq!(registry.identities(), vec!["Alice", "Bob"]);

        registry.remove(a);
        assert_eq!(registry.identities(), vec!["Bob"]);
        assert!(registry.get(a).is_none());
    }

    #[test]
    fn test_broadcast_reaches_open_sessions() {
        let mut registry = SessionRegistry::new();
        let (tx_a, mut rx_a) = mpsc::unbounded_channel();
        let (tx_b, rx_b) = mpsc::unbounded_channel();
        registry.insert("Alice".into(), "1.0.0".into(), SessionCursor::default(), tx_a);
        registry.insert("Bob".into(), "1.0.0".into(), SessionCursor::default(), tx_b);
        drop(rx_b);

        let frame = ServerFrame::WynnMessage(OutputEvent::new(EventKind::Wynn, "Guild", "hi"));
        assert_eq!(registry.broadcast(&frame), 1);
        assert_eq!(rx_a.try_recv().unwrap(), frame);
    }

    #[test]
    fn test_resync_all_counts_moved_cursors() {
        let mut coordinator = SequenceCoordinator::new();
        let mut registry = SessionRegistry::new();
        let (tx, _rx) = mpsc::unbounded_channel();

        let a = registry.insert("Alice".into(), "1.0.0".into(), coordinator.snapshot(), tx.clone());
        registry.insert("Bob".into(), "1.0.0".into(), coordinator.snapshot(), tx);

        let cursor = &mut registry.get_mut(a).unwrap().cursor;
        coordinator.admit(StreamKind::Main, cursor);

        // Alice is caught up, Bob is one behind
        assert_eq!(registry.resync_all(&coordinator, StreamKind::Main), 1);
        assert_eq!(registry.resync_all(&coordinator, StreamKind::Main), 0);
    }
}
