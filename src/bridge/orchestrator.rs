//! Relay orchestrator that ties sessions, election and classification together.
//!
//! All state lives in a single `Relay` owned by the relay task. Every event
//! is processed start-to-finish before the next one is received, so
//! elections can never interleave.

use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

use crate::bridge::channels::{RelayEvent, Submission};
use crate::bridge::effects::EffectRunner;
use crate::bridge::sequence::{Admission, SequenceCoordinator, StreamKind};
use crate::bridge::state::{SessionId, SessionRegistry};
use crate::common::error::{RelayError, RelayResult};
use crate::common::{OutputEvent, PlatformMessage};
use crate::game::patterns::PatternRegistry;
use crate::game::sanitizer::{LineSanitizer, TokenStyle};
use crate::ledger::Ledgers;
use crate::platform::normalize_message;
use crate::protocol::auth::VersionPolicy;
use crate::protocol::frames::ServerFrame;

/// What happened to a stream submission.
#[derive(Debug, Clone, PartialEq)]
pub enum SubmitOutcome {
    /// Elected, classified and sent to every session.
    Broadcast(OutputEvent),
    /// Another session already submitted this index.
    Skipped,
}

/// The relay core.
pub struct Relay {
    coordinator: SequenceCoordinator,
    patterns: PatternRegistry,
    sanitizer: LineSanitizer,
    sessions: SessionRegistry,
    version_policy: VersionPolicy,
    effects: EffectRunner,
}

impl Relay {
    pub fn new(
        patterns: PatternRegistry,
        sanitizer: LineSanitizer,
        version_policy: VersionPolicy,
        ledgers: Ledgers,
    ) -> Self {
        Self {
            coordinator: SequenceCoordinator::new(),
            patterns,
            sanitizer,
            sessions: SessionRegistry::new(),
            version_policy,
            effects: EffectRunner::new(ledgers),
        }
    }

    /// Standard rules and sanitizer.
    pub fn standard(version_policy: VersionPolicy, ledgers: Ledgers) -> Self {
        Self::new(
            PatternRegistry::standard(),
            LineSanitizer::default(),
            version_policy,
            ledgers,
        )
    }

    #[cfg(test)]
    pub fn coordinator(&self) -> &SequenceCoordinator {
        &self.coordinator
    }

    #[cfg(test)]
    pub fn sessions(&self) -> &SessionRegistry {
        &self.sessions
    }

    /// Activate a session. Its cursor starts at the current global indices.
    pub fn connect(
        &mut self,
        identity: String,
        mod_version: String,
        outbound: mpsc::UnboundedSender<ServerFrame>,
    ) -> SessionId {
        let cursor = self.coordinator.snapshot();
        let id = self
            .sessions
            .insert(identity.clone(), mod_version.clone(), cursor, outbound);

        info!(
            session = id,
            identity = %identity,
            mod_version = %mod_version,
            main = cursor.index(StreamKind::Main),
            secondary = cursor.index(StreamKind::Secondary),
            "Session connected"
        );
        id
    }

    pub fn submit_main(&mut self, session: SessionId, raw: &str) -> RelayResult<SubmitOutcome> {
        self.submit_stream(StreamKind::Main, session, raw)
    }

    pub fn submit_secondary(&mut self, session: SessionId, raw: &str) -> RelayResult<SubmitOutcome> {
        self.submit_stream(StreamKind::Secondary, session, raw)
    }

    fn submit_stream(
        &mut self,
        stream: StreamKind,
        session: SessionId,
        raw: &str,
    ) -> RelayResult<SubmitOutcome> {
        let entry = self
            .sessions
            .get_mut(session)
            .ok_or(RelayError::UnknownSession(session))?;

        if !self.version_policy.check(&entry.mod_version) {
            return Err(RelayError::VersionRejected {
                version: entry.mod_version.clone(),
            });
        }

        if self.coordinator.admit(stream, &mut entry.cursor) == Admission::Skip {
            debug!(
                stream = %stream,
                session,
                local = entry.cursor.index(stream),
                global = self.coordinator.global_index(stream),
                "Skipping already relayed line"
            );
            return Ok(SubmitOutcome::Skipped);
        }
        let identity = entry.identity.clone();
        let index = self.coordinator.global_index(stream);

        let classification = self
            .patterns
            .classify(stream, raw)
            .ok_or(RelayError::NoRuleMatched { stream })?;

        let body = match stream {
            StreamKind::Main => self
                .sanitizer
                .sanitize(&classification.event.body, TokenStyle::Emphasized),
            StreamKind::Secondary => self.sanitizer.strip_formatting(&classification.event.body),
        };
        let event = OutputEvent::new(
            classification.event.kind,
            classification.event.header,
            body,
        );

        info!(
            stream = %stream,
            index,
            identity = %identity,
            rule = classification.rule,
            "{}: {}",
            event.header,
            event.body
        );

        self.effects.dispatch(classification.effects);
        self.sessions
            .broadcast(&ServerFrame::WynnMessage(event.clone()));
        Ok(SubmitOutcome::Broadcast(event))
    }

    /// Relay a preformatted `header: content` line. No election.
    pub fn submit_passthrough(&mut self, session: SessionId, raw: &str) -> RelayResult<OutputEvent> {
        if self.sessions.get(session).is_none() {
            return Err(RelayError::UnknownSession(session));
        }

        let classification = self
            .patterns
            .classify_passthrough(raw)
            .ok_or(RelayError::UnmatchedPassthrough)?;
        let body = self
            .sanitizer
            .substitute_tokens(&classification.event.body, TokenStyle::Angled);
        let event = OutputEvent::new(
            classification.event.kind,
            classification.event.header,
            body,
        );

        debug!(session, "Passthrough {}: {}", event.header, event.body);
        self.sessions
            .broadcast(&ServerFrame::WynnMessage(event.clone()));
        Ok(event)
    }

    /// Relay a platform message to every session. No election.
    pub fn submit_platform_message(
        &mut self,
        session: SessionId,
        message: PlatformMessage,
    ) -> RelayResult<PlatformMessage> {
        if self.sessions.get(session).is_none() {
            return Err(RelayError::UnknownSession(session));
        }

        let message = normalize_message(message);
        debug!(session, content = %message.content, "Relaying platform message");
        self.sessions
            .broadcast(&ServerFrame::DiscordMessage(message.clone()));
        Ok(message)
    }

    /// Bring a session's main cursor back to the global index.
    ///
    /// Returns `true` if the cursor moved.
    pub fn sync(&mut self, session: SessionId) -> RelayResult<bool> {
        let entry = self
            .sessions
            .get_mut(session)
            .ok_or(RelayError::UnknownSession(session))?;
        let moved = self.coordinator.resync(StreamKind::Main, &mut entry.cursor);
        debug!(session, moved, "Main stream resync requested");
        Ok(moved)
    }

    pub fn list_active_identities(&self) -> Vec<String> {
        self.sessions.identities()
    }

    /// Remove a session and resync every remaining main cursor.
    pub fn disconnect(&mut self, session: SessionId, reason: &str) -> RelayResult<()> {
        let removed = self
            .sessions
            .remove(session)
            .ok_or(RelayError::UnknownSession(session))?;

        let moved = self
            .sessions
            .resync_all(&self.coordinator, StreamKind::Main);

        info!(
            session,
            identity = %removed.identity,
            reason,
            resynced = moved,
            "Session disconnected"
        );
        if self.sessions.is_empty() {
            warn!("No mod clients connected, in-game lines will not be relayed");
        }
        Ok(())
    }

    /// Process a single event from a connection task.
    pub fn handle(&mut self, event: RelayEvent) {
        match event {
            RelayEvent::Connect {
                identity,
                mod_version,
                outbound,
                reply,
            } => {
                let id = self.connect(identity, mod_version, outbound);
                if reply.send(id).is_err() {
                    // Connection task went away while waiting
                    let _ = self.disconnect(id, "connection dropped during handshake");
                }
            }
            RelayEvent::Submit {
                session,
                submission,
            } => {
                let result = match submission {
                    Submission::Main(raw) => self.submit_main(session, &raw).map(|_| ()),
                    Submission::Secondary(raw) => self.submit_secondary(session, &raw).map(|_| ()),
                    Submission::Passthrough(raw) => self.submit_passthrough(session, &raw).map(|_| ()),
                    Submission::Platform(message) => {
                        self.submit_platform_message(session, message).map(|_| ())
                    }
                };
                if let Err(e) = result {
                    log_relay_error(session, &e);
                }
            }
            RelayEvent::Sync { session } => {
                if let Err(e) = self.sync(session) {
                    log_relay_error(session, &e);
                }
            }
            RelayEvent::ListOnline { reply } => {
                let _ = reply.send(self.list_active_identities());
            }
            RelayEvent::Disconnect { session, reason } => {
                if let Err(e) = self.disconnect(session, &reason) {
                    log_relay_error(session, &e);
                }
            }
        }
    }

    /// Close every session and wait for pending effects.
    pub async fn shutdown(&mut self) {
        let sessions = self.sessions.len();
        self.sessions.clear();
        info!(
            sessions,
            pending_effects = self.effects.pending(),
            "Relay shutting down"
        );
        self.effects.drain().await;
    }
}

fn log_relay_error(session: SessionId, error: &RelayError) {
    match error {
        RelayError::VersionRejected { .. } => {
            info!(session, "Skipping request from outdated mod: {}", error)
        }
        RelayError::NoRuleMatched { .. } | RelayError::UnmatchedPassthrough => {
            debug!(session, "{}", error)
        }
        RelayError::UnknownSession(_) => warn!("{}", error),
    }
}

/// Run the relay until the event channel closes or shutdown is signalled.
pub async fn run_relay_loop(
    mut relay: Relay,
    mut events: mpsc::UnboundedReceiver<RelayEvent>,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    info!("Relay task started");

    loop {
        tokio::select! {
            event = events.recv() => {
                match event {
                    Some(event) => relay.handle(event),
                    None => break,
                }
            }
            changed = shutdown_rx.changed() => {
                if changed.is_err() || *shutdown_rx.borrow() {
                    break;
                }
            }
        }
    }

    relay.shutdown().await;
    info!("Relay task ended");
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use async_trait::async_trait;
    use semver::Version;
    use tokio::sync::oneshot;

    use super::*;
    use crate::common::error::{LedgerError, LedgerResult};
    use crate::common::EventKind;
    use crate::game::encoding::encode_item_name;
    use crate::game::patterns::{HEADER_INFO, HEADER_RAID, RAID_REWARD};
    use crate::ledger::{CompletionLedger, CompletionRecord, MemoryLedger, RewardLedger};

    const RAID_LINE: &str = "§eAlice§b, §eBob§b, §eCarol§b, and §eDave§b finished §3Nest of the Grootslangs§b and claimed 2x Aspects";

    fn relay_with(policy: VersionPolicy) -> (Relay, Arc<MemoryLedger>) {
        let (ledgers, memory) = Ledgers::in_memory();
        (Relay::standard(policy, ledgers), memory)
    }

    fn relay() -> (Relay, Arc<MemoryLedger>) {
        relay_with(VersionPolicy::default())
    }

    fn join(
        relay: &mut Relay,
        identity: &str,
        version: &str,
    ) -> (SessionId, mpsc::UnboundedReceiver<ServerFrame>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let id = relay.connect(identity.to_string(), version.to_string(), tx);
        (id, rx)
    }

    fn drain_frames(rx: &mut mpsc::UnboundedReceiver<ServerFrame>) -> Vec<ServerFrame> {
        let mut frames = Vec::new();
        while let Ok(frame) = rx.try_recv() {
            frames.push(frame);
        }
        frames
    }

    #[test]
    fn test_guild_chat_broadcast_sanitized() {
        let (mut relay, _) = relay();
        let (a, mut rx) = join(&mut relay, "Alice", "1.0.0");

        let outcome = relay.submit_main(a, "§3Guild§b: §fHello").unwrap();
        let expected = OutputEvent::new(EventKind::Wynn, "Guild", "Hello");

        assert_eq!(outcome, SubmitOutcome::Broadcast(expected.clone()));
        assert_eq!(drain_frames(&mut rx), vec![ServerFrame::WynnMessage(expected)]);
    }

    #[test]
    fn test_item_tokens_emphasized_on_main_stream() {
        let (mut relay, _) = relay();
        let (a, _rx) = join(&mut relay, "Alice", "1.0.0");

        let line = format!("§3Alice§b: §fcheck my {}", encode_item_name("Warp"));
        match relay.submit_main(a, &line).unwrap() {
            SubmitOutcome::Broadcast(event) => assert_eq!(event.body, "check my **__Warp__**"),
            other => panic!("expected broadcast, got {:?}", other),
        }
    }

    #[test]
    fn test_redundant_submissions_broadcast_once() {
        let (mut relay, _) = relay();
        let (a, mut rx_a) = join(&mut relay, "Alice", "1.0.0");
        let (b, mut rx_b) = join(&mut relay, "Bob", "1.0.0");

        let line = "§3Guild§b: §fHello";
        assert!(matches!(relay.submit_main(a, line).unwrap(), SubmitOutcome::Broadcast(_)));
        assert_eq!(relay.submit_main(b, line).unwrap(), SubmitOutcome::Skipped);

        assert_eq!(drain_frames(&mut rx_a).len(), 1);
        assert_eq!(drain_frames(&mut rx_b).len(), 1);
        assert_eq!(relay.coordinator().global_index(StreamKind::Main), 1);
    }

    #[test]
    fn test_outdated_mod_rejected_without_advancing() {
        let (mut relay, _) = relay_with(VersionPolicy::new(Version::new(2, 0, 0)));
        let (old, mut rx) = join(&mut relay, "Alice", "1.9.9");

        let result = relay.submit_main(old, "§3Guild§b: §fHello");
        assert_eq!(
            result,
            Err(RelayError::VersionRejected {
                version: "1.9.9".into()
            })
        );
        assert_eq!(relay.coordinator().global_index(StreamKind::Main), 0);
        assert_eq!(
            relay.sessions().get(old).unwrap().cursor.index(StreamKind::Main),
            0
        );
        assert!(drain_frames(&mut rx).is_empty());

        // A current mod joining later is still elected for index 0
        let (new, _rx) = join(&mut relay, "Bob", "2.0.0");
        assert!(matches!(
            relay.submit_main(new, "§3Guild§b: §fHello").unwrap(),
            SubmitOutcome::Broadcast(_)
        ));
    }

    #[test]
    fn test_unmatched_main_line_consumes_index() {
        let (mut relay, _) = relay();
        let (a, mut rx) = join(&mut relay, "Alice", "1.0.0");

        assert_eq!(
            relay.submit_main(a, "nothing to see"),
            Err(RelayError::NoRuleMatched {
                stream: StreamKind::Main
            })
        );
        assert_eq!(relay.coordinator().global_index(StreamKind::Main), 1);
        assert!(drain_frames(&mut rx).is_empty());
    }

    #[test]
    fn test_secondary_stream_strips_formatting_only() {
        let (mut relay, _) = relay();
        let (a, _rx) = join(&mut relay, "Alice", "1.0.0");

        let token = encode_item_name("Warp");
        let line = format!("§bsomething §3happened {}", token);
        match relay.submit_secondary(a, &line).unwrap() {
            SubmitOutcome::Broadcast(event) => {
                assert_eq!(event.kind, EventKind::Guild);
                assert_eq!(event.header, HEADER_INFO);
                assert_eq!(event.body, format!("something happened {}", token));
            }
            other => panic!("expected broadcast, got {:?}", other),
        }
        assert_eq!(relay.coordinator().global_index(StreamKind::Main), 0);
    }

    #[tokio::test]
    async fn test_raid_completion_effects() {
        let (mut relay, memory) = relay();
        let (a, mut rx) = join(&mut relay, "Alice", "1.0.0");
        let (b, _rx_b) = join(&mut relay, "Bob", "1.0.0");

        relay.submit_main(a, RAID_LINE).unwrap();
        relay.submit_main(b, RAID_LINE).unwrap();
        relay.shutdown().await;

        let frames = drain_frames(&mut rx);
        assert_eq!(
            frames,
            vec![ServerFrame::WynnMessage(OutputEvent::new(
                EventKind::Guild,
                HEADER_RAID,
                "Alice, Bob, Carol, and Dave completed Nest of the Grootslangs"
            ))]
        );

        let completions = memory.completions().await;
        assert_eq!(completions.len(), 1);
        assert_eq!(completions[0].label, "Nest of the Grootslangs");
        for player in ["Alice", "Bob", "Carol", "Dave"] {
            assert_eq!(memory.balance(player).await, RAID_REWARD);
        }
    }

    struct OfflineLedger;

    #[async_trait]
    impl CompletionLedger for OfflineLedger {
        async fn record_completion(&self, _record: CompletionRecord) -> LedgerResult<()> {
            Err(LedgerError::Unavailable {
                message: "offline".into(),
            })
        }
    }

    #[async_trait]
    impl RewardLedger for OfflineLedger {
        async fn adjust_reward(&self, _identity: &str, _delta: f64) -> LedgerResult<f64> {
            Err(LedgerError::Unavailable {
                message: "offline".into(),
            })
        }
    }

    #[tokio::test]
    async fn test_ledger_failure_does_not_block_broadcast() {
        let offline = Arc::new(OfflineLedger);
        let ledgers = Ledgers {
            completions: offline.clone(),
            rewards: offline,
        };
        let mut relay = Relay::standard(VersionPolicy::default(), ledgers);
        let (a, mut rx) = join(&mut relay, "Alice", "1.0.0");

        let outcome = relay.submit_main(a, RAID_LINE).unwrap();
        relay.shutdown().await;

        let expected = OutputEvent::new(
            EventKind::Guild,
            HEADER_RAID,
            "Alice, Bob, Carol, and Dave completed Nest of the Grootslangs",
        );
        assert_eq!(outcome, SubmitOutcome::Broadcast(expected.clone()));
        assert_eq!(drain_frames(&mut rx), vec![ServerFrame::WynnMessage(expected)]);
    }

    #[test]
    fn test_unconfigured_version_policy_accepts_short_tags() {
        let (mut relay, _) = relay();
        let (a, mut rx) = join(&mut relay, "Alice", "1.2");

        assert!(matches!(
            relay.submit_main(a, "§3Guild§b: §fHello"),
            Ok(SubmitOutcome::Broadcast(_))
        ));
        assert_eq!(drain_frames(&mut rx).len(), 1);
    }

    #[test]
    fn test_disconnect_resyncs_remaining_sessions() {
        let (mut relay, _) = relay();
        let (a, _rx_a) = join(&mut relay, "Alice", "1.0.0");
        let (b, _rx_b) = join(&mut relay, "Bob", "1.0.0");
        let (c, _rx_c) = join(&mut relay, "Carol", "1.0.0");

        // Alice relays ten lines, Bob only saw four of them, Carol none
        for i in 0..10 {
            relay.submit_main(a, &format!("§3Guild§b: line {}", i)).unwrap();
        }
        for i in 0..4 {
            relay.submit_main(b, &format!("§3Guild§b: line {}", i)).unwrap();
        }
        assert_eq!(relay.coordinator().global_index(StreamKind::Main), 10);

        relay.disconnect(a, "transport close").unwrap();

        for session in [b, c] {
            let cursor = relay.sessions().get(session).unwrap().cursor;
            assert_eq!(cursor.index(StreamKind::Main), 10);
        }
        assert_eq!(relay.list_active_identities(), vec!["Bob", "Carol"]);

        // Bob is elected for the next line
        assert!(matches!(
            relay.submit_main(b, "§3Guild§b: next").unwrap(),
            SubmitOutcome::Broadcast(_)
        ));
    }

    #[test]
    fn test_disconnect_does_not_touch_secondary_cursors() {
        let (mut relay, _) = relay();
        let (a, _rx_a) = join(&mut relay, "Alice", "1.0.0");
        let (b, _rx_b) = join(&mut relay, "Bob", "1.0.0");

        relay.submit_secondary(a, "one").unwrap();
        relay.disconnect(a, "gone").unwrap();

        let cursor = relay.sessions().get(b).unwrap().cursor;
        assert_eq!(cursor.index(StreamKind::Secondary), 0);
    }

    #[test]
    fn test_sync_realigns_lagging_session() {
        let (mut relay, _) = relay();
        let (a, _rx_a) = join(&mut relay, "Alice", "1.0.0");
        let (b, _rx_b) = join(&mut relay, "Bob", "1.0.0");

        relay.submit_main(a, "§3Guild§b: one").unwrap();
        relay.submit_main(a, "§3Guild§b: two").unwrap();
        assert_eq!(relay.submit_main(b, "§3Guild§b: three").unwrap(), SubmitOutcome::Skipped);

        assert!(relay.sync(b).unwrap());
        assert!(!relay.sync(b).unwrap());
        assert!(matches!(
            relay.submit_main(b, "§3Guild§b: three").unwrap(),
            SubmitOutcome::Broadcast(_)
        ));
    }

    #[test]
    fn test_passthrough_broadcast_without_election() {
        let (mut relay, _) = relay();
        let (a, mut rx) = join(&mut relay, "Alice", "0.0.1");

        let line = format!("[Discord] Someone: look {}", encode_item_name("Warp"));
        let event = relay.submit_passthrough(a, &line).unwrap();
        relay.submit_passthrough(a, &line).unwrap();

        assert_eq!(event.kind, EventKind::Passthrough);
        assert_eq!(event.header, "[Discord] Someone");
        assert_eq!(event.body, "look <Warp>");
        assert_eq!(drain_frames(&mut rx).len(), 2);
        assert_eq!(relay.coordinator().global_index(StreamKind::Main), 0);

        assert_eq!(
            relay.submit_passthrough(a, "no separator"),
            Err(RelayError::UnmatchedPassthrough)
        );
    }

    #[test]
    fn test_platform_message_normalized_and_relayed() {
        let (mut relay, _) = relay();
        let (a, mut rx_a) = join(&mut relay, "Alice", "1.0.0");
        let (_b, mut rx_b) = join(&mut relay, "Bob", "1.0.0");

        let message = PlatformMessage::new("hi\u{200C} there\u{E000}").with_field("Author", "Someone");
        relay.submit_platform_message(a, message).unwrap();

        let expected = PlatformMessage::new("hi there").with_field("Author", "Someone");
        assert_eq!(drain_frames(&mut rx_a), vec![ServerFrame::DiscordMessage(expected.clone())]);
        assert_eq!(drain_frames(&mut rx_b), vec![ServerFrame::DiscordMessage(expected)]);
    }

    #[test]
    fn test_unknown_session() {
        let (mut relay, _) = relay();
        assert_eq!(relay.submit_main(42, "x"), Err(RelayError::UnknownSession(42)));
        assert_eq!(relay.sync(42), Err(RelayError::UnknownSession(42)));
        assert_eq!(relay.disconnect(42, "x"), Err(RelayError::UnknownSession(42)));
    }

    #[tokio::test]
    async fn test_relay_loop_processes_events_in_order() {
        let (relay, memory) = relay();
        let (handle, events) = crate::bridge::RelayHandle::new();
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let task = tokio::spawn(run_relay_loop(relay, events, shutdown_rx));

        let (tx, mut rx) = mpsc::unbounded_channel();
        let session = handle
            .connect("Alice".into(), "1.0.0".into(), tx)
            .await
            .unwrap();

        handle.submit(session, Submission::Main(RAID_LINE.into()));
        assert_eq!(handle.list_online().await.unwrap(), vec!["Alice"]);
        assert!(matches!(rx.recv().await, Some(ServerFrame::WynnMessage(_))));

        shutdown_tx.send(true).unwrap();
        task.await.unwrap();

        // Pending effects were drained and the outbound channel closed
        assert_eq!(memory.completions().await.len(), 1);
        assert!(rx.recv().await.is_none());
    }

    #[test]
    fn test_connect_reply_dropped_removes_session() {
        let (mut relay, _) = relay();
        let (tx, _rx) = mpsc::unbounded_channel();
        let (reply, reply_rx) = oneshot::channel();
        drop(reply_rx);

        relay.handle(RelayEvent::Connect {
            identity: "Alice".into(),
            mod_version: "1.0.0".into(),
            outbound: tx,
            reply,
        });
        assert!(relay.sessions().is_empty());
    }
}
