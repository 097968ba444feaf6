//! Test fixtures and helpers.
//!
//! Common setup code for room and engine tests.

use std::time::{Duration, Instant};

use bytes::Bytes;

use parley_core::{ChatMessage, MessageKind, Name, SeqNo, SessionId, SyncDiff};
use parley_presence::{ChatRoom, DispatchOutcome, RoomConfig, RoomEvent};
use parley_sync::{FetchCompletion, RecordingTransport, Validation};

/// Chatroom every fixture lives in.
pub const FIXTURE_CHATROOM: &str = "fixture-room";

/// Wall-clock reading fixture rooms report.
pub const FIXTURE_WALL_CLOCK: i64 = 1_700_000_000;

fn fixed_wall_clock() -> i64 {
    FIXTURE_WALL_CLOCK
}

/// A remote peer: a nickname and the session it publishes under.
#[derive(Debug, Clone)]
pub struct PeerFixture {
    pub nickname: String,
    pub session: SessionId,
}

impl PeerFixture {
    /// Create a peer with a session under `/parley/<nickname>`.
    pub fn new(nickname: &str) -> Self {
        Self::with_session_number(nickname, 1)
    }

    /// Create a peer with a specific session number.
    pub fn with_session_number(nickname: &str, number: u64) -> Self {
        let session = Name::empty()
            .append("parley")
            .append(nickname)
            .append("CHRONOCHAT-CHATDATA")
            .append(FIXTURE_CHATROOM)
            .append(number.to_string());
        Self {
            nickname: nickname.to_string(),
            session: SessionId::new(session),
        }
    }

    /// The identity the peer's session belongs to.
    pub fn identity(&self) -> Name {
        Name::empty().append("parley").append(self.nickname.as_str())
    }

    /// Room configuration for running this peer locally.
    pub fn config(&self) -> RoomConfig {
        RoomConfig::new(self.nickname.as_str(), FIXTURE_CHATROOM)
    }

    /// A control message from this peer.
    pub fn control(&self, kind: MessageKind, timestamp: i64) -> ChatMessage {
        ChatMessage::control(kind, self.nickname.as_str(), FIXTURE_CHATROOM, timestamp)
    }

    /// A chat line from this peer.
    pub fn chat(&self, text: &str, timestamp: i64) -> ChatMessage {
        ChatMessage::chat(self.nickname.as_str(), FIXTURE_CHATROOM, text, timestamp)
    }

    /// A diff announcing `low..=high` for this peer.
    pub fn diff(&self, low: SeqNo, high: SeqNo) -> SyncDiff {
        SyncDiff::new(self.session.clone(), low, high)
    }
}

/// Create distinct peers named `peer0`, `peer1`, ...
pub fn multi_peer_fixtures(count: usize) -> Vec<PeerFixture> {
    (0..count)
        .map(|i| PeerFixture::new(&format!("peer{}", i)))
        .collect()
}

/// Encode a message, panicking on failure.
pub fn encode(message: &ChatMessage) -> Bytes {
    message.encode().expect("fixture message encodes")
}

/// A room over a recording transport with a controllable clock.
pub struct RoomFixture {
    pub room: ChatRoom<RecordingTransport>,
    /// Instant the fixture started at.
    pub t0: Instant,
    now: Instant,
}

impl RoomFixture {
    /// A room for `local`, not yet initialized.
    pub fn new(local: &PeerFixture) -> Self {
        let room = ChatRoom::new(local.config(), RecordingTransport::new())
            .expect("fixture config is valid")
            .with_wall_clock(fixed_wall_clock);
        let t0 = Instant::now();
        Self { room, t0, now: t0 }
    }

    /// A room for a peer called `me` that has joined, with events drained.
    pub fn joined() -> Self {
        let mut fixture = Self::new(&PeerFixture::new("me"));
        fixture.room.initialize_sync(fixture.now);
        fixture.room.send_join(fixture.now);
        fixture.room.take_events();
        fixture
    }

    /// Current fixture time.
    pub fn now(&self) -> Instant {
        self.now
    }

    /// Move time forward and fire due timers.
    pub fn advance(&mut self, by: Duration) -> usize {
        self.now += by;
        self.room.advance(self.now)
    }

    /// Announce `message` as `peer`'s sequence number `seq` and resolve the
    /// resulting fetch with it.
    pub fn deliver(
        &mut self,
        peer: &PeerFixture,
        seq: SeqNo,
        message: &ChatMessage,
        validation: Validation,
    ) -> Option<DispatchOutcome> {
        self.room.process_sync_update(&[peer.diff(seq, seq)]);
        let request = self
            .room
            .transport_mut()
            .take_fetches()
            .into_iter()
            .find(|r| r.session == peer.session && r.seq == seq)?;
        let completion = FetchCompletion::fetched(request, encode(message), validation);
        self.room.on_fetch_completed(completion, self.now)
    }

    /// Drain room events.
    pub fn events(&mut self) -> Vec<RoomEvent> {
        self.room.take_events()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_peer_fixture_names() {
        let peer = PeerFixture::with_session_number("bob", 7);
        assert_eq!(
            peer.session.to_string(),
            "/parley/bob/CHRONOCHAT-CHATDATA/fixture-room/7"
        );
        assert_eq!(peer.session.identity(3), peer.identity());
        assert_eq!(peer.diff(2, 4).gap(), 2);
    }

    #[test]
    fn test_multi_peer() {
        let peers = multi_peer_fixtures(3);
        assert_ne!(peers[0].session, peers[1].session);
        assert_ne!(peers[1].session, peers[2].session);
    }

    #[test]
    fn test_deliver_chat() {
        let mut fixture = RoomFixture::joined();
        let bob = PeerFixture::new("bob");

        let outcome = fixture.deliver(&bob, 1, &bob.chat("hi", 5), Validation::Validated);
        assert_eq!(outcome, Some(DispatchOutcome::Applied(MessageKind::Chat)));
        assert!(fixture.room.roster().contains(&bob.session));
    }
}
