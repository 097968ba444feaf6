//! Events the room raises for observers.

use serde::{Deserialize, Serialize};

use parley_core::{Name, SeqNo, SessionId};

/// Why a session left the roster.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RemovalReason {
    /// The peer published LEAVE.
    Leave,
    /// No activity within the liveness window.
    Timeout,
    /// The local room shut down or restarted.
    Shutdown,
}

/// Externally observable room event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum RoomEvent {
    /// A session's head advanced, either from a sync diff or a local publish.
    TreeUpdated {
        session: SessionId,
        seq: SeqNo,
        /// Root digest as 64 hex characters.
        root_digest: String,
    },
    /// A session was seen for the first time since it was last evicted.
    SessionDiscovered { session: SessionId },
    /// A session announced its nickname for the first time.
    SessionAdded {
        session: SessionId,
        nickname: String,
        timestamp: i64,
    },
    /// A session left the roster.
    SessionRemoved {
        session: SessionId,
        nickname: Option<String>,
        timestamp: i64,
        reason: RemovalReason,
    },
    /// A known session changed nickname.
    NicknameUpdated { session: SessionId, nickname: String },
    /// A chat line to show.
    ChatDisplayed {
        /// Sender nickname, suffixed with ` (Unverified)` when the payload
        /// failed validation.
        display_name: String,
        body: String,
        timestamp: i64,
        verified: bool,
    },
    /// Any non-LEAVE message arrived from a session.
    PeerActivity { session: SessionId },
    /// The prefix this peer publishes under changed.
    ChatPrefixChanged { prefix: Name },
    /// An identity gained a session in this chatroom.
    IdentityJoined { identity: Name, chatroom: String },
    /// An identity lost its session in this chatroom.
    IdentityLeft { identity: Name, chatroom: String },
}

/// Pending events, drained by the room's driver.
#[derive(Debug, Default)]
pub struct Outbox {
    events: Vec<RoomEvent>,
}

impl Outbox {
    /// Create an empty outbox.
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue one event.
    pub fn push(&mut self, event: RoomEvent) {
        self.events.push(event);
    }

    /// Take every queued event, oldest first.
    pub fn take(&mut self) -> Vec<RoomEvent> {
        std::mem::take(&mut self.events)
    }

    /// Queued events, oldest first.
    pub fn events(&self) -> &[RoomEvent] {
        &self.events
    }

    /// Number of queued events.
    pub fn len(&self) -> usize {
        self.events.len()
    }

    /// Whether nothing is queued.
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}
