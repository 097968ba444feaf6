//! The local join/hello/leave protocol.
//!
//! ```text
//! Idle --initialize_sync--> Joining --send_join--> Joined
//!   ^                                                |
//!   +-------------- Leaving <------ send_leave ------+
//! ```
//!
//! Leaving `Joined` always cancels the pending HELLO timer, so no heartbeat
//! can be published after LEAVE.

use std::time::Instant;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use parley_core::{ChatMessage, MessageKind, SeqNo};
use parley_sync::Transport;

use crate::events::RoomEvent;
use crate::room::ChatRoom;
use crate::scheduler::{Scheduler, TimerEvent, TimerId};

/// Components between the routable user prefix and the local identity.
pub const LOCAL_IDENTITY_OFFSET: usize = 2;

/// Where the local peer is in the presence protocol.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PresenceState {
    /// No session, or the session has left.
    #[default]
    Idle,
    /// Session started, JOIN pending.
    Joining,
    /// JOIN published; heartbeats running.
    Joined,
    /// LEAVE being published.
    Leaving,
}

/// Presence state plus the timers it owns.
#[derive(Debug, Default)]
pub(crate) struct Presence {
    pub(crate) state: PresenceState,
    pub(crate) join_timer: Option<TimerId>,
    pub(crate) hello_timer: Option<TimerId>,
}

impl Presence {
    /// Enter `Joining` with JOIN scheduled at `join_at`.
    pub(crate) fn begin(&mut self, join_at: Instant, timers: &mut Scheduler<TimerEvent>) {
        self.cancel_timers(timers);
        self.join_timer = Some(timers.schedule(join_at, TimerEvent::Join));
        self.state = PresenceState::Joining;
    }

    /// Drop back to `Idle`, cancelling both timers.
    pub(crate) fn halt(&mut self, timers: &mut Scheduler<TimerEvent>) {
        self.cancel_timers(timers);
        self.state = PresenceState::Idle;
    }

    fn schedule_hello(&mut self, at: Instant, timers: &mut Scheduler<TimerEvent>) {
        if let Some(previous) = self.hello_timer.take() {
            timers.cancel(previous);
        }
        self.hello_timer = Some(timers.schedule(at, TimerEvent::Hello));
    }

    fn cancel_timers(&mut self, timers: &mut Scheduler<TimerEvent>) {
        for timer in [self.join_timer.take(), self.hello_timer.take()]
            .into_iter()
            .flatten()
        {
            timers.cancel(timer);
        }
    }
}

impl<T: Transport> ChatRoom<T> {
    /// Publish JOIN and start heartbeats.
    ///
    /// Returns false if there is no local session or the room already
    /// joined.
    pub fn send_join(&mut self, now: Instant) -> bool {
        if self.presence.state == PresenceState::Joined {
            return false;
        }
        let Some(session) = self.local_session.clone() else {
            debug!("join requested without a session");
            return false;
        };
        if let Some(timer) = self.presence.join_timer.take() {
            self.timers.cancel(timer);
        }

        self.presence.state = PresenceState::Joined;
        let message = self.control_message(MessageKind::Join);
        self.publish(&message);

        let next_hello = now + self.config.heartbeat_interval();
        self.presence.schedule_hello(next_hello, &mut self.timers);

        info!(session = %session, nickname = %self.config.nickname, "joined chatroom");
        self.outbox.push(RoomEvent::SessionAdded {
            session,
            nickname: message.from().to_string(),
            timestamp: message.timestamp(),
        });
        true
    }

    /// Publish a HELLO heartbeat and schedule the next one.
    pub fn send_hello(&mut self, now: Instant) -> bool {
        if self.presence.state != PresenceState::Joined {
            return false;
        }
        let message = self.control_message(MessageKind::Hello);
        self.publish(&message);

        let next_hello = now + self.config.heartbeat_interval();
        self.presence.schedule_hello(next_hello, &mut self.timers);
        true
    }

    /// Publish LEAVE and return to `Idle`.
    pub fn send_leave(&mut self) -> bool {
        if self.presence.state != PresenceState::Joined {
            return false;
        }
        self.presence.state = PresenceState::Leaving;
        let message = self.control_message(MessageKind::Leave);
        self.publish(&message);
        self.presence.halt(&mut self.timers);

        let identity = self.routable_prefix().trim(LOCAL_IDENTITY_OFFSET);
        info!(identity = %identity, "left chatroom");
        self.outbox.push(RoomEvent::IdentityLeft {
            identity,
            chatroom: self.config.chatroom.clone(),
        });
        true
    }

    /// Publish a chat line and display it locally.
    ///
    /// Ignored unless joined.
    pub fn send_chat(&mut self, text: &str, timestamp: i64) -> bool {
        if self.presence.state != PresenceState::Joined {
            debug!("chat ignored while not joined");
            return false;
        }
        let message = ChatMessage::chat(
            self.config.nickname.as_str(),
            self.config.chatroom.as_str(),
            text,
            timestamp,
        );
        self.publish(&message);

        self.outbox.push(RoomEvent::ChatDisplayed {
            display_name: message.from().to_string(),
            body: message.data().to_string(),
            timestamp: message.timestamp(),
            verified: true,
        });
        true
    }

    fn control_message(&self, kind: MessageKind) -> ChatMessage {
        ChatMessage::control(
            kind,
            self.config.nickname.as_str(),
            self.config.chatroom.as_str(),
            (self.wall_clock)(),
        )
    }

    /// Publish one message under the next sequence number.
    ///
    /// The sequence number is consumed even if the transport refuses it.
    fn publish(&mut self, message: &ChatMessage) -> Option<SeqNo> {
        let session = self.local_session.clone()?;
        let payload = match message.encode() {
            Ok(payload) => payload,
            Err(e) => {
                warn!(kind = %message.kind(), error = %e, "failed to encode message");
                return None;
            }
        };

        let seq = self.clock.next();
        if let Err(e) = self
            .transport
            .publish(seq, payload, self.config.freshness())
        {
            warn!(kind = %message.kind(), seq, error = %e, "publish failed");
            return None;
        }

        debug!(kind = %message.kind(), seq, "published");
        self.outbox.push(RoomEvent::TreeUpdated {
            session,
            seq,
            root_digest: self.transport.root_digest().to_hex(),
        });
        Some(seq)
    }
}
