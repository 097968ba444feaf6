//! The chatroom: composition root of the presence engine.
//!
//! A [`ChatRoom`] owns everything one peer knows about one chatroom. It does
//! no I/O of its own and never reads a clock for scheduling: callers pass the
//! current [`Instant`] in, fire due timers with [`ChatRoom::advance`] and
//! drain observer events with [`ChatRoom::take_events`].

use std::time::{Instant, SystemTime, UNIX_EPOCH};

use rand::Rng;
use tracing::info;

use parley_core::{Name, SeqNo, SessionId, ROUTING_HINT_SEPARATOR};
use parley_sync::Transport;

use crate::clock::SequenceClock;
use crate::config::RoomConfig;
use crate::error::Result;
use crate::events::{Outbox, RoomEvent};
use crate::protocol::{Presence, PresenceState};
use crate::roster::Roster;
use crate::scheduler::{Scheduler, TimerEvent};

/// Current Unix time in seconds.
pub fn unix_now() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_secs() as i64)
        .unwrap_or_default()
}

/// One peer's view of one chatroom.
pub struct ChatRoom<T: Transport> {
    pub(crate) config: RoomConfig,
    pub(crate) transport: T,
    pub(crate) routing_prefix: Name,
    pub(crate) user_chat_prefix: Name,
    pub(crate) local_session: Option<SessionId>,
    pub(crate) clock: SequenceClock,
    pub(crate) roster: Roster,
    pub(crate) timers: Scheduler<TimerEvent>,
    pub(crate) presence: Presence,
    /// Bumped by every close; fetches carry the epoch they were issued in.
    pub(crate) epoch: u64,
    pub(crate) outbox: Outbox,
    pub(crate) wall_clock: fn() -> i64,
}

impl<T: Transport> ChatRoom<T> {
    /// Create a room. Raises [`RoomEvent::ChatPrefixChanged`] with the
    /// initial routable prefix.
    pub fn new(config: RoomConfig, transport: T) -> Result<Self> {
        config.validate()?;
        let mut room = Self {
            routing_prefix: config.routing_prefix.clone(),
            user_chat_prefix: config.user_chat_prefix(),
            roster: Roster::new(config.chatroom.as_str()),
            config,
            transport,
            local_session: None,
            clock: SequenceClock::new(),
            timers: Scheduler::new(),
            presence: Presence::default(),
            epoch: 0,
            outbox: Outbox::new(),
            wall_clock: unix_now,
        };
        room.announce_prefix();
        Ok(room)
    }

    /// Use `clock` for message and eviction timestamps.
    pub fn with_wall_clock(mut self, clock: fn() -> i64) -> Self {
        self.wall_clock = clock;
        self
    }

    /// The prefix this peer publishes under: the user chat prefix, qualified
    /// by the routing prefix unless it already lies under it.
    pub fn routable_prefix(&self) -> Name {
        if self.routing_prefix.is_prefix_of(&self.user_chat_prefix) {
            self.user_chat_prefix.clone()
        } else {
            self.routing_prefix
                .append(ROUTING_HINT_SEPARATOR)
                .join(&self.user_chat_prefix)
        }
    }

    fn announce_prefix(&mut self) {
        let prefix = self.routable_prefix();
        info!(prefix = %prefix, "chat prefix changed");
        self.outbox.push(RoomEvent::ChatPrefixChanged { prefix });
    }

    /// Start a fresh local session and schedule JOIN.
    ///
    /// A room that already has a session is closed first.
    pub fn initialize_sync(&mut self, now: Instant) -> SessionId {
        if self.local_session.is_some() {
            self.close();
        }

        let nonce: u64 = rand::thread_rng().gen();
        let session = SessionId::new(self.routable_prefix().append(nonce.to_string()));

        let sync_prefix = self.config.chatroom_prefix();
        self.transport.reset(&sync_prefix, &session);
        self.clock = SequenceClock::new();
        self.presence
            .begin(now + self.config.join_delay(), &mut self.timers);
        self.local_session = Some(session.clone());

        info!(
            session = %session,
            chatroom = %self.config.chatroom,
            epoch = self.epoch,
            "sync initialized"
        );
        session
    }

    /// Close and start again under a new session.
    pub fn restart(&mut self, now: Instant) -> SessionId {
        self.close();
        self.initialize_sync(now)
    }

    /// Switch to a new routing prefix.
    ///
    /// Returns true if the prefix changed, in which case the session must be
    /// restarted to publish under it. An empty prefix is ignored.
    pub fn update_routing_prefix(&mut self, prefix: Name) -> bool {
        if prefix.is_empty() || prefix == self.routing_prefix {
            return false;
        }
        self.routing_prefix = prefix;
        self.announce_prefix();
        true
    }

    /// Leave and tear down the session.
    ///
    /// Publishes LEAVE if joined, cancels every timer, clears the roster and
    /// invalidates in-flight fetches. Closing a room without a session does
    /// nothing.
    pub fn close(&mut self) {
        let Some(session) = self.local_session.clone() else {
            return;
        };
        if self.presence.state == PresenceState::Joined {
            self.send_leave();
        }

        self.presence.halt(&mut self.timers);
        let timestamp = (self.wall_clock)();
        self.roster
            .clear(timestamp, &mut self.timers, &mut self.outbox);
        let cancelled = self.timers.cancel_all();

        self.local_session = None;
        self.epoch += 1;
        info!(session = %session, cancelled, epoch = self.epoch, "session closed");
    }

    /// Fire every timer due at `now`. Returns how many fired.
    pub fn advance(&mut self, now: Instant) -> usize {
        let mut fired = 0;
        while let Some((id, event)) = self.timers.pop_due(now) {
            fired += 1;
            match event {
                TimerEvent::Join => {
                    if self.presence.join_timer == Some(id) {
                        self.presence.join_timer = None;
                        self.send_join(now);
                    }
                }
                TimerEvent::Hello => {
                    if self.presence.hello_timer == Some(id) {
                        self.presence.hello_timer = None;
                        self.send_hello(now);
                    }
                }
                TimerEvent::Liveness(session) => {
                    let timestamp = (self.wall_clock)();
                    self.roster
                        .expire(&session, id, timestamp, &mut self.outbox);
                }
            }
        }
        fired
    }

    /// When the next timer is due.
    pub fn next_deadline(&self) -> Option<Instant> {
        self.timers.next_deadline()
    }

    /// Drain pending observer events, oldest first.
    pub fn take_events(&mut self) -> Vec<RoomEvent> {
        self.outbox.take()
    }

    /// Pending observer events.
    pub fn events(&self) -> &[RoomEvent] {
        self.outbox.events()
    }

    /// Configuration.
    pub fn config(&self) -> &RoomConfig {
        &self.config
    }

    /// The transport.
    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// The transport, mutably.
    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    /// Known remote sessions.
    pub fn roster(&self) -> &Roster {
        &self.roster
    }

    /// The local session, if initialized.
    pub fn local_session(&self) -> Option<&SessionId> {
        self.local_session.as_ref()
    }

    /// Presence protocol state.
    pub fn presence_state(&self) -> PresenceState {
        self.presence.state
    }

    /// Whether JOIN has been published and LEAVE has not.
    pub fn is_joined(&self) -> bool {
        self.presence.state == PresenceState::Joined
    }

    /// Last sequence number published in this session.
    pub fn sequence(&self) -> Option<SeqNo> {
        self.clock.current()
    }

    /// Current routing prefix.
    pub fn routing_prefix(&self) -> &Name {
        &self.routing_prefix
    }

    /// Current epoch.
    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    /// Number of pending timers.
    pub fn pending_timers(&self) -> usize {
        self.timers.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::RemovalReason;
    use crate::testing::{config, encode, joined_room, peer, published_kinds, room, T0_WALL};
    use parley_core::{ChatMessage, MessageKind, SyncDiff};
    use parley_sync::{FetchCompletion, RecordingTransport, Validation};
    use std::time::Duration;

    #[test]
    fn test_new_rejects_invalid_config() {
        let mut bad = config();
        bad.heartbeat_interval_secs = 0;
        assert!(ChatRoom::new(bad, RecordingTransport::new()).is_err());
    }

    #[test]
    fn test_new_announces_prefix() {
        let mut room = room();
        assert_eq!(
            room.take_events(),
            vec![RoomEvent::ChatPrefixChanged {
                prefix: Name::parse("/parley/alice/CHRONOCHAT-CHATDATA/room").unwrap()
            }]
        );
    }

    #[test]
    fn test_routable_prefix() {
        let mut room = room();
        room.update_routing_prefix(Name::parse("/campus").unwrap());
        assert_eq!(
            room.routable_prefix().to_string(),
            "/campus/%F0./parley/alice/CHRONOCHAT-CHATDATA/room"
        );

        // A routing prefix the user prefix already lies under is not repeated.
        room.update_routing_prefix(Name::parse("/parley/alice").unwrap());
        assert_eq!(
            room.routable_prefix().to_string(),
            "/parley/alice/CHRONOCHAT-CHATDATA/room"
        );
    }

    #[test]
    fn test_update_routing_prefix_reports_change() {
        let mut room = room();
        room.take_events();

        assert!(!room.update_routing_prefix(Name::empty()));
        assert!(room.update_routing_prefix(Name::parse("/lab").unwrap()));
        assert!(!room.update_routing_prefix(Name::parse("/lab").unwrap()));
        assert_eq!(room.take_events().len(), 1);
    }

    #[test]
    fn test_initialize_sync_schedules_join() {
        let t0 = Instant::now();
        let mut room = room();
        let session = room.initialize_sync(t0);

        assert_eq!(room.transport().session(), Some(&session));
        assert_eq!(
            room.transport().sync_prefix().map(|p| p.to_string()).as_deref(),
            Some("/ndn/broadcast/ChronoChat/room")
        );
        assert_eq!(session.name().len(), 5);
        assert_eq!(room.next_deadline(), Some(t0 + Duration::from_millis(600)));

        assert_eq!(room.advance(t0 + Duration::from_millis(599)), 0);
        assert!(!room.is_joined());
        assert_eq!(room.advance(t0 + Duration::from_millis(600)), 1);
        assert!(room.is_joined());
        assert_eq!(published_kinds(&room), vec![MessageKind::Join]);
    }

    #[test]
    fn test_heartbeat_renews_itself() {
        let t0 = Instant::now();
        let mut room = joined_room(t0);
        for minute in 1..=5 {
            room.advance(t0 + Duration::from_secs(60 * minute));
        }
        let kinds = published_kinds(&room);
        assert_eq!(kinds.len(), 6);
        assert!(kinds[1..].iter().all(|k| *k == MessageKind::Hello));
        assert_eq!(room.sequence(), Some(6));
    }

    #[test]
    fn test_close_leaves_and_cancels_everything() {
        let t0 = Instant::now();
        let mut room = joined_room(t0);
        let bob = peer("bob");
        let hello = encode(&ChatMessage::control(MessageKind::Hello, "B", "room", 1));
        room.dispatch(&hello, &bob, Validation::Validated, t0);
        room.take_events();

        room.close();
        assert_eq!(room.pending_timers(), 0);
        assert!(room.roster().is_empty());
        assert_eq!(room.local_session(), None);
        assert_eq!(room.presence_state(), PresenceState::Idle);
        assert_eq!(room.epoch(), 1);
        assert_eq!(
            published_kinds(&room),
            vec![MessageKind::Join, MessageKind::Leave]
        );

        let events = room.take_events();
        assert!(events.contains(&RoomEvent::SessionRemoved {
            session: bob,
            nickname: Some("B".into()),
            timestamp: T0_WALL,
            reason: RemovalReason::Shutdown,
        }));

        // Nothing fires afterwards.
        room.advance(t0 + Duration::from_secs(86_400));
        assert_eq!(published_kinds(&room).len(), 2);
        assert!(room.take_events().is_empty());
    }

    #[test]
    fn test_close_is_idempotent() {
        let t0 = Instant::now();
        let mut room = joined_room(t0);
        room.close();
        room.take_events();

        room.close();
        assert!(room.take_events().is_empty());
        assert_eq!(room.epoch(), 1);
        assert_eq!(
            published_kinds(&room),
            vec![MessageKind::Join, MessageKind::Leave]
        );
    }

    #[test]
    fn test_close_before_join_sends_no_leave() {
        let t0 = Instant::now();
        let mut room = room();
        room.initialize_sync(t0);
        room.close();
        assert!(room.transport().published().is_empty());
        room.advance(t0 + Duration::from_secs(1));
        assert!(room.transport().published().is_empty());
    }

    #[test]
    fn test_restart_uses_new_session_and_clock() {
        let t0 = Instant::now();
        let mut room = joined_room(t0);
        let first = room.local_session().cloned().unwrap();
        room.send_chat("one", 1);

        let second = room.restart(t0);
        assert_ne!(first, second);
        assert_eq!(room.transport().sessions(), &[first, second.clone()]);
        assert_eq!(room.sequence(), None);

        room.advance(t0 + Duration::from_millis(600));
        let last = room.transport().published().last().cloned().unwrap();
        assert_eq!(last.session, second);
        assert_eq!(last.seq, 1);
    }

    #[test]
    fn test_scenario_join_chat_timeout() {
        let t0 = Instant::now();
        let mut room = joined_room(t0);
        let a = peer("a");

        // A's JOIN shows up as a diff: present, but no nickname yet.
        room.process_sync_update(&[SyncDiff::single(a.clone(), 1)]);
        assert!(!room.roster().get(&a).unwrap().has_nickname());
        let join_fetch = room.transport_mut().take_fetches().remove(0);
        room.take_events();

        // A's CHAT at t=1.
        let t1 = t0 + Duration::from_secs(1);
        room.process_sync_update(&[SyncDiff::single(a.clone(), 2)]);
        let chat_fetch = room.transport_mut().take_fetches().remove(0);
        let chat = encode(&ChatMessage::chat("A", "room", "hi", 1));
        room.on_fetch_completed(
            FetchCompletion::fetched(chat_fetch, chat, Validation::Validated),
            t1,
        );
        let events = room.take_events();
        let added = events
            .iter()
            .position(|e| matches!(e, RoomEvent::SessionAdded { nickname, .. } if nickname == "A"))
            .unwrap();
        let shown = events
            .iter()
            .position(|e| {
                *e == RoomEvent::ChatDisplayed {
                    display_name: "A".into(),
                    body: "hi".into(),
                    timestamp: 1,
                    verified: true,
                }
            })
            .unwrap();
        assert!(added < shown);

        // The JOIN payload arriving late only refreshes liveness.
        let join = encode(&ChatMessage::control(MessageKind::Join, "A", "room", 0));
        room.on_fetch_completed(
            FetchCompletion::fetched(join_fetch, join, Validation::Validated),
            t1,
        );
        assert!(!room
            .take_events()
            .iter()
            .any(|e| matches!(e, RoomEvent::SessionAdded { .. })));

        // Silence: evicted 180 s after the last activity.
        room.advance(t1 + Duration::from_secs(179));
        assert!(room.roster().contains(&a));
        room.advance(t1 + Duration::from_secs(180));
        assert!(!room.roster().contains(&a));
        assert!(room.take_events().contains(&RoomEvent::SessionRemoved {
            session: a,
            nickname: Some("A".into()),
            timestamp: T0_WALL,
            reason: RemovalReason::Timeout,
        }));
    }

    #[test]
    fn test_unix_now_is_after_2020() {
        assert!(unix_now() > 1_577_836_800);
    }
}
