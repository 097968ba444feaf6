//! The roster of known remote sessions.
//!
//! The roster exclusively owns every [`Session`]. Other components only reach
//! a session through roster methods for the duration of one call; the session
//! id is the only handle that outlives a call.
//!
//! Each session holds at most one liveness timer. Scheduling a new one
//! cancels the previous timer in the same call, and an expiring timer only
//! evicts its session if it is still the timer the session holds.
//!
//! A session that sent LEAVE leaves a departure mark behind: the sequence
//! number of its LEAVE. Payloads at or below the mark arrived late and must
//! not bring the session back.

use std::collections::BTreeMap;
use std::time::Instant;

use tracing::debug;

use parley_core::{Name, SeqNo, SessionId};

use crate::events::{Outbox, RemovalReason, RoomEvent};
use crate::scheduler::{Scheduler, TimerEvent, TimerId};

/// Components between an identity and one of its session prefixes.
pub const IDENTITY_OFFSET: usize = 3;

/// Presence state of one remote session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    id: SessionId,
    nickname: Option<String>,
    last_seen_seq: Option<SeqNo>,
    liveness_timer: Option<TimerId>,
}

impl Session {
    fn new(id: SessionId) -> Self {
        Self {
            id,
            nickname: None,
            last_seen_seq: None,
            liveness_timer: None,
        }
    }

    /// Session id.
    pub fn id(&self) -> &SessionId {
        &self.id
    }

    /// Last announced nickname.
    pub fn nickname(&self) -> Option<&str> {
        self.nickname.as_deref()
    }

    /// Whether the session has announced a nickname.
    pub fn has_nickname(&self) -> bool {
        self.nickname.is_some()
    }

    /// Highest sequence number seen in a diff.
    pub fn last_seen_seq(&self) -> Option<SeqNo> {
        self.last_seen_seq
    }

    /// Pending liveness timer, if any.
    pub fn liveness_timer(&self) -> Option<TimerId> {
        self.liveness_timer
    }

    /// Identity the session belongs to.
    pub fn identity(&self) -> Name {
        self.id.identity(IDENTITY_OFFSET)
    }

    /// Raise `last_seen_seq` to `seq` if it is higher.
    pub fn observe_seq(&mut self, seq: SeqNo) {
        self.last_seen_seq = Some(self.last_seen_seq.map_or(seq, |last| last.max(seq)));
    }
}

/// What `update_nickname` did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NicknameChange {
    /// First nickname for the session.
    Added,
    /// Nickname replaced.
    Renamed,
    /// Same nickname as before.
    Unchanged,
    /// No such session.
    Unknown,
}

/// Known sessions of one chatroom.
#[derive(Debug)]
pub struct Roster {
    chatroom: String,
    sessions: BTreeMap<SessionId, Session>,
    departed: BTreeMap<SessionId, SeqNo>,
}

impl Roster {
    /// Create an empty roster for `chatroom`.
    pub fn new(chatroom: impl Into<String>) -> Self {
        Self {
            chatroom: chatroom.into(),
            sessions: BTreeMap::new(),
            departed: BTreeMap::new(),
        }
    }

    /// Get the session for `id`, inserting a fresh one if it is unknown.
    ///
    /// The flag is true when the session was inserted; insertion raises
    /// [`RoomEvent::SessionDiscovered`].
    pub fn touch(&mut self, id: &SessionId, outbox: &mut Outbox) -> (&mut Session, bool) {
        let inserted = !self.sessions.contains_key(id);
        if inserted {
            debug!(session = %id, "session discovered");
            outbox.push(RoomEvent::SessionDiscovered {
                session: id.clone(),
            });
        }
        let session = self
            .sessions
            .entry(id.clone())
            .or_insert_with(|| Session::new(id.clone()));
        (session, inserted)
    }

    /// Record the nickname a session announced.
    pub fn update_nickname(
        &mut self,
        id: &SessionId,
        nickname: &str,
        timestamp: i64,
        outbox: &mut Outbox,
    ) -> NicknameChange {
        let Some(session) = self.sessions.get_mut(id) else {
            return NicknameChange::Unknown;
        };

        let change = match session.nickname.as_deref() {
            None => NicknameChange::Added,
            Some(current) if current != nickname => NicknameChange::Renamed,
            Some(_) => return NicknameChange::Unchanged,
        };
        session.nickname = Some(nickname.to_string());

        if change == NicknameChange::Added {
            debug!(session = %id, nickname, "session added");
            outbox.push(RoomEvent::SessionAdded {
                session: id.clone(),
                nickname: nickname.to_string(),
                timestamp,
            });
            outbox.push(RoomEvent::IdentityJoined {
                identity: session.identity(),
                chatroom: self.chatroom.clone(),
            });
        } else {
            outbox.push(RoomEvent::NicknameUpdated {
                session: id.clone(),
                nickname: nickname.to_string(),
            });
        }
        change
    }

    /// Replace the session's liveness timer with one firing at `deadline`.
    ///
    /// Returns false if the session is unknown.
    pub fn schedule_liveness(
        &mut self,
        id: &SessionId,
        deadline: Instant,
        timers: &mut Scheduler<TimerEvent>,
    ) -> bool {
        let Some(session) = self.sessions.get_mut(id) else {
            return false;
        };
        if let Some(previous) = session.liveness_timer.take() {
            timers.cancel(previous);
        }
        session.liveness_timer = Some(timers.schedule(deadline, TimerEvent::Liveness(id.clone())));
        true
    }

    /// Give the session a liveness timer firing at `deadline`, unless it
    /// already holds one.
    ///
    /// Returns true if a timer was scheduled.
    pub fn arm_liveness(
        &mut self,
        id: &SessionId,
        deadline: Instant,
        timers: &mut Scheduler<TimerEvent>,
    ) -> bool {
        let unarmed = self
            .sessions
            .get(id)
            .is_some_and(|s| s.liveness_timer.is_none());
        unarmed && self.schedule_liveness(id, deadline, timers)
    }

    /// Handle a fired liveness timer.
    ///
    /// Evicts the session only if `timer` is the timer it currently holds.
    pub fn expire(
        &mut self,
        id: &SessionId,
        timer: TimerId,
        timestamp: i64,
        outbox: &mut Outbox,
    ) -> bool {
        let current = self.sessions.get(id).and_then(|s| s.liveness_timer);
        if current != Some(timer) {
            return false;
        }
        let Some(mut session) = self.sessions.remove(id) else {
            return false;
        };
        session.liveness_timer = None;
        debug!(session = %id, "session timed out");
        self.announce_removal(session, RemovalReason::Timeout, None, timestamp, outbox);
        true
    }

    /// Remove a session, cancelling its timer.
    ///
    /// `actor_nickname` overrides the stored nickname in the event (a LEAVE
    /// carries the sender's name). Unknown sessions are a no-op.
    pub fn remove(
        &mut self,
        id: &SessionId,
        reason: RemovalReason,
        actor_nickname: Option<&str>,
        timestamp: i64,
        timers: &mut Scheduler<TimerEvent>,
        outbox: &mut Outbox,
    ) -> bool {
        let Some(mut session) = self.sessions.remove(id) else {
            return false;
        };
        if let Some(timer) = session.liveness_timer.take() {
            timers.cancel(timer);
        }
        debug!(session = %id, ?reason, "session removed");
        self.announce_removal(session, reason, actor_nickname, timestamp, outbox);
        true
    }

    /// Remove every session with reason [`RemovalReason::Shutdown`] and
    /// forget every departure mark.
    pub fn clear(&mut self, timestamp: i64, timers: &mut Scheduler<TimerEvent>, outbox: &mut Outbox) {
        let ids: Vec<SessionId> = self.sessions.keys().cloned().collect();
        for id in ids {
            self.remove(&id, RemovalReason::Shutdown, None, timestamp, timers, outbox);
        }
        self.departed.clear();
    }

    /// Record that `id` sent LEAVE as sequence number `seq`.
    pub fn mark_departed(&mut self, id: &SessionId, seq: SeqNo) {
        let mark = self.departed.entry(id.clone()).or_insert(seq);
        *mark = (*mark).max(seq);
    }

    /// Sequence number of the LEAVE `id` sent, if any.
    pub fn departed_at(&self, id: &SessionId) -> Option<SeqNo> {
        self.departed.get(id).copied()
    }

    /// Whether a payload `seq` from `id` predates its LEAVE.
    pub fn is_superseded(&self, id: &SessionId, seq: SeqNo) -> bool {
        self.departed_at(id).is_some_and(|left| seq <= left)
    }

    fn announce_removal(
        &self,
        session: Session,
        reason: RemovalReason,
        actor_nickname: Option<&str>,
        timestamp: i64,
        outbox: &mut Outbox,
    ) {
        let identity = session.identity();
        let announced = session.has_nickname();
        let nickname = actor_nickname.map(String::from).or(session.nickname);

        outbox.push(RoomEvent::SessionRemoved {
            session: session.id,
            nickname,
            timestamp,
            reason,
        });
        if announced && reason != RemovalReason::Shutdown {
            outbox.push(RoomEvent::IdentityLeft {
                identity,
                chatroom: self.chatroom.clone(),
            });
        }
    }

    /// Look up a session.
    pub fn get(&self, id: &SessionId) -> Option<&Session> {
        self.sessions.get(id)
    }

    /// Whether `id` is in the roster.
    pub fn contains(&self, id: &SessionId) -> bool {
        self.sessions.contains_key(id)
    }

    /// Number of sessions.
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    /// Whether the roster is empty.
    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Iterate over sessions in id order.
    pub fn iter(&self) -> impl Iterator<Item = &Session> {
        self.sessions.values()
    }

    /// Chatroom this roster belongs to.
    pub fn chatroom(&self) -> &str {
        &self.chatroom
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::time::Duration;

    fn session(uri: &str) -> SessionId {
        SessionId::new(Name::parse(uri).unwrap())
    }

    fn alice() -> SessionId {
        session("/ucla/alice/CHRONOCHAT-CHATDATA/room/1001")
    }

    #[test]
    fn test_touch_inserts_once() {
        let mut roster = Roster::new("room");
        let mut outbox = Outbox::new();

        let (s, inserted) = roster.touch(&alice(), &mut outbox);
        assert!(inserted);
        assert!(!s.has_nickname());
        assert_eq!(s.last_seen_seq(), None);
        assert_eq!(s.liveness_timer(), None);

        let (_, inserted) = roster.touch(&alice(), &mut outbox);
        assert!(!inserted);
        assert_eq!(outbox.len(), 1);
        assert_eq!(roster.len(), 1);
    }

    #[test]
    fn test_observe_seq_keeps_highest() {
        let mut roster = Roster::new("room");
        let mut outbox = Outbox::new();
        let (s, _) = roster.touch(&alice(), &mut outbox);
        s.observe_seq(5);
        s.observe_seq(3);
        assert_eq!(s.last_seen_seq(), Some(5));
    }

    #[test]
    fn test_nickname_transitions() {
        let mut roster = Roster::new("room");
        let mut outbox = Outbox::new();
        roster.touch(&alice(), &mut outbox);
        outbox.take();

        assert_eq!(
            roster.update_nickname(&alice(), "A", 1, &mut outbox),
            NicknameChange::Added
        );
        assert_eq!(
            outbox.take(),
            vec![
                RoomEvent::SessionAdded {
                    session: alice(),
                    nickname: "A".into(),
                    timestamp: 1,
                },
                RoomEvent::IdentityJoined {
                    identity: Name::parse("/ucla/alice").unwrap(),
                    chatroom: "room".into(),
                },
            ]
        );

        assert_eq!(
            roster.update_nickname(&alice(), "A", 2, &mut outbox),
            NicknameChange::Unchanged
        );
        assert!(outbox.is_empty());

        assert_eq!(
            roster.update_nickname(&alice(), "Alice", 3, &mut outbox),
            NicknameChange::Renamed
        );
        assert_eq!(
            outbox.take(),
            vec![RoomEvent::NicknameUpdated {
                session: alice(),
                nickname: "Alice".into(),
            }]
        );

        assert_eq!(
            roster.update_nickname(&session("/nobody"), "X", 4, &mut outbox),
            NicknameChange::Unknown
        );
    }

    #[test]
    fn test_schedule_liveness_supersedes() {
        let t0 = Instant::now();
        let mut roster = Roster::new("room");
        let mut timers = Scheduler::new();
        let mut outbox = Outbox::new();
        roster.touch(&alice(), &mut outbox);

        assert!(roster.schedule_liveness(&alice(), t0 + Duration::from_secs(180), &mut timers));
        let first = roster.get(&alice()).unwrap().liveness_timer().unwrap();
        assert!(roster.schedule_liveness(&alice(), t0 + Duration::from_secs(200), &mut timers));
        let second = roster.get(&alice()).unwrap().liveness_timer().unwrap();

        assert_ne!(first, second);
        assert!(!timers.is_pending(first));
        assert_eq!(timers.len(), 1);

        // A superseded timer cannot evict.
        assert!(!roster.expire(&alice(), first, 0, &mut outbox));
        assert!(roster.contains(&alice()));

        assert!(!roster.schedule_liveness(&session("/nobody"), t0, &mut timers));
    }

    #[test]
    fn test_expire_evicts_with_last_nickname() {
        let t0 = Instant::now();
        let mut roster = Roster::new("room");
        let mut timers = Scheduler::new();
        let mut outbox = Outbox::new();
        roster.touch(&alice(), &mut outbox);
        roster.update_nickname(&alice(), "A", 1, &mut outbox);
        roster.schedule_liveness(&alice(), t0, &mut timers);
        outbox.take();

        let (timer, event) = timers.pop_due(t0).unwrap();
        assert_eq!(event, TimerEvent::Liveness(alice()));
        assert!(roster.expire(&alice(), timer, 181, &mut outbox));
        assert!(roster.is_empty());
        assert_eq!(
            outbox.take(),
            vec![
                RoomEvent::SessionRemoved {
                    session: alice(),
                    nickname: Some("A".into()),
                    timestamp: 181,
                    reason: RemovalReason::Timeout,
                },
                RoomEvent::IdentityLeft {
                    identity: Name::parse("/ucla/alice").unwrap(),
                    chatroom: "room".into(),
                },
            ]
        );
    }

    #[test]
    fn test_remove_unknown_is_noop() {
        let mut roster = Roster::new("room");
        let mut timers = Scheduler::new();
        let mut outbox = Outbox::new();
        assert!(!roster.remove(
            &alice(),
            RemovalReason::Leave,
            Some("A"),
            5,
            &mut timers,
            &mut outbox
        ));
        assert!(outbox.is_empty());
    }

    #[test]
    fn test_remove_cancels_timer_and_uses_actor_nickname() {
        let t0 = Instant::now();
        let mut roster = Roster::new("room");
        let mut timers = Scheduler::new();
        let mut outbox = Outbox::new();
        roster.touch(&alice(), &mut outbox);
        roster.schedule_liveness(&alice(), t0, &mut timers);
        outbox.take();

        assert!(roster.remove(
            &alice(),
            RemovalReason::Leave,
            Some("A"),
            5,
            &mut timers,
            &mut outbox
        ));
        assert!(timers.is_empty());
        // No nickname was ever announced, so there is no identity to retract.
        assert_eq!(
            outbox.take(),
            vec![RoomEvent::SessionRemoved {
                session: alice(),
                nickname: Some("A".into()),
                timestamp: 5,
                reason: RemovalReason::Leave,
            }]
        );
    }

    #[test]
    fn test_clear_removes_everything() {
        let t0 = Instant::now();
        let mut roster = Roster::new("room");
        let mut timers = Scheduler::new();
        let mut outbox = Outbox::new();
        for i in 0..3 {
            let id = session(&format!("/peer{}/x/room/{}", i, i));
            roster.touch(&id, &mut outbox);
            roster.update_nickname(&id, "n", 0, &mut outbox);
            roster.schedule_liveness(&id, t0, &mut timers);
        }
        outbox.take();

        roster.clear(9, &mut timers, &mut outbox);
        assert!(roster.is_empty());
        assert!(timers.is_empty());
        let events = outbox.take();
        assert_eq!(events.len(), 3);
        assert!(events.iter().all(|e| matches!(
            e,
            RoomEvent::SessionRemoved {
                reason: RemovalReason::Shutdown,
                ..
            }
        )));
    }

    #[test]
    fn test_arm_liveness_keeps_existing_timer() {
        let t0 = Instant::now();
        let mut roster = Roster::new("room");
        let mut timers = Scheduler::new();
        let mut outbox = Outbox::new();
        roster.touch(&alice(), &mut outbox);

        assert!(roster.arm_liveness(&alice(), t0 + Duration::from_secs(180), &mut timers));
        let armed = roster.get(&alice()).unwrap().liveness_timer();
        assert!(!roster.arm_liveness(&alice(), t0 + Duration::from_secs(500), &mut timers));
        assert_eq!(roster.get(&alice()).unwrap().liveness_timer(), armed);
        assert_eq!(timers.next_deadline(), Some(t0 + Duration::from_secs(180)));

        assert!(!roster.arm_liveness(&session("/nobody"), t0, &mut timers));
    }

    #[test]
    fn test_departure_marks() {
        let mut roster = Roster::new("room");
        let mut timers = Scheduler::new();
        let mut outbox = Outbox::new();

        assert!(!roster.is_superseded(&alice(), 1));
        roster.mark_departed(&alice(), 6);
        roster.mark_departed(&alice(), 4);
        assert_eq!(roster.departed_at(&alice()), Some(6));
        assert!(roster.is_superseded(&alice(), 5));
        assert!(roster.is_superseded(&alice(), 6));
        assert!(!roster.is_superseded(&alice(), 7));

        roster.clear(0, &mut timers, &mut outbox);
        assert_eq!(roster.departed_at(&alice()), None);
    }

    proptest! {
        #[test]
        fn prop_session_added_at_most_once(names in prop::collection::vec("[a-c]", 1..20)) {
            let mut roster = Roster::new("room");
            let mut outbox = Outbox::new();
            roster.touch(&alice(), &mut outbox);

            for (ts, name) in names.iter().enumerate() {
                roster.update_nickname(&alice(), name, ts as i64, &mut outbox);
            }

            let events = outbox.take();
            let added = events.iter().filter(|e| matches!(e, RoomEvent::SessionAdded { .. })).count();
            let renamed = events.iter().filter(|e| matches!(e, RoomEvent::NicknameUpdated { .. })).count();
            let changes = names.windows(2).filter(|w| w[0] != w[1]).count();

            prop_assert_eq!(added, 1);
            prop_assert_eq!(renamed, changes);
        }

        #[test]
        fn prop_one_liveness_timer_per_session(ops in prop::collection::vec((0usize..4, 1u64..500), 1..40)) {
            let t0 = Instant::now();
            let ids: Vec<SessionId> = (0..4).map(|i| session(&format!("/p{}/a/b/c", i))).collect();
            let mut roster = Roster::new("room");
            let mut timers = Scheduler::new();
            let mut outbox = Outbox::new();

            for (index, offset) in ops {
                roster.touch(&ids[index], &mut outbox);
                roster.schedule_liveness(&ids[index], t0 + Duration::from_secs(offset), &mut timers);
            }

            prop_assert_eq!(timers.len(), roster.len());
            for s in roster.iter() {
                let timer = s.liveness_timer().unwrap();
                prop_assert!(timers.is_pending(timer));
            }
        }
    }
}
