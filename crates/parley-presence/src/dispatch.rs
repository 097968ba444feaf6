//! Routing of fetched payloads into roster updates and chat events.

use std::time::Instant;

use tracing::{debug, info};

use parley_core::{ChatMessage, MessageKind, SessionId};
use parley_sync::{Transport, Validation};

use crate::events::{RemovalReason, RoomEvent};
use crate::room::ChatRoom;

/// Appended to the sender's nickname when a chat payload failed validation.
pub const UNVERIFIED_SUFFIX: &str = " (Unverified)";

/// What dispatching one payload did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// A non-LEAVE message refreshed the sender's presence.
    Applied(MessageKind),
    /// A LEAVE removed the sender from the roster.
    Departed,
    /// A LEAVE from a session the roster does not know.
    IgnoredLeave,
    /// The payload did not decode; nothing changed.
    Unparseable,
}

/// The name a chat line is shown under.
pub fn display_name(nickname: &str, validation: Validation) -> String {
    match validation {
        Validation::Validated => nickname.to_string(),
        Validation::Unvalidated => format!("{}{}", nickname, UNVERIFIED_SUFFIX),
    }
}

impl<T: Transport> ChatRoom<T> {
    /// Apply one payload fetched from `sender`.
    pub fn dispatch(
        &mut self,
        payload: &[u8],
        sender: &SessionId,
        validation: Validation,
        now: Instant,
    ) -> DispatchOutcome {
        let message = match ChatMessage::decode(payload) {
            Ok(message) => message,
            Err(e) => {
                debug!(session = %sender, error = %e, "dropping unparseable payload");
                return DispatchOutcome::Unparseable;
            }
        };

        if message.kind() == MessageKind::Leave {
            let removed = self.roster.remove(
                sender,
                RemovalReason::Leave,
                Some(message.from()),
                message.timestamp(),
                &mut self.timers,
                &mut self.outbox,
            );
            return if removed {
                info!(session = %sender, nickname = message.from(), "peer left");
                DispatchOutcome::Departed
            } else {
                DispatchOutcome::IgnoredLeave
            };
        }

        // A completion can outlive its session's eviction; the payload is
        // fresh activity, so the session comes back.
        let (_, inserted) = self.roster.touch(sender, &mut self.outbox);
        if inserted {
            debug!(session = %sender, "payload revived an evicted session");
        }

        self.roster
            .update_nickname(sender, message.from(), message.timestamp(), &mut self.outbox);

        let deadline = now + self.config.liveness_window();
        let scheduled = self
            .roster
            .schedule_liveness(sender, deadline, &mut self.timers);
        debug_assert!(scheduled, "session missing right after nickname update");

        if message.kind() == MessageKind::Chat {
            self.outbox.push(RoomEvent::ChatDisplayed {
                display_name: display_name(message.from(), validation),
                body: message.data().to_string(),
                timestamp: message.timestamp(),
                verified: validation.is_validated(),
            });
        }

        self.outbox.push(RoomEvent::PeerActivity {
            session: sender.clone(),
        });
        DispatchOutcome::Applied(message.kind())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{encode, joined_room, peer};
    use parley_core::Name;
    use std::time::Duration;

    #[test]
    fn test_display_name() {
        assert_eq!(display_name("bob", Validation::Validated), "bob");
        assert_eq!(
            display_name("bob", Validation::Unvalidated),
            "bob (Unverified)"
        );
    }

    #[test]
    fn test_unparseable_payload_changes_nothing() {
        let t0 = Instant::now();
        let mut room = joined_room(t0);
        let bob = peer("bob");

        let outcome = room.dispatch(b"\xff\x00garbage", &bob, Validation::Validated, t0);
        assert_eq!(outcome, DispatchOutcome::Unparseable);
        assert!(room.take_events().is_empty());
        assert!(room.roster().is_empty());
    }

    #[test]
    fn test_chat_adds_session_then_displays() {
        let t0 = Instant::now();
        let mut room = joined_room(t0);
        let bob = peer("bob");

        let payload = encode(&ChatMessage::chat("B", "room", "hi", 1));
        let outcome = room.dispatch(&payload, &bob, Validation::Validated, t0);
        assert_eq!(outcome, DispatchOutcome::Applied(MessageKind::Chat));

        let events = room.take_events();
        assert_eq!(
            events,
            vec![
                RoomEvent::SessionDiscovered {
                    session: bob.clone()
                },
                RoomEvent::SessionAdded {
                    session: bob.clone(),
                    nickname: "B".into(),
                    timestamp: 1,
                },
                RoomEvent::IdentityJoined {
                    identity: Name::parse("/parley/bob").unwrap(),
                    chatroom: "room".into(),
                },
                RoomEvent::ChatDisplayed {
                    display_name: "B".into(),
                    body: "hi".into(),
                    timestamp: 1,
                    verified: true,
                },
                RoomEvent::PeerActivity { session: bob.clone() },
            ]
        );
        assert!(room.roster().get(&bob).unwrap().has_nickname());
    }

    #[test]
    fn test_unvalidated_chat_is_tagged_not_dropped() {
        let t0 = Instant::now();
        let mut room = joined_room(t0);
        let bob = peer("bob");

        let payload = encode(&ChatMessage::chat("B", "room", "psst", 7));
        room.dispatch(&payload, &bob, Validation::Unvalidated, t0);

        let shown: Vec<_> = room
            .take_events()
            .into_iter()
            .filter_map(|e| match e {
                RoomEvent::ChatDisplayed {
                    display_name,
                    verified,
                    ..
                } => Some((display_name, verified)),
                _ => None,
            })
            .collect();
        assert_eq!(shown, vec![("B (Unverified)".to_string(), false)]);
    }

    #[test]
    fn test_control_messages_refresh_liveness() {
        let t0 = Instant::now();
        let mut room = joined_room(t0);
        let bob = peer("bob");

        let hello = encode(&ChatMessage::control(MessageKind::Hello, "B", "room", 1));
        room.dispatch(&hello, &bob, Validation::Validated, t0);
        let first = room.roster().get(&bob).unwrap().liveness_timer().unwrap();

        let later = t0 + Duration::from_secs(100);
        let outcome = room.dispatch(&hello, &bob, Validation::Validated, later);
        assert_eq!(outcome, DispatchOutcome::Applied(MessageKind::Hello));
        let second = room.roster().get(&bob).unwrap().liveness_timer().unwrap();
        assert_ne!(first, second);

        // The superseded deadline passes without eviction.
        room.advance(t0 + Duration::from_secs(200));
        assert!(room.roster().contains(&bob));

        room.advance(later + Duration::from_secs(180));
        assert!(!room.roster().contains(&bob));
    }

    #[test]
    fn test_leave_removes_known_session() {
        let t0 = Instant::now();
        let mut room = joined_room(t0);
        let bob = peer("bob");

        let hello = encode(&ChatMessage::control(MessageKind::Hello, "B", "room", 1));
        room.dispatch(&hello, &bob, Validation::Validated, t0);
        room.take_events();

        let leave = encode(&ChatMessage::control(MessageKind::Leave, "B", "room", 9));
        let outcome = room.dispatch(&leave, &bob, Validation::Validated, t0);
        assert_eq!(outcome, DispatchOutcome::Departed);
        assert!(room.roster().is_empty());

        let events = room.take_events();
        assert_eq!(
            events[0],
            RoomEvent::SessionRemoved {
                session: bob.clone(),
                nickname: Some("B".into()),
                timestamp: 9,
                reason: RemovalReason::Leave,
            }
        );

        // No timer is left behind for the departed session.
        room.advance(t0 + Duration::from_secs(1000));
        assert!(!room
            .take_events()
            .iter()
            .any(|e| matches!(e, RoomEvent::SessionRemoved { .. })));
    }

    #[test]
    fn test_leave_from_unknown_session_is_ignored() {
        let t0 = Instant::now();
        let mut room = joined_room(t0);
        room.take_events();

        let leave = encode(&ChatMessage::control(MessageKind::Leave, "Z", "room", 9));
        let outcome = room.dispatch(&leave, &peer("zed"), Validation::Validated, t0);
        assert_eq!(outcome, DispatchOutcome::IgnoredLeave);
        assert!(room.take_events().is_empty());
    }

    #[test]
    fn test_unknown_kind_still_counts_as_activity() {
        let t0 = Instant::now();
        let mut room = joined_room(t0);
        let bob = peer("bob");

        let other = encode(&ChatMessage::control(MessageKind::Other, "B", "room", 3));
        let outcome = room.dispatch(&other, &bob, Validation::Validated, t0);
        assert_eq!(outcome, DispatchOutcome::Applied(MessageKind::Other));
        assert!(room.roster().get(&bob).unwrap().liveness_timer().is_some());
        assert!(!room
            .take_events()
            .iter()
            .any(|e| matches!(e, RoomEvent::ChatDisplayed { .. })));
    }
}
