//! Shared helpers for unit tests.

use std::time::Instant;

use bytes::Bytes;

use parley_core::{ChatMessage, MessageKind, Name, SessionId};
use parley_sync::RecordingTransport;

use crate::config::RoomConfig;
use crate::room::ChatRoom;

/// Wall-clock reading every test room reports.
pub const T0_WALL: i64 = 1_700_000_000;

fn fixed_wall_clock() -> i64 {
    T0_WALL
}

pub fn config() -> RoomConfig {
    RoomConfig::new("alice", "room")
}

/// A room over a recording transport, not yet initialized.
pub fn room() -> ChatRoom<RecordingTransport> {
    ChatRoom::new(config(), RecordingTransport::new())
        .unwrap()
        .with_wall_clock(fixed_wall_clock)
}

/// A room that joined at `t0`, with its events drained.
pub fn joined_room(t0: Instant) -> ChatRoom<RecordingTransport> {
    let mut room = room();
    room.initialize_sync(t0);
    assert!(room.send_join(t0));
    room.take_events();
    room
}

/// Session id of a remote peer in the same chatroom.
pub fn peer(nickname: &str) -> SessionId {
    SessionId::new(
        Name::parse(&format!("/parley/{}/CHRONOCHAT-CHATDATA/room/4242", nickname)).unwrap(),
    )
}

pub fn encode(message: &ChatMessage) -> Bytes {
    message.encode().unwrap()
}

/// Kinds of everything the room published, oldest first.
pub fn published_kinds(room: &ChatRoom<RecordingTransport>) -> Vec<MessageKind> {
    room.transport()
        .published_messages()
        .iter()
        .map(ChatMessage::kind)
        .collect()
}
