//! # Parley Presence
//!
//! Session presence and message dissemination for one chatroom.
//!
//! ## Overview
//!
//! Peers converge on "who is present" using only sync-tree diffs and
//! periodic heartbeats. A [`ChatRoom`] turns those inputs into roster
//! changes and observer events:
//!
//! - **Diffs** touch the [`Roster`] and issue fetches according to the
//!   [`FetchPolicy`]; one `TreeUpdated` event per diff is raised right away
//! - **Fetched payloads** are dispatched: LEAVE removes the sender, anything
//!   else refreshes its nickname and liveness window, CHAT is displayed
//! - **Timers** publish JOIN and HELLO and evict silent sessions
//!
//! ## Driving a room
//!
//! The room is a synchronous state machine. It takes the current
//! [`std::time::Instant`] as an argument and reports when it next needs
//! attention:
//!
//! ```rust
//! use std::time::Instant;
//! use parley_presence::{ChatRoom, RoomConfig};
//! use parley_sync::RecordingTransport;
//!
//! let mut room = ChatRoom::new(RoomConfig::new("alice", "lobby"), RecordingTransport::new())?;
//! let now = Instant::now();
//! room.initialize_sync(now);
//!
//! if let Some(deadline) = room.next_deadline() {
//!     room.advance(deadline);
//! }
//! assert!(room.is_joined());
//!
//! for event in room.take_events() {
//!     println!("{:?}", event);
//! }
//! # Ok::<(), parley_presence::PresenceError>(())
//! ```
//!
//! The `parley` crate wraps a room in a Tokio task that does this driving.

pub mod clock;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod events;
pub mod protocol;
pub mod room;
pub mod roster;
pub mod scheduler;
pub mod sync_update;

#[cfg(test)]
mod testing;

pub use clock::SequenceClock;
pub use config::RoomConfig;
pub use dispatch::{display_name, DispatchOutcome, UNVERIFIED_SUFFIX};
pub use error::{PresenceError, Result};
pub use events::{Outbox, RemovalReason, RoomEvent};
pub use protocol::PresenceState;
pub use room::{unix_now, ChatRoom};
pub use roster::{NicknameChange, Roster, Session, IDENTITY_OFFSET};
pub use scheduler::{Scheduler, TimerEvent, TimerId};
pub use sync_update::{FetchPlan, FetchPolicy};
