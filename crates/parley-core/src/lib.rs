//! # Parley Core
//!
//! Pure primitives shared by every Parley crate: hierarchical names, session
//! identifiers, sync-tree diffs and the chat message envelope.
//!
//! This crate contains no I/O, no timers and no networking.
//!
//! ## Key Types
//!
//! - [`Name`] - Hierarchical path used for prefixes and session identifiers
//! - [`SessionId`] - Stable identifier of one participant session
//! - [`SyncDiff`] - Range of new sequence numbers produced by a session
//! - [`RootDigest`] - Opaque snapshot of the sync tree, for display only
//! - [`ChatMessage`] - Control/content envelope exchanged between peers
//!
//! ## Wire Format
//!
//! Chat messages are encoded as CBOR maps. See [`message`] module.

pub mod diff;
pub mod error;
pub mod message;
pub mod name;
pub mod types;

pub use diff::SyncDiff;
pub use error::{CoreError, Result};
pub use message::{ChatMessage, MessageKind};
pub use name::{Name, ROUTING_HINT_SEPARATOR};
pub use types::{RootDigest, SeqNo, SessionId};
