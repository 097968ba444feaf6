//! # Parley Sync
//!
//! The seam between the presence engine and the digest-sync substrate.
//!
//! ## Overview
//!
//! The substrate publishes opaque payloads under a session prefix, tells
//! every other participant which sessions produced new sequence numbers, and
//! resolves fetches by session and sequence number. This crate defines that
//! contract as the [`Transport`] trait and ships two in-process
//! implementations:
//!
//! - [`RecordingTransport`] - records publishes and fetch requests; tests
//!   resolve fetches by hand
//! - [`MemoryNetwork`] / [`MemoryTransport`] - an in-memory multicast group
//!   that delivers diffs and resolves fetches asynchronously
//!
//! ## Event Flow
//!
//! ```text
//! Engine                      Transport
//!   |-------- publish ---------->|
//!   |<------- SyncUpdate --------|   (another peer published)
//!   |-------- fetch ------------>|
//!   |<------- FetchCompleted ----|   (payload + validation, or failure)
//! ```
//!
//! Completions are posted as [`TransportEvent`]s into the engine's queue; the
//! transport never calls back into engine state.

pub mod error;
pub mod fetch;
pub mod transport;
pub mod validator;

pub use error::{Result, SyncError};
pub use fetch::{FetchCompletion, FetchOutcome, FetchRequest, Validation};
pub use transport::{
    memory::MemoryNetwork, memory::MemoryTransport, recording::Published,
    recording::RecordingTransport, Transport, TransportEvent,
};
pub use validator::{AcceptAll, PrefixValidator, RejectAll, Validator};
