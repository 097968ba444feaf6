//! # Parley
//!
//! Group chat presence over a digest-sync substrate.
//!
//! ## Overview
//!
//! Parley keeps a roster of who is in a chatroom without any central
//! coordinator. Peers publish JOIN, periodic HELLO and LEAVE messages,
//! learn about each other from sync-tree diffs, and evict anyone who stays
//! silent for three heartbeat intervals.
//!
//! - **Core**: names, session ids, diffs and the message envelope
//! - **Sync**: the transport seam, plus an in-memory network
//! - **Presence**: the roster and the join/hello/leave protocol
//! - **Engine**: a Tokio task that owns one room and serializes every input
//!
//! ## Usage
//!
//! ```rust,no_run
//! use parley::{ChatEngine, RoomConfig, RoomEvent};
//! use parley::sync::MemoryNetwork;
//!
//! async fn example() -> parley::Result<()> {
//!     let network = MemoryNetwork::new();
//!     let (engine, handle, mut events) =
//!         ChatEngine::connect(&network, RoomConfig::new("alice", "lobby")).await?;
//!     let task = engine.spawn();
//!
//!     // Chat is ignored until JOIN went out.
//!     while let Some(event) = events.recv().await {
//!         if matches!(event, RoomEvent::SessionAdded { .. }) {
//!             break;
//!         }
//!     }
//!
//!     handle.send_chat("hello", parley::presence::unix_now())?;
//!     while let Some(event) = events.recv().await {
//!         if let RoomEvent::ChatDisplayed { display_name, body, .. } = event {
//!             println!("{}: {}", display_name, body);
//!             break;
//!         }
//!     }
//!
//!     handle.shutdown();
//!     task.await.expect("engine task panicked")?;
//!     Ok(())
//! }
//! ```
//!
//! ## Re-exports
//!
//! - `parley::core` - Names, session ids and the message envelope
//! - `parley::sync` - Transport trait and in-memory network
//! - `parley::presence` - Roster, protocol and the synchronous room

pub mod engine;
pub mod error;

// Re-export component crates
pub use parley_core as core;
pub use parley_presence as presence;
pub use parley_sync as sync;

// Re-export main types for convenience
pub use engine::{ChatEngine, Command, EngineHandle, ResumeFlag};
pub use error::{EngineError, Result};

// Re-export commonly used types
pub use parley_core::{ChatMessage, MessageKind, Name, SessionId, SyncDiff};
pub use parley_presence::{ChatRoom, RemovalReason, RoomConfig, RoomEvent};
