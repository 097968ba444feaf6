//! # Parley Testkit
//!
//! Testing utilities for Parley.
//!
//! ## Overview
//!
//! This crate provides:
//!
//! - **Fixtures**: remote peers and a room over a recording transport with a
//!   controllable clock
//! - **Generators**: Proptest strategies for names, sessions, diffs and
//!   messages
//!
//! ## Property Testing
//!
//! ```rust,ignore
//! use proptest::prelude::*;
//! use parley_testkit::generators::{message_from_params, MessageParams};
//!
//! proptest! {
//!     #[test]
//!     fn encoding_is_deterministic(params: MessageParams) {
//!         let message = message_from_params(&params);
//!         prop_assert_eq!(message.encode().unwrap(), message.encode().unwrap());
//!     }
//! }
//! ```
//!
//! ## Test Fixtures
//!
//! ```rust
//! use parley_testkit::fixtures::{PeerFixture, RoomFixture};
//! use parley_sync::Validation;
//!
//! let mut fixture = RoomFixture::joined();
//! let bob = PeerFixture::new("bob");
//! fixture.deliver(&bob, 1, &bob.chat("hi", 1), Validation::Validated);
//! assert!(fixture.room.roster().contains(&bob.session));
//! ```

pub mod fixtures;
pub mod generators;

pub use fixtures::{multi_peer_fixtures, PeerFixture, RoomFixture};
