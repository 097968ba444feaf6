//! Strong type definitions for Parley.
//!
//! Identifiers are newtypes so a session id can never be confused with an
//! arbitrary routing prefix.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::name::Name;

/// Sequence number of one published message within a session.
pub type SeqNo = u64;

/// Stable identifier of one participant session (the peer's session prefix).
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SessionId(Name);

impl SessionId {
    /// Wrap a session prefix.
    pub fn new(name: Name) -> Self {
        Self(name)
    }

    /// The underlying session prefix.
    pub fn name(&self) -> &Name {
        &self.0
    }

    /// The identity a session belongs to: its prefix without the trailing
    /// `offset` components.
    pub fn identity(&self, offset: usize) -> Name {
        self.0.trim(offset)
    }
}

impl From<Name> for SessionId {
    fn from(name: Name) -> Self {
        Self(name)
    }
}

impl fmt::Debug for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SessionId({})", self.0)
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

/// A 32-byte opaque snapshot of the sync tree.
///
/// The presence engine never interprets it; it is surfaced to observers for
/// display and debugging.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RootDigest(pub [u8; 32]);

impl RootDigest {
    /// Create from raw bytes.
    pub const fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Get the raw bytes.
    pub const fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Render as 64 lowercase hex characters.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// The digest of an empty tree.
    pub const ZERO: Self = Self([0u8; 32]);
}

impl Default for RootDigest {
    fn default() -> Self {
        Self::ZERO
    }
}

impl fmt::Debug for RootDigest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RootDigest({})", &self.to_hex()[..16])
    }
}

impl fmt::Display for RootDigest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl From<[u8; 32]> for RootDigest {
    fn from(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }
}
