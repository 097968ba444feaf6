//! The chat message envelope.
//!
//! Every payload a session publishes is one [`ChatMessage`]: either a control
//! message (JOIN, HELLO, LEAVE) or a chat line. The envelope is encoded as a
//! CBOR map with text keys:
//!
//! ```text
//! { "from": text, "to": text, "timestamp": int, "kind": text, ?"data": text }
//! ```
//!
//! Unknown `kind` values decode as [`MessageKind::Other`] so newer peers can
//! add control messages without breaking older ones.

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{CoreError, Result};

/// Discriminator for how a message affects presence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum MessageKind {
    /// A session announces itself.
    Join,
    /// Periodic heartbeat.
    Hello,
    /// A session departs.
    Leave,
    /// A chat line carrying text in `data`.
    Chat,
    /// Anything this version does not understand.
    #[serde(other)]
    Other,
}

impl MessageKind {
    /// Whether this kind only carries presence information.
    pub fn is_control(self) -> bool {
        matches!(self, Self::Join | Self::Hello | Self::Leave)
    }
}

impl fmt::Display for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Join => "JOIN",
            Self::Hello => "HELLO",
            Self::Leave => "LEAVE",
            Self::Chat => "CHAT",
            Self::Other => "OTHER",
        };
        f.write_str(label)
    }
}

/// An immutable chat envelope.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    from: String,
    to: String,
    timestamp: i64,
    kind: MessageKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    data: Option<String>,
}

impl ChatMessage {
    /// Create a message from all of its parts.
    pub fn new(
        kind: MessageKind,
        from: impl Into<String>,
        to: impl Into<String>,
        timestamp: i64,
        data: Option<String>,
    ) -> Self {
        Self {
            from: from.into(),
            to: to.into(),
            timestamp,
            kind,
            data,
        }
    }

    /// A control message without body.
    pub fn control(
        kind: MessageKind,
        from: impl Into<String>,
        to: impl Into<String>,
        timestamp: i64,
    ) -> Self {
        Self::new(kind, from, to, timestamp, None)
    }

    /// A chat line.
    pub fn chat(
        from: impl Into<String>,
        to: impl Into<String>,
        text: impl Into<String>,
        timestamp: i64,
    ) -> Self {
        Self::new(MessageKind::Chat, from, to, timestamp, Some(text.into()))
    }

    /// Nickname of the sender.
    pub fn from(&self) -> &str {
        &self.from
    }

    /// Chatroom the message is addressed to.
    pub fn to(&self) -> &str {
        &self.to
    }

    /// Unix timestamp in seconds, as stamped by the sender.
    pub fn timestamp(&self) -> i64 {
        self.timestamp
    }

    /// Message kind.
    pub fn kind(&self) -> MessageKind {
        self.kind
    }

    /// Body text, empty for control messages.
    pub fn data(&self) -> &str {
        self.data.as_deref().unwrap_or_default()
    }

    /// Encode to CBOR.
    pub fn encode(&self) -> Result<Bytes> {
        let mut buf = Vec::new();
        ciborium::into_writer(self, &mut buf).map_err(|e| CoreError::Encode(e.to_string()))?;
        Ok(Bytes::from(buf))
    }

    /// Decode from CBOR.
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        ciborium::from_reader(bytes).map_err(|e| CoreError::Decode(e.to_string()))
    }
}
