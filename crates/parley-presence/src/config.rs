//! Chatroom configuration.
//!
//! A [`RoomConfig`] can be built in code or loaded from TOML. Every field has
//! a default, so a file only needs to name what it changes:
//!
//! ```toml
//! nickname = "alice"
//! chatroom = "rust"
//! heartbeat_interval_secs = 30
//!
//! [fetch]
//! bulk_threshold = 5
//! ```

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use parley_core::Name;

use crate::error::{PresenceError, Result};
use crate::sync_update::FetchPolicy;

/// Component separating an identity from the chatroom it publishes into.
pub const CHAT_DATA_COMPONENT: &str = "CHRONOCHAT-CHATDATA";

/// Longest accepted heartbeat interval, in seconds.
pub const MAX_HEARTBEAT_INTERVAL_SECS: u64 = 24 * 60 * 60;

/// Largest accepted liveness multiplier.
pub const MAX_LIVENESS_MULTIPLIER: u32 = 100;

/// Longest accepted join delay or shutdown grace, in milliseconds.
pub const MAX_DELAY_MS: u64 = 60 * 60 * 1000;

/// Configuration for one chatroom.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RoomConfig {
    /// Display name announced to other sessions.
    pub nickname: String,
    /// Chatroom name, carried in the `to` field of every message.
    pub chatroom: String,
    /// Broadcast prefix of the chatroom's sync group, handed to the transport
    /// when a session starts. Derived from the chatroom name when unset.
    pub chatroom_prefix: Option<Name>,
    /// Prefix this peer publishes chat data under. Derived from the nickname
    /// and chatroom when unset.
    pub user_chat_prefix: Option<Name>,
    /// Routing prefix the local network can reach this peer by.
    pub routing_prefix: Name,
    /// Seconds between HELLO heartbeats (default: 60).
    pub heartbeat_interval_secs: u64,
    /// Liveness window as a multiple of the heartbeat interval (default: 3).
    pub liveness_multiplier: u32,
    /// Delay between starting a session and publishing JOIN (default: 600).
    pub join_delay_ms: u64,
    /// Freshness period attached to published payloads (default: 60).
    pub freshness_secs: u64,
    /// Grace period after the final LEAVE before the engine exits
    /// (default: 100).
    pub shutdown_grace_ms: u64,
    /// Fetch fan-out policy.
    pub fetch: FetchPolicy,
}

impl Default for RoomConfig {
    fn default() -> Self {
        Self {
            nickname: "anonymous".to_string(),
            chatroom: "lobby".to_string(),
            chatroom_prefix: None,
            user_chat_prefix: None,
            routing_prefix: Name::empty(),
            heartbeat_interval_secs: 60,
            liveness_multiplier: 3,
            join_delay_ms: 600,
            freshness_secs: 60,
            shutdown_grace_ms: 100,
            fetch: FetchPolicy::default(),
        }
    }
}

impl RoomConfig {
    /// Default configuration for `nickname` in `chatroom`.
    pub fn new(nickname: impl Into<String>, chatroom: impl Into<String>) -> Self {
        Self {
            nickname: nickname.into(),
            chatroom: chatroom.into(),
            ..Self::default()
        }
    }

    /// Set the routing prefix.
    pub fn with_routing_prefix(mut self, prefix: Name) -> Self {
        self.routing_prefix = prefix;
        self
    }

    /// Set the sync group prefix explicitly.
    pub fn with_chatroom_prefix(mut self, prefix: Name) -> Self {
        self.chatroom_prefix = Some(prefix);
        self
    }

    /// Set the user chat prefix explicitly.
    pub fn with_user_chat_prefix(mut self, prefix: Name) -> Self {
        self.user_chat_prefix = Some(prefix);
        self
    }

    /// Parse a configuration from TOML text and validate it.
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let config: Self =
            toml::from_str(text).map_err(|e| PresenceError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Load a configuration from a TOML file and validate it.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path.as_ref())?;
        Self::from_toml_str(&text)
    }

    /// Reject values the room cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.nickname.is_empty() {
            return Err(PresenceError::Config("nickname must not be empty".into()));
        }
        if self.chatroom.is_empty() {
            return Err(PresenceError::Config("chatroom must not be empty".into()));
        }
        if self.heartbeat_interval_secs == 0 {
            return Err(PresenceError::Config(
                "heartbeat_interval_secs must be positive".into(),
            ));
        }
        if self.heartbeat_interval_secs > MAX_HEARTBEAT_INTERVAL_SECS {
            return Err(PresenceError::Config(format!(
                "heartbeat_interval_secs must be at most {}",
                MAX_HEARTBEAT_INTERVAL_SECS
            )));
        }
        if self.liveness_multiplier == 0 {
            return Err(PresenceError::Config(
                "liveness_multiplier must be positive".into(),
            ));
        }
        if self.liveness_multiplier > MAX_LIVENESS_MULTIPLIER {
            return Err(PresenceError::Config(format!(
                "liveness_multiplier must be at most {}",
                MAX_LIVENESS_MULTIPLIER
            )));
        }
        if self.join_delay_ms > MAX_DELAY_MS || self.shutdown_grace_ms > MAX_DELAY_MS {
            return Err(PresenceError::Config(format!(
                "join_delay_ms and shutdown_grace_ms must be at most {}",
                MAX_DELAY_MS
            )));
        }
        if self.fetch.bulk_threshold == 0 {
            return Err(PresenceError::Config(
                "fetch.bulk_threshold must be positive".into(),
            ));
        }
        if self.fetch.retry_budget == 0 {
            return Err(PresenceError::Config(
                "fetch.retry_budget must be positive".into(),
            ));
        }
        Ok(())
    }

    /// Broadcast prefix of the chatroom.
    pub fn chatroom_prefix(&self) -> Name {
        match &self.chatroom_prefix {
            Some(prefix) => prefix.clone(),
            None => Name::empty()
                .append("ndn")
                .append("broadcast")
                .append("ChronoChat")
                .append(self.chatroom.as_str()),
        }
    }

    /// Prefix this peer publishes chat data under, before routing.
    pub fn user_chat_prefix(&self) -> Name {
        match &self.user_chat_prefix {
            Some(prefix) => prefix.clone(),
            None => Name::empty()
                .append("parley")
                .append(self.nickname.as_str())
                .append(CHAT_DATA_COMPONENT)
                .append(self.chatroom.as_str()),
        }
    }

    /// Interval between HELLO heartbeats.
    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_secs(self.heartbeat_interval_secs)
    }

    /// How long a session may stay silent before it is evicted.
    pub fn liveness_window(&self) -> Duration {
        self.heartbeat_interval()
            .saturating_mul(self.liveness_multiplier)
    }

    /// Delay before JOIN is published.
    pub fn join_delay(&self) -> Duration {
        Duration::from_millis(self.join_delay_ms)
    }

    /// Freshness period for published payloads.
    pub fn freshness(&self) -> Duration {
        Duration::from_secs(self.freshness_secs)
    }

    /// Grace period after the final LEAVE.
    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_millis(self.shutdown_grace_ms)
    }
}
