//! Error types for the presence engine.

use thiserror::Error;

/// Errors that can occur while configuring or driving a chatroom.
///
/// Runtime faults (undecodable payloads, failed fetches, unknown sessions)
/// are contained and logged; they never surface here.
#[derive(Debug, Error)]
pub enum PresenceError {
    /// Configuration is unusable.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// Configuration file could not be read.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for presence operations.
pub type Result<T> = std::result::Result<T, PresenceError>;
