//! Error types for the chat engine.

use parley_presence::PresenceError;
use thiserror::Error;

/// Errors that can occur while creating or talking to an engine.
#[derive(Debug, Error)]
pub enum EngineError {
    /// The engine task has exited; commands can no longer be delivered.
    #[error("engine stopped")]
    Stopped,

    /// Room error.
    #[error("presence error: {0}")]
    Presence(#[from] PresenceError),
}

/// Result type for engine operations.
pub type Result<T> = std::result::Result<T, EngineError>;
