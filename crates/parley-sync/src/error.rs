//! Error types for the sync module.

use thiserror::Error;

/// Errors that can occur at the transport seam.
#[derive(Debug, Error)]
pub enum SyncError {
    /// Transport-level error.
    #[error("transport error: {0}")]
    TransportError(String),

    /// Publish attempted before a local session was assigned.
    #[error("transport has no local session")]
    NotInitialized,
}

/// Result type for sync operations.
pub type Result<T> = std::result::Result<T, SyncError>;
