//! Error types for Parley Core.

use thiserror::Error;

/// Errors that can occur while building or decoding core values.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("decoding error: {0}")]
    Decode(String),

    #[error("encoding error: {0}")]
    Encode(String),

    #[error("invalid name: {0}")]
    InvalidName(String),
}

/// Result type for core operations.
pub type Result<T> = std::result::Result<T, CoreError>;
