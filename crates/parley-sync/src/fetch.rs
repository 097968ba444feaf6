//! Fetch requests and their completions.

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use parley_core::{SeqNo, SessionId};

/// Request for the payload a session published at one sequence number.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FetchRequest {
    /// Session that published the payload.
    pub session: SessionId,
    /// Sequence number within that session.
    pub seq: SeqNo,
    /// Attempts the transport may make before reporting failure.
    pub retry_budget: u32,
    /// Room epoch the request was issued in. Completions from an older epoch
    /// are discarded by the room.
    pub epoch: u64,
}

/// Outcome of signature validation on a fetched payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Validation {
    /// Signature checked out against a trust anchor.
    Validated,
    /// Payload could not be validated. Still delivered, but tagged.
    Unvalidated,
}

impl Validation {
    /// Whether the payload was validated.
    pub fn is_validated(self) -> bool {
        matches!(self, Validation::Validated)
    }
}

impl From<bool> for Validation {
    fn from(validated: bool) -> Self {
        if validated {
            Validation::Validated
        } else {
            Validation::Unvalidated
        }
    }
}

/// What the transport learned about a fetch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchOutcome {
    /// Payload retrieved and run through the validator.
    Fetched {
        payload: Bytes,
        validation: Validation,
    },
    /// Retry budget exhausted.
    Failed { reason: String },
}

/// A resolved fetch, posted back into the engine queue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchCompletion {
    /// The request this completes.
    pub request: FetchRequest,
    /// What happened.
    pub outcome: FetchOutcome,
}

impl FetchCompletion {
    /// A completion carrying a payload.
    pub fn fetched(request: FetchRequest, payload: Bytes, validation: Validation) -> Self {
        Self {
            request,
            outcome: FetchOutcome::Fetched {
                payload,
                validation,
            },
        }
    }

    /// A completion reporting failure.
    pub fn failed(request: FetchRequest, reason: impl Into<String>) -> Self {
        Self {
            request,
            outcome: FetchOutcome::Failed {
                reason: reason.into(),
            },
        }
    }
}
