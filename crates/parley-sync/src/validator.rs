//! Validation of fetched payloads.
//!
//! Real signature checking lives outside Parley; the engine only consumes the
//! validated/unvalidated verdict.

use async_trait::async_trait;
use bytes::Bytes;

use parley_core::{Name, SeqNo, SessionId};

use crate::fetch::Validation;

/// Resolves whether a fetched payload is trustworthy.
///
/// Implementations must be thread-safe (Send + Sync).
#[async_trait]
pub trait Validator: Send + Sync {
    /// Validate the payload `session` published at `seq`.
    async fn validate(&self, session: &SessionId, seq: SeqNo, payload: &Bytes) -> Validation;
}

/// Marks every payload validated.
#[derive(Debug, Clone, Copy, Default)]
pub struct AcceptAll;

#[async_trait]
impl Validator for AcceptAll {
    async fn validate(&self, _session: &SessionId, _seq: SeqNo, _payload: &Bytes) -> Validation {
        Validation::Validated
    }
}

/// Marks every payload unvalidated (no trust anchor loaded).
#[derive(Debug, Clone, Copy, Default)]
pub struct RejectAll;

#[async_trait]
impl Validator for RejectAll {
    async fn validate(&self, _session: &SessionId, _seq: SeqNo, _payload: &Bytes) -> Validation {
        Validation::Unvalidated
    }
}

/// Validates sessions published under one of a set of trusted prefixes.
#[derive(Debug, Clone, Default)]
pub struct PrefixValidator {
    trusted: Vec<Name>,
}

impl PrefixValidator {
    /// Create a validator trusting the given prefixes.
    pub fn new(trusted: Vec<Name>) -> Self {
        Self { trusted }
    }

    /// Trust one more prefix.
    pub fn trust(mut self, prefix: Name) -> Self {
        self.trusted.push(prefix);
        self
    }
}

#[async_trait]
impl Validator for PrefixValidator {
    async fn validate(&self, session: &SessionId, _seq: SeqNo, _payload: &Bytes) -> Validation {
        let trusted = self
            .trusted
            .iter()
            .any(|prefix| prefix.is_prefix_of(session.name()));
        Validation::from(trusted)
    }
}
