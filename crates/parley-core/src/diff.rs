//! Sync-tree diffs.

use serde::{Deserialize, Serialize};

use crate::types::{SeqNo, SessionId};

/// A contiguous range of sequence numbers a session produced since the
/// previous sync round. Inclusive on both ends.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncDiff {
    /// The session that produced new data.
    pub session: SessionId,
    /// First new sequence number.
    pub low: SeqNo,
    /// Last new sequence number.
    pub high: SeqNo,
}

impl SyncDiff {
    /// Create a diff covering `low..=high`.
    pub fn new(session: SessionId, low: SeqNo, high: SeqNo) -> Self {
        Self { session, low, high }
    }

    /// A diff announcing exactly one new sequence number.
    pub fn single(session: SessionId, seq: SeqNo) -> Self {
        Self::new(session, seq, seq)
    }

    /// Distance between the ends of the range (`high - low`).
    ///
    /// Zero for a single sequence number and for malformed ranges.
    pub fn gap(&self) -> u64 {
        self.high.saturating_sub(self.low)
    }

    /// Whether `low <= high`.
    pub fn is_well_formed(&self) -> bool {
        self.low <= self.high
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::name::Name;

    fn session() -> SessionId {
        SessionId::new(Name::parse("/peer/b").unwrap())
    }

    #[test]
    fn test_gap() {
        assert_eq!(SyncDiff::new(session(), 5, 9).gap(), 4);
        assert_eq!(SyncDiff::single(session(), 7).gap(), 0);
    }

    #[test]
    fn test_malformed_range() {
        let diff = SyncDiff::new(session(), 9, 5);
        assert!(!diff.is_well_formed());
        assert_eq!(diff.gap(), 0);
    }
}
