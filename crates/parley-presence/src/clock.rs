//! The local session's sequence clock.

use parley_core::SeqNo;

/// Hands out sequence numbers for outbound publishes.
///
/// The first number issued is 1. A clock lives exactly as long as one local
/// session; restarting the room starts a fresh one.
#[derive(Debug, Default, Clone)]
pub struct SequenceClock {
    last: SeqNo,
}

impl SequenceClock {
    /// Create a clock that has issued nothing yet.
    pub fn new() -> Self {
        Self::default()
    }

    /// Issue the next sequence number.
    pub fn next(&mut self) -> SeqNo {
        self.last += 1;
        self.last
    }

    /// The last issued sequence number.
    pub fn current(&self) -> Option<SeqNo> {
        (self.last > 0).then_some(self.last)
    }

    /// The number `next` would return.
    pub fn peek(&self) -> SeqNo {
        self.last + 1
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_starts_at_one() {
        let mut clock = SequenceClock::new();
        assert_eq!(clock.current(), None);
        assert_eq!(clock.peek(), 1);
        assert_eq!(clock.next(), 1);
        assert_eq!(clock.current(), Some(1));
    }

    #[test]
    fn test_strictly_increasing() {
        let mut clock = SequenceClock::new();
        let issued: Vec<_> = (0..100).map(|_| clock.next()).collect();
        assert!(issued.windows(2).all(|w| w[0] < w[1]));
    }
}
