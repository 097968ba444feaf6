//! Deadline queue for the room's timed work.
//!
//! The room never sleeps or spawns; it records deadlines here and whoever
//! drives it (the engine loop, or a test) calls `ChatRoom::advance` with the
//! current instant. Cancelling removes the entry outright, so a cancelled
//! timer can never fire.

use std::collections::{BTreeMap, HashMap};
use std::time::Instant;

use parley_core::SessionId;

/// Timed work of a chatroom.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TimerEvent {
    /// Publish JOIN after the initial delay.
    Join,
    /// Publish the next HELLO heartbeat.
    Hello,
    /// Evict a session that stayed silent for the liveness window.
    Liveness(SessionId),
}

/// Handle to a scheduled timer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TimerId(u64);

/// Ordered set of pending timers carrying an event of type `E`.
///
/// Timers sharing a deadline fire in scheduling order.
#[derive(Debug)]
pub struct Scheduler<E> {
    next_id: u64,
    queue: BTreeMap<(Instant, TimerId), E>,
    deadlines: HashMap<TimerId, Instant>,
}

impl<E> Scheduler<E> {
    /// Create an empty scheduler.
    pub fn new() -> Self {
        Self {
            next_id: 0,
            queue: BTreeMap::new(),
            deadlines: HashMap::new(),
        }
    }

    /// Schedule `event` to fire at `deadline`.
    pub fn schedule(&mut self, deadline: Instant, event: E) -> TimerId {
        let id = TimerId(self.next_id);
        self.next_id += 1;
        self.queue.insert((deadline, id), event);
        self.deadlines.insert(id, deadline);
        id
    }

    /// Cancel a pending timer. Returns false if it already fired or was
    /// cancelled.
    pub fn cancel(&mut self, id: TimerId) -> bool {
        match self.deadlines.remove(&id) {
            Some(deadline) => self.queue.remove(&(deadline, id)).is_some(),
            None => false,
        }
    }

    /// Cancel every pending timer, returning how many there were.
    pub fn cancel_all(&mut self) -> usize {
        let count = self.queue.len();
        self.queue.clear();
        self.deadlines.clear();
        count
    }

    /// Whether `id` is still pending.
    pub fn is_pending(&self, id: TimerId) -> bool {
        self.deadlines.contains_key(&id)
    }

    /// Earliest pending deadline.
    pub fn next_deadline(&self) -> Option<Instant> {
        self.queue.first_key_value().map(|((deadline, _), _)| *deadline)
    }

    /// Remove and return the earliest timer whose deadline is at or before
    /// `now`.
    pub fn pop_due(&mut self, now: Instant) -> Option<(TimerId, E)> {
        let (&(deadline, _), _) = self.queue.first_key_value()?;
        if deadline > now {
            return None;
        }
        let ((_, id), event) = self.queue.pop_first()?;
        self.deadlines.remove(&id);
        Some((id, event))
    }

    /// Number of pending timers.
    pub fn len(&self) -> usize {
        self.queue.len()
    }

    /// Whether nothing is pending.
    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }
}

impl<E> Default for Scheduler<E> {
    fn default() -> Self {
        Self::new()
    }
}
