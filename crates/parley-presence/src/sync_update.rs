//! Processing of sync-tree diffs and fetch completions.
//!
//! A diff batch is handled synchronously: every diff touches the roster,
//! issues its fetches and yields one `TreeUpdated` event before the call
//! returns. Fetches complete later and come back through
//! [`ChatRoom::on_fetch_completed`], which drops completions from an earlier
//! epoch and payloads that predate their session's LEAVE.
//!
//! Completions may arrive in any order. A session known only from a diff gets
//! a liveness timer when one of its fetches fails, so it is evicted if nothing
//! from it ever arrives.

use std::ops::RangeInclusive;
use std::time::Instant;

use serde::{Deserialize, Serialize};

use parley_core::{SeqNo, SyncDiff};
use parley_sync::{FetchCompletion, FetchOutcome, FetchRequest, Transport};

use crate::dispatch::DispatchOutcome;
use crate::events::RoomEvent;
use crate::room::ChatRoom;

/// How many payloads to fetch for a diff.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FetchPolicy {
    /// Diffs whose `high - low` reaches this value fetch only `high`
    /// (default: 3).
    pub bulk_threshold: u64,
    /// Attempts per fetch before the transport gives up (default: 2).
    pub retry_budget: u32,
}

impl Default for FetchPolicy {
    fn default() -> Self {
        Self {
            bulk_threshold: 3,
            retry_budget: 2,
        }
    }
}

/// The fetches one diff calls for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchPlan {
    /// Fetch every sequence number in the range.
    Each(RangeInclusive<SeqNo>),
    /// Bulk catch-up: fetch only the newest sequence number.
    Latest(SeqNo),
}

impl FetchPlan {
    /// Sequence numbers to fetch, in ascending order.
    pub fn seqs(&self) -> RangeInclusive<SeqNo> {
        match self {
            FetchPlan::Each(range) => range.clone(),
            FetchPlan::Latest(seq) => *seq..=*seq,
        }
    }

    /// Number of fetches.
    pub fn len(&self) -> usize {
        match self {
            FetchPlan::Each(range) => range.clone().count(),
            FetchPlan::Latest(_) => 1,
        }
    }

    /// Whether the plan fetches nothing.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl FetchPolicy {
    /// Plan the fetches for `diff`. Malformed diffs get no plan.
    pub fn plan(&self, diff: &SyncDiff) -> Option<FetchPlan> {
        if !diff.is_well_formed() {
            return None;
        }
        if diff.gap() < self.bulk_threshold {
            Some(FetchPlan::Each(diff.low..=diff.high))
        } else {
            Some(FetchPlan::Latest(diff.high))
        }
    }
}

impl<T: Transport> ChatRoom<T> {
    /// Process one batch of diffs. Returns the number of fetches issued.
    pub fn process_sync_update(&mut self, diffs: &[SyncDiff]) -> usize {
        if diffs.is_empty() {
            return 0;
        }
        let Some(local) = self.local_session.clone() else {
            tracing::debug!(diffs = diffs.len(), "ignoring sync update before initialization");
            return 0;
        };

        let policy = self.config.fetch;
        let mut issued = 0;
        for diff in diffs {
            if diff.session == local {
                continue;
            }
            let pending = match self.roster.departed_at(&diff.session) {
                Some(left) if diff.high <= left => {
                    tracing::debug!(session = %diff.session, left, "diff predates LEAVE");
                    continue;
                }
                Some(left) if diff.low <= left => {
                    SyncDiff::new(diff.session.clone(), left + 1, diff.high)
                }
                _ => diff.clone(),
            };
            let Some(plan) = policy.plan(&pending) else {
                tracing::warn!(
                    session = %diff.session,
                    low = diff.low,
                    high = diff.high,
                    "skipping malformed diff"
                );
                continue;
            };

            let (session, _) = self.roster.touch(&diff.session, &mut self.outbox);
            session.observe_seq(diff.high);

            for seq in plan.seqs() {
                tracing::debug!(session = %diff.session, seq, "fetching");
                self.transport.fetch(FetchRequest {
                    session: diff.session.clone(),
                    seq,
                    retry_budget: policy.retry_budget,
                    epoch: self.epoch,
                });
                issued += 1;
            }
        }

        let root_digest = self.transport.root_digest().to_hex();
        for diff in diffs {
            self.outbox.push(RoomEvent::TreeUpdated {
                session: diff.session.clone(),
                seq: diff.high,
                root_digest: root_digest.clone(),
            });
        }
        issued
    }

    /// Handle a fetch resolved by the transport.
    ///
    /// Completions issued before the last close are stale and ignored, as are
    /// failed fetches.
    pub fn on_fetch_completed(
        &mut self,
        completion: FetchCompletion,
        now: Instant,
    ) -> Option<DispatchOutcome> {
        let FetchCompletion { request, outcome } = completion;
        if request.epoch != self.epoch || self.local_session.is_none() {
            tracing::trace!(
                session = %request.session,
                seq = request.seq,
                epoch = request.epoch,
                "discarding stale fetch completion"
            );
            return None;
        }

        match outcome {
            FetchOutcome::Fetched {
                payload,
                validation,
            } => {
                if self.roster.is_superseded(&request.session, request.seq) {
                    tracing::debug!(
                        session = %request.session,
                        seq = request.seq,
                        "dropping payload that predates LEAVE"
                    );
                    return None;
                }
                let outcome = self.dispatch(&payload, &request.session, validation, now);
                if matches!(
                    outcome,
                    DispatchOutcome::Departed | DispatchOutcome::IgnoredLeave
                ) {
                    self.roster.mark_departed(&request.session, request.seq);
                }
                Some(outcome)
            }
            FetchOutcome::Failed { reason } => {
                tracing::debug!(
                    session = %request.session,
                    seq = request.seq,
                    %reason,
                    "fetch failed, dropping"
                );
                let deadline = now + self.config.liveness_window();
                self.roster
                    .arm_liveness(&request.session, deadline, &mut self.timers);
                None
            }
        }
    }
}
