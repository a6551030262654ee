//! Tally engine.
//!
//! The only component that mutates tallies and the only place a replayed key
//! image is rejected. Each vote runs one critical section per submission:
//!
//! ```text
//! lock(submission) → re-read status → append (store: close check,
//! duplicate check, increment, decide, audit row) → set status → unlock
//! ```
//!
//! The lock serializes votes within this process. The store's `append` is
//! atomic on its own, so engines sharing a database cannot double-count a key
//! image.
//!
//! Status follows the recorded `final_decision`, not the latest counts. A
//! status write that failed after the decision was stored is redone by the
//! next vote on that submission.
//!
//! The critical section runs on its own Tokio task. If the caller's future is
//! dropped the task still runs to completion.

use super::policy::{Decision, PolicyConfig};
use super::record::{AppendOutcome, Tally, VoteCounts, VoteEntry, VoteRecord};
use super::status::SubmissionStatus;
use crate::error::RejectReason;
use crate::store::{StoreError, StoreResult, SubmissionStore, TallyStore};
use crate::types::{SubmissionId, VoteType};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use tracing::{debug, info, warn};

/// What an accepted vote did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VoteReceipt {
    pub submission_id: SubmissionId,
    pub vote_type: VoteType,
    /// Status after this vote
    pub status: SubmissionStatus,
    pub counts: VoteCounts,
    pub final_decision: Option<Decision>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordOutcome {
    Accepted(VoteReceipt),
    Rejected(RejectReason),
}

type SubmissionLock = Arc<tokio::sync::Mutex<()>>;

struct Inner {
    submissions: Arc<dyn SubmissionStore>,
    tallies: Arc<dyn TallyStore>,
    policy: PolicyConfig,
    locks: Mutex<HashMap<SubmissionId, SubmissionLock>>,
}

/// Per-submission serialized vote recording.
///
/// Cheap to clone; clones share locks and stores.
#[derive(Clone)]
pub struct TallyEngine {
    inner: Arc<Inner>,
}

impl TallyEngine {
    pub fn new(
        submissions: Arc<dyn SubmissionStore>,
        tallies: Arc<dyn TallyStore>,
        policy: PolicyConfig,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                submissions,
                tallies,
                policy,
                locks: Mutex::new(HashMap::new()),
            }),
        }
    }

    pub fn policy(&self) -> &PolicyConfig {
        &self.inner.policy
    }

    /// Record a verified vote.
    ///
    /// Storage failures are `Err`; every other refusal is
    /// `Ok(RecordOutcome::Rejected(_))` and leaves the tally untouched.
    pub async fn record_vote(&self, entry: VoteEntry) -> StoreResult<RecordOutcome> {
        let submission_id = entry.submission_id;
        let inner = Arc::clone(&self.inner);
        let task = tokio::spawn(async move { inner.record(entry).await });

        task.await.map_err(|e| {
            warn!(%submission_id, error = %e, "tally task did not complete");
            StoreError::Unavailable(format!("tally task failed: {}", e))
        })?
    }

    /// Current tally, if any vote has been accepted.
    pub async fn snapshot(&self, submission_id: SubmissionId) -> StoreResult<Option<Tally>> {
        self.inner.tallies.load(submission_id).await
    }

    /// Accepted votes for a submission, in acceptance order.
    pub async fn votes(&self, submission_id: SubmissionId) -> StoreResult<Vec<VoteRecord>> {
        self.inner.tallies.votes(submission_id).await
    }

    #[cfg(test)]
    fn lock_count(&self) -> usize {
        self.inner
            .locks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

impl Inner {
    fn lock_for(&self, submission_id: SubmissionId) -> SubmissionLock {
        let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(locks.entry(submission_id).or_default())
    }

    /// Drop the lock entry if nobody else holds or waits on it.
    fn release(&self, submission_id: SubmissionId, lock: SubmissionLock) {
        drop(lock);
        let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        if locks
            .get(&submission_id)
            .is_some_and(|entry| Arc::strong_count(entry) == 1)
        {
            locks.remove(&submission_id);
        }
    }

    async fn record(&self, entry: VoteEntry) -> StoreResult<RecordOutcome> {
        let submission_id = entry.submission_id;
        let lock = self.lock_for(submission_id);
        let result = {
            let _guard = lock.lock().await;
            self.apply(entry).await
        };
        self.release(submission_id, lock);
        result
    }

    async fn apply(&self, entry: VoteEntry) -> StoreResult<RecordOutcome> {
        let submission_id = entry.submission_id;
        let vote_type = entry.vote_type;

        // Status may have moved since intake looked at it
        let Some(submission) = self.submissions.lookup(submission_id).await? else {
            return Ok(RecordOutcome::Rejected(RejectReason::UnknownSubmission));
        };
        if submission.status.is_closed() {
            debug!(%submission_id, status = %submission.status, "vote arrived after close");
            return Ok(RecordOutcome::Rejected(RejectReason::SubmissionClosed));
        }

        let (counts, final_decision) = match self.tallies.append(&entry, &self.policy).await? {
            AppendOutcome::Counted {
                counts,
                final_decision,
            } => (counts, final_decision),
            AppendOutcome::Duplicate => {
                debug!(
                    %submission_id,
                    key_image = %entry.key_image.short(),
                    "key image already counted"
                );
                return Ok(RecordOutcome::Rejected(RejectReason::DuplicateVote));
            }
            AppendOutcome::Closed(decision) => {
                // Decided, but the status write never landed
                let to = SubmissionStatus::from(decision);
                warn!(%submission_id, from = %submission.status, %to, "restoring decided status");
                self.submissions.set_status(submission_id, to).await?;
                return Ok(RecordOutcome::Rejected(RejectReason::SubmissionClosed));
            }
        };

        let status = match submission.status.advance(final_decision) {
            Some(t) => {
                self.submissions.set_status(submission_id, t.to).await?;
                if t.to.is_terminal() {
                    info!(
                        %submission_id,
                        from = %t.from,
                        to = %t.to,
                        total = counts.total(),
                        "submission decided"
                    );
                }
                t.to
            }
            None => submission.status,
        };

        debug!(
            %submission_id,
            %vote_type,
            %status,
            total = counts.total(),
            "vote counted"
        );

        Ok(RecordOutcome::Accepted(VoteReceipt {
            submission_id,
            vote_type,
            status,
            counts,
            final_decision,
        }))
    }
}
