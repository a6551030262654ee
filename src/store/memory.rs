//! In-memory stores for tests and the simulator.

use super::traits::*;
use crate::tally::{
    AppendOutcome, PolicyConfig, SubmissionStatus, Tally, VoteEntry, VoteRecord,
};
use crate::types::SubmissionId;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

/// Newest first, ties broken by higher id.
pub(crate) fn sort_newest_first(submissions: &mut [Submission]) {
    submissions.sort_by(|a, b| {
        b.created_at
            .cmp(&a.created_at)
            .then_with(|| b.id.cmp(&a.id))
    });
}

/// In-memory submission store.
///
/// `set_read_only(true)` makes `set_status` fail with `Unavailable` while
/// reads keep working.
#[derive(Debug, Clone, Default)]
pub struct MemorySubmissionStore {
    submissions: Arc<Mutex<HashMap<SubmissionId, Submission>>>,
    read_only: Arc<AtomicBool>,
}

impl MemorySubmissionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a submission (test setup / external writes).
    pub fn insert_submission(&self, submission: Submission) {
        let mut submissions = self
            .submissions
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        submissions.insert(submission.id, submission);
    }

    pub fn set_read_only(&self, read_only: bool) {
        self.read_only.store(read_only, Ordering::SeqCst);
    }
}

#[async_trait]
impl SubmissionStore for MemorySubmissionStore {
    async fn lookup(&self, id: SubmissionId) -> StoreResult<Option<Submission>> {
        let submissions = self
            .submissions
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        Ok(submissions.get(&id).cloned())
    }

    async fn set_status(&self, id: SubmissionId, status: SubmissionStatus) -> StoreResult<()> {
        if self.read_only.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable(
                "submission store is read-only".to_string(),
            ));
        }
        let mut submissions = self
            .submissions
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let submission = submissions
            .get_mut(&id)
            .ok_or(StoreError::UnknownSubmission(id))?;
        submission.status = status;
        Ok(())
    }

    async fn list_by_status(&self, status: SubmissionStatus) -> StoreResult<Vec<Submission>> {
        let submissions = self
            .submissions
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let mut matching: Vec<Submission> = submissions
            .values()
            .filter(|s| s.status == status)
            .cloned()
            .collect();
        sort_newest_first(&mut matching);
        Ok(matching)
    }
}

/// Tally plus its vote trail, updated together.
#[derive(Debug)]
struct TallyEntry {
    tally: Tally,
    votes: Vec<VoteRecord>,
}

/// In-memory tally store.
///
/// `set_unavailable(true)` makes every call fail with `Unavailable`, for
/// exercising storage-failure paths.
#[derive(Debug, Clone, Default)]
pub struct MemoryTallyStore {
    tallies: Arc<Mutex<HashMap<SubmissionId, TallyEntry>>>,
    unavailable: Arc<AtomicBool>,
}

impl MemoryTallyStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    fn check_available(&self) -> StoreResult<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("tally store offline".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl TallyStore for MemoryTallyStore {
    async fn load(&self, id: SubmissionId) -> StoreResult<Option<Tally>> {
        self.check_available()?;
        let tallies = self.tallies.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(tallies.get(&id).map(|entry| entry.tally.clone()))
    }

    async fn append(
        &self,
        entry: &VoteEntry,
        policy: &PolicyConfig,
    ) -> StoreResult<AppendOutcome> {
        self.check_available()?;
        let mut tallies = self.tallies.lock().unwrap_or_else(PoisonError::into_inner);
        let stored = tallies
            .entry(entry.submission_id)
            .or_insert_with(|| TallyEntry {
                tally: Tally::new(entry.submission_id),
                votes: Vec::new(),
            });

        let outcome = stored
            .tally
            .apply(entry.vote_type, entry.key_image, policy)?;
        if let AppendOutcome::Counted { counts, .. } = outcome {
            stored.votes.push(VoteRecord {
                sequence: counts.total(),
                entry: entry.clone(),
            });
        }
        Ok(outcome)
    }

    async fn votes(&self, id: SubmissionId) -> StoreResult<Vec<VoteRecord>> {
        self.check_available()?;
        let tallies = self.tallies.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(tallies
            .get(&id)
            .map(|entry| entry.votes.clone())
            .unwrap_or_default())
    }
}
