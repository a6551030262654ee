//! Collaborator traits for submission and tally persistence.
//!
//! The vote path only talks to storage through these traits so any backend
//! (in-memory for tests, SQLite, something external) can be injected.

use crate::tally::{
    AppendOutcome, CounterOverflow, PolicyConfig, SubmissionStatus, Tally, VoteEntry, VoteRecord,
};
use crate::types::SubmissionId;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A content submission, owned by the surrounding system.
///
/// The core reads `id`, `genre` and `status`; the rest is carried for
/// listings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Submission {
    pub id: SubmissionId,
    pub genre: String,
    pub status: SubmissionStatus,
    pub content_ref: String,
    /// Unix seconds
    pub created_at: u64,
}

impl Submission {
    /// A new submission in `pending`.
    pub fn new(
        id: SubmissionId,
        genre: impl Into<String>,
        content_ref: impl Into<String>,
        created_at: u64,
    ) -> Self {
        Self {
            id,
            genre: genre.into(),
            status: SubmissionStatus::Pending,
            content_ref: content_ref.into(),
            created_at,
        }
    }
}

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Storage errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    #[error("storage unavailable: {0}")]
    Unavailable(String),

    #[error("stored data is corrupt: {0}")]
    Corrupt(String),

    #[error("submission {0} does not exist")]
    UnknownSubmission(SubmissionId),

    #[error(transparent)]
    CounterFull(#[from] CounterOverflow),
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        StoreError::Unavailable(err.to_string())
    }
}

#[async_trait]
pub trait SubmissionStore: Send + Sync {
    async fn lookup(&self, id: SubmissionId) -> StoreResult<Option<Submission>>;

    /// Record a status change. `UnknownSubmission` if the id is absent.
    async fn set_status(&self, id: SubmissionId, status: SubmissionStatus) -> StoreResult<()>;

    /// Submissions in `status`, newest first (ties broken by higher id).
    async fn list_by_status(&self, status: SubmissionStatus) -> StoreResult<Vec<Submission>>;
}

#[async_trait]
pub trait TallyStore: Send + Sync {
    async fn load(&self, id: SubmissionId) -> StoreResult<Option<Tally>>;

    /// Count one vote as a single atomic step, with `Tally::apply` semantics.
    ///
    /// Refused with `Closed` once an approve/reject decision is recorded and
    /// with `Duplicate` when the key image was already consumed. Otherwise the
    /// image is consumed, the counter incremented, `final_decision` set if
    /// still unset, and the entry appended to the vote trail. Key images and
    /// vote records are never removed.
    async fn append(&self, entry: &VoteEntry, policy: &PolicyConfig)
        -> StoreResult<AppendOutcome>;

    /// Accepted votes for a submission, in acceptance order.
    async fn votes(&self, id: SubmissionId) -> StoreResult<Vec<VoteRecord>>;
}
