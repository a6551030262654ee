//! Review Board
//!
//! The exposed surface: cast a vote, read a tally, list submissions waiting
//! on administrators. Wires intake and the tally engine over injected
//! collaborators.

use crate::crypto::{RingPrimitive, RingSignatureEngine};
use crate::error::RejectReason;
use crate::intake::{IntakeError, VoteIntake, VoteRequest};
use crate::registry::KeyRegistry;
use crate::store::{StoreResult, Submission, SubmissionStore, TallyStore};
use crate::tally::{
    PolicyConfig, PolicyError, RecordOutcome, SubmissionStatus, Tally, TallyEngine, VoteCounts,
    VoteRecord,
};
use crate::types::SubmissionId;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::{debug, info};

/// Result of one `cast_vote` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum VoteOutcome {
    Accepted {
        status: SubmissionStatus,
        counts: VoteCounts,
    },
    Rejected {
        reason: RejectReason,
    },
}

impl VoteOutcome {
    pub fn is_accepted(&self) -> bool {
        matches!(self, VoteOutcome::Accepted { .. })
    }

    pub fn reason(&self) -> Option<RejectReason> {
        match self {
            VoteOutcome::Rejected { reason } => Some(*reason),
            VoteOutcome::Accepted { .. } => None,
        }
    }
}

impl From<RejectReason> for VoteOutcome {
    fn from(reason: RejectReason) -> Self {
        VoteOutcome::Rejected { reason }
    }
}

pub struct ReviewBoard<P> {
    intake: VoteIntake<P>,
    tally: TallyEngine,
    submissions: Arc<dyn SubmissionStore>,
    signatures: Arc<RingSignatureEngine<P>>,
}

impl<P: RingPrimitive> ReviewBoard<P> {
    /// Build a board. Fails only on an invalid policy.
    pub fn new(
        registry: Arc<dyn KeyRegistry>,
        submissions: Arc<dyn SubmissionStore>,
        tallies: Arc<dyn TallyStore>,
        primitive: P,
        policy: PolicyConfig,
    ) -> Result<Self, PolicyError> {
        policy.validate()?;

        let signatures = Arc::new(RingSignatureEngine::new(primitive));
        let intake = VoteIntake::new(
            registry,
            Arc::clone(&submissions),
            Arc::clone(&signatures),
        );
        let tally = TallyEngine::new(Arc::clone(&submissions), tallies, policy);

        Ok(Self {
            intake,
            tally,
            submissions,
            signatures,
        })
    }

    /// Signature engine the board verifies with; clients sign with the same
    /// backend.
    pub fn engine(&self) -> &RingSignatureEngine<P> {
        &self.signatures
    }

    pub fn policy(&self) -> &PolicyConfig {
        self.tally.policy()
    }

    /// Validate and count one vote.
    ///
    /// Every refusal is `Ok(VoteOutcome::Rejected { .. })`; only storage
    /// unavailability is `Err`.
    pub async fn cast_vote(&self, request: &VoteRequest) -> StoreResult<VoteOutcome> {
        let submission_id = request.submission_id;

        let verified = match self.intake.validate(request).await {
            Ok(verified) => verified,
            Err(IntakeError::Rejected(reason)) => {
                info!(%submission_id, reason = reason.code(), "vote rejected at intake");
                return Ok(reason.into());
            }
            Err(IntakeError::Store(e)) => return Err(e),
        };

        let recorded_at = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or_default();
        let outcome = self
            .tally
            .record_vote(verified.into_entry(recorded_at))
            .await?;

        Ok(match outcome {
            RecordOutcome::Accepted(receipt) => {
                debug!(%submission_id, status = %receipt.status, "vote accepted");
                VoteOutcome::Accepted {
                    status: receipt.status,
                    counts: receipt.counts,
                }
            }
            RecordOutcome::Rejected(reason) => {
                info!(%submission_id, reason = reason.code(), "vote rejected at tally");
                reason.into()
            }
        })
    }

    /// Tally snapshot; `None` until the first vote is accepted.
    pub async fn get_tally(&self, submission_id: SubmissionId) -> StoreResult<Option<Tally>> {
        self.tally.snapshot(submission_id).await
    }

    /// Accepted votes for a submission, oldest first.
    ///
    /// Administrators read this when resolving an escalated or flagged
    /// submission.
    pub async fn list_votes(&self, submission_id: SubmissionId) -> StoreResult<Vec<VoteRecord>> {
        self.tally.votes(submission_id).await
    }

    /// Escalated submissions, newest first.
    pub async fn list_escalated(&self) -> StoreResult<Vec<Submission>> {
        self.submissions
            .list_by_status(SubmissionStatus::Escalated)
            .await
    }

    /// Flagged submissions, newest first.
    pub async fn list_flagged(&self) -> StoreResult<Vec<Submission>> {
        self.submissions
            .list_by_status(SubmissionStatus::Flagged)
            .await
    }
}
