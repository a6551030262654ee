//! Vote Intake
//!
//! Validates an incoming `VoteRequest` before anything touches a tally.
//!
//! ## Checks, in order
//!
//! 1. Submission exists and is not closed
//! 2. Ring has at least two distinct members
//! 3. Every ring member is an active registry key
//! 4. The signed message equals the canonical encoding of the vote fields
//! 5. The ring signature verifies
//!
//! The first failing check is the rejection. Replays are not detected here;
//! the tally engine owns key-image uniqueness.

use crate::codec;
use crate::crypto::engine::hex_bytes;
use crate::crypto::{
    distinct_members, KeyImage, PublicKey, RingPrimitive, RingSignatureEngine, Signature,
    MIN_RING_SIZE,
};
use crate::error::RejectReason;
use crate::registry::{KeyRegistry, RegistryError};
use crate::store::{StoreError, SubmissionStore};
use crate::tally::VoteEntry;
use crate::types::{SubmissionId, VoteType};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, warn};

/// One vote attempt as submitted by a client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoteRequest {
    pub submission_id: SubmissionId,
    pub vote_type: VoteType,
    pub round_nonce: u64,
    /// Client-chosen bytes folded into the signed message
    #[serde(with = "hex_bytes")]
    pub extra_nonce: Vec<u8>,
    /// Ordered ring; must be exactly the ring that was signed
    pub ring: Vec<PublicKey>,
    /// Exact bytes the client signed
    #[serde(with = "hex_bytes")]
    pub message: Vec<u8>,
    pub signature: Signature,
}

/// A vote that passed every intake check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifiedVote {
    pub submission_id: SubmissionId,
    pub vote_type: VoteType,
    pub key_image: KeyImage,
    pub signature: Signature,
}

impl VerifiedVote {
    /// Entry for the tally store, stamped with `recorded_at` (Unix seconds).
    pub fn into_entry(self, recorded_at: u64) -> VoteEntry {
        VoteEntry::new(
            self.submission_id,
            self.vote_type,
            self.key_image,
            self.signature,
            recorded_at,
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IntakeError {
    #[error("vote rejected: {0}")]
    Rejected(RejectReason),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl From<RejectReason> for IntakeError {
    fn from(reason: RejectReason) -> Self {
        IntakeError::Rejected(reason)
    }
}

/// Intake validator. Cheap to clone.
pub struct VoteIntake<P> {
    registry: Arc<dyn KeyRegistry>,
    submissions: Arc<dyn SubmissionStore>,
    signatures: Arc<RingSignatureEngine<P>>,
}

impl<P> Clone for VoteIntake<P> {
    fn clone(&self) -> Self {
        Self {
            registry: Arc::clone(&self.registry),
            submissions: Arc::clone(&self.submissions),
            signatures: Arc::clone(&self.signatures),
        }
    }
}

impl<P: RingPrimitive> VoteIntake<P> {
    pub fn new(
        registry: Arc<dyn KeyRegistry>,
        submissions: Arc<dyn SubmissionStore>,
        signatures: Arc<RingSignatureEngine<P>>,
    ) -> Self {
        Self {
            registry,
            submissions,
            signatures,
        }
    }

    /// Run every check against `request`.
    pub async fn validate(&self, request: &VoteRequest) -> Result<VerifiedVote, IntakeError> {
        let submission_id = request.submission_id;

        let submission = self
            .submissions
            .lookup(submission_id)
            .await?
            .ok_or(RejectReason::UnknownSubmission)?;
        if submission.status.is_closed() {
            return Err(RejectReason::SubmissionClosed.into());
        }

        if distinct_members(&request.ring) < MIN_RING_SIZE {
            return Err(RejectReason::RingTooSmall.into());
        }

        for member in &request.ring {
            let active = self
                .registry
                .is_active(member)
                .await
                .map_err(registry_failure)?;
            if !active {
                debug!(%submission_id, "ring member not in active registry");
                return Err(RejectReason::UnknownRingMember.into());
            }
        }

        let expected = codec::encode(
            submission_id,
            &submission.genre,
            request.vote_type,
            request.round_nonce,
            &request.extra_nonce,
        )
        .map_err(|e| {
            debug!(%submission_id, error = %e, "could not encode vote fields");
            RejectReason::MessageMismatch
        })?;
        if expected != request.message {
            return Err(RejectReason::MessageMismatch.into());
        }

        if !self.verify_off_runtime(request).await {
            return Err(RejectReason::InvalidSignature.into());
        }

        Ok(VerifiedVote {
            submission_id,
            vote_type: request.vote_type,
            key_image: self.signatures.key_image_of(&request.signature),
            signature: request.signature.clone(),
        })
    }

    /// Verification is CPU-bound; keep it off the async workers.
    async fn verify_off_runtime(&self, request: &VoteRequest) -> bool {
        let signatures = Arc::clone(&self.signatures);
        let message = request.message.clone();
        let ring = request.ring.clone();
        let signature = request.signature.clone();

        let result = tokio::task::spawn_blocking(move || {
            signatures.verify(&message, &ring, &signature)
        })
        .await;

        match result {
            Ok(valid) => valid,
            Err(e) => {
                warn!(submission_id = %request.submission_id, error = %e, "verification task failed");
                false
            }
        }
    }
}

fn registry_failure(err: RegistryError) -> IntakeError {
    match err {
        RegistryError::Unavailable(msg) => IntakeError::Store(StoreError::Unavailable(msg)),
        other => IntakeError::Rejected(other.into()),
    }
}
