//! Vote rejection taxonomy.
//!
//! Every way a vote attempt can be refused. Rejections are values carried in
//! `VoteOutcome::Rejected`, never panics and never `Err`; only storage
//! failures surface as errors from the board.

use crate::crypto::SigningError;
use crate::registry::RegistryError;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Error, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RejectReason {
    #[error("submission does not exist")]
    UnknownSubmission,

    #[error("submission is closed to voting")]
    SubmissionClosed,

    #[error("ring contains a key that is not an active reviewer key")]
    UnknownRingMember,

    #[error("ring has fewer than two distinct members")]
    RingTooSmall,

    #[error("signed message does not match the vote fields")]
    MessageMismatch,

    #[error("ring signature does not verify")]
    InvalidSignature,

    #[error("a vote with this key image was already counted")]
    DuplicateVote,

    #[error("public key is already published")]
    DuplicateKey,

    #[error("secret key does not match the signer's ring position")]
    InvalidSecretKey,
}

impl RejectReason {
    /// Stable reason code.
    pub fn code(&self) -> &'static str {
        match self {
            RejectReason::UnknownSubmission => "unknown_submission",
            RejectReason::SubmissionClosed => "submission_closed",
            RejectReason::UnknownRingMember => "unknown_ring_member",
            RejectReason::RingTooSmall => "ring_too_small",
            RejectReason::MessageMismatch => "message_mismatch",
            RejectReason::InvalidSignature => "invalid_signature",
            RejectReason::DuplicateVote => "duplicate_vote",
            RejectReason::DuplicateKey => "duplicate_key",
            RejectReason::InvalidSecretKey => "invalid_secret_key",
        }
    }
}

impl From<SigningError> for RejectReason {
    fn from(err: SigningError) -> Self {
        match err {
            SigningError::RingTooSmall { .. } => RejectReason::RingTooSmall,
            SigningError::InvalidSecretKey => RejectReason::InvalidSecretKey,
            SigningError::MalformedRingMember { .. } => RejectReason::UnknownRingMember,
        }
    }
}

impl From<RegistryError> for RejectReason {
    fn from(err: RegistryError) -> Self {
        match err {
            RegistryError::DuplicateKey | RegistryError::DuplicateReviewer(_) => {
                RejectReason::DuplicateKey
            }
            RegistryError::InsufficientDecoys { .. } => RejectReason::RingTooSmall,
            RegistryError::NotFound(_)
            | RegistryError::SignerNotActive
            | RegistryError::Unavailable(_) => RejectReason::UnknownRingMember,
        }
    }
}
