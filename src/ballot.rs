//! Client-side ballot construction.
//!
//! A reviewer fills in a `Ballot`, picks a ring, and signs. The result is the
//! `VoteRequest` the board expects.

use crate::codec::{self, CodecError};
use crate::crypto::{PublicKey, RingPrimitive, RingSignatureEngine, SecretKey, SigningError};
use crate::intake::VoteRequest;
use crate::types::{SubmissionId, VoteType};
use rand::RngCore;
use thiserror::Error;

/// Length of a generated `extra_nonce`.
pub const EXTRA_NONCE_LEN: usize = 16;

#[derive(Debug, Error)]
pub enum BallotError {
    #[error(transparent)]
    Codec(#[from] CodecError),

    #[error(transparent)]
    Signing(#[from] SigningError),
}

/// The semantic fields of a vote, before signing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ballot {
    pub submission_id: SubmissionId,
    /// Must match the submission's genre or intake reports a message mismatch
    pub genre: String,
    pub vote_type: VoteType,
    pub round_nonce: u64,
    pub extra_nonce: Vec<u8>,
}

impl Ballot {
    /// A ballot with a fresh random `extra_nonce` and round 0.
    pub fn new(submission_id: SubmissionId, genre: impl Into<String>, vote_type: VoteType) -> Self {
        let mut extra_nonce = vec![0u8; EXTRA_NONCE_LEN];
        rand::thread_rng().fill_bytes(&mut extra_nonce);
        Self {
            submission_id,
            genre: genre.into(),
            vote_type,
            round_nonce: 0,
            extra_nonce,
        }
    }

    pub fn with_round(mut self, round_nonce: u64) -> Self {
        self.round_nonce = round_nonce;
        self
    }

    pub fn message(&self) -> Result<Vec<u8>, CodecError> {
        codec::encode(
            self.submission_id,
            &self.genre,
            self.vote_type,
            self.round_nonce,
            &self.extra_nonce,
        )
    }

    /// Sign as `ring[signer_index]`.
    pub fn sign<P: RingPrimitive>(
        &self,
        engine: &RingSignatureEngine<P>,
        ring: Vec<PublicKey>,
        signer_index: usize,
        secret: &SecretKey,
    ) -> Result<VoteRequest, BallotError> {
        let message = self.message()?;
        let signature = engine.sign(&message, &ring, secret, signer_index)?;
        Ok(VoteRequest {
            submission_id: self.submission_id,
            vote_type: self.vote_type,
            round_nonce: self.round_nonce,
            extra_nonce: self.extra_nonce.clone(),
            ring,
            message,
            signature,
        })
    }
}
