//! Reviewer Key Registry
//!
//! Holds each reviewer's published public key and supplies ring candidates.
//!
//! ## Semantics
//!
//! - **One key per reviewer**, immutable once published
//! - **Unique keys**: publishing a key already held by anyone fails with `DuplicateKey`
//! - **Retire-wins**: a retired key leaves the active set but stays reserved, so
//!   the same bytes can never be published again
//! - **Deterministic ordering**: active keys are returned sorted by key bytes
//!   (BTreeSet), so every caller sees the same candidate list
//!
//! Writes (publication, retirement) are applied by the enrolment side of the
//! system; the vote path only reads through the `KeyRegistry` trait.

use crate::crypto::{PublicKey, MIN_RING_SIZE};
use crate::types::{ReviewerId, Role};
use async_trait::async_trait;
use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::sync::{Arc, PoisonError, RwLock};
use thiserror::Error;

/// Registry errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    #[error("no key published for reviewer {0}")]
    NotFound(ReviewerId),

    #[error("public key is already published")]
    DuplicateKey,

    #[error("reviewer {0} already has a published key")]
    DuplicateReviewer(ReviewerId),

    #[error("need {requested} ring members but only {available} active keys are available")]
    InsufficientDecoys { requested: usize, available: usize },

    #[error("signer key is not an active registry key")]
    SignerNotActive,

    #[error("key registry unavailable: {0}")]
    Unavailable(String),
}

/// A reviewer's published key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReviewerKey {
    pub reviewer_id: ReviewerId,
    pub public_key: PublicKey,
    pub role: Role,
}

impl ReviewerKey {
    pub fn new(reviewer_id: ReviewerId, public_key: PublicKey, role: Role) -> Self {
        Self {
            reviewer_id,
            public_key,
            role,
        }
    }
}

/// Read interface consumed by vote intake and ballot construction.
#[async_trait]
pub trait KeyRegistry: Send + Sync {
    /// Public key of an active reviewer.
    async fn lookup(&self, reviewer_id: ReviewerId) -> Result<PublicKey, RegistryError>;

    /// All active keys, sorted by key bytes.
    async fn all_active_keys(&self) -> Result<Vec<PublicKey>, RegistryError>;

    /// Whether `key` belongs to an active reviewer.
    async fn is_active(&self, key: &PublicKey) -> Result<bool, RegistryError>;
}

#[derive(Debug, Default)]
struct RegistryState {
    reviewers: BTreeMap<ReviewerId, ReviewerKey>,
    active: BTreeSet<PublicKey>,
    /// Every key ever published, retired ones included
    reserved: HashSet<PublicKey>,
}

/// In-process key registry.
///
/// Thread-safe and cheap to clone; clones share state.
#[derive(Debug, Clone, Default)]
pub struct InMemoryKeyRegistry {
    state: Arc<RwLock<RegistryState>>,
}

impl InMemoryKeyRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Publish a reviewer's key.
    ///
    /// # Errors
    ///
    /// - `DuplicateKey` if the key was ever published (by anyone)
    /// - `DuplicateReviewer` if the reviewer already has a key
    pub fn publish(&self, key: ReviewerKey) -> Result<(), RegistryError> {
        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);

        if state.reserved.contains(&key.public_key) {
            return Err(RegistryError::DuplicateKey);
        }
        if state.reviewers.contains_key(&key.reviewer_id) {
            return Err(RegistryError::DuplicateReviewer(key.reviewer_id));
        }

        state.reserved.insert(key.public_key);
        state.active.insert(key.public_key);
        state.reviewers.insert(key.reviewer_id, key);
        Ok(())
    }

    /// Retire a reviewer's key. Returns the retired key.
    pub fn retire(&self, reviewer_id: ReviewerId) -> Result<ReviewerKey, RegistryError> {
        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        let key = state
            .reviewers
            .remove(&reviewer_id)
            .ok_or(RegistryError::NotFound(reviewer_id))?;
        state.active.remove(&key.public_key);
        Ok(key)
    }

    /// Published key record for a reviewer, role included.
    pub fn reviewer(&self, reviewer_id: ReviewerId) -> Option<ReviewerKey> {
        let state = self.state.read().unwrap_or_else(PoisonError::into_inner);
        state.reviewers.get(&reviewer_id).cloned()
    }

    /// Number of active reviewers.
    pub fn len(&self) -> usize {
        let state = self.state.read().unwrap_or_else(PoisonError::into_inner);
        state.active.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl KeyRegistry for InMemoryKeyRegistry {
    async fn lookup(&self, reviewer_id: ReviewerId) -> Result<PublicKey, RegistryError> {
        self.reviewer(reviewer_id)
            .map(|key| key.public_key)
            .ok_or(RegistryError::NotFound(reviewer_id))
    }

    async fn all_active_keys(&self) -> Result<Vec<PublicKey>, RegistryError> {
        let state = self.state.read().unwrap_or_else(PoisonError::into_inner);
        Ok(state.active.iter().copied().collect())
    }

    async fn is_active(&self, key: &PublicKey) -> Result<bool, RegistryError> {
        let state = self.state.read().unwrap_or_else(PoisonError::into_inner);
        Ok(state.active.contains(key))
    }
}

/// Build a ring of `size` keys around `signer`.
///
/// Decoys are drawn uniformly from `candidates` (the signer is skipped) and the
/// ring is shuffled so the signer's position carries no information. Returns
/// the ring and the signer's index in it.
pub fn choose_ring<R: Rng + ?Sized>(
    candidates: &[PublicKey],
    signer: PublicKey,
    size: usize,
    rng: &mut R,
) -> Result<(Vec<PublicKey>, usize), RegistryError> {
    if !candidates.contains(&signer) {
        return Err(RegistryError::SignerNotActive);
    }

    let decoys: Vec<PublicKey> = candidates
        .iter()
        .copied()
        .filter(|key| *key != signer)
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect();

    let size = size.max(MIN_RING_SIZE);
    if decoys.len() + 1 < size {
        return Err(RegistryError::InsufficientDecoys {
            requested: size,
            available: decoys.len() + 1,
        });
    }

    let mut ring: Vec<PublicKey> = decoys.choose_multiple(rng, size - 1).copied().collect();
    ring.push(signer);
    ring.shuffle(rng);

    let index = ring
        .iter()
        .position(|key| *key == signer)
        .ok_or(RegistryError::SignerNotActive)?;
    Ok((ring, index))
}
