//! Per-submission tally record.
//!
//! Counts and consumed key images, plus the append-only trail of accepted
//! votes kept for administrators. Reviewer identities are never recorded.

use super::policy::{self, Decision, PolicyConfig};
use crate::crypto::{KeyImage, Signature};
use crate::types::{SubmissionId, VoteType};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use thiserror::Error;

/// A vote counter is already at `u32::MAX`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("{0} counter is full")]
pub struct CounterOverflow(pub VoteType);

/// Vote counters for one submission.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoteCounts {
    pub approve: u32,
    pub reject: u32,
    pub escalate: u32,
    pub flag: u32,
}

impl VoteCounts {
    pub fn new(approve: u32, reject: u32, escalate: u32, flag: u32) -> Self {
        Self {
            approve,
            reject,
            escalate,
            flag,
        }
    }

    /// N: total votes counted. Widened so the sum cannot overflow.
    pub fn total(&self) -> u64 {
        [self.approve, self.reject, self.escalate, self.flag]
            .into_iter()
            .map(u64::from)
            .sum()
    }

    pub fn get(&self, vote_type: VoteType) -> u32 {
        match vote_type {
            VoteType::Approve => self.approve,
            VoteType::Reject => self.reject,
            VoteType::Escalate => self.escalate,
            VoteType::Flag => self.flag,
        }
    }

    /// Add one vote. A full counter is left unchanged.
    pub(crate) fn increment(&mut self, vote_type: VoteType) -> Result<(), CounterOverflow> {
        let counter = match vote_type {
            VoteType::Approve => &mut self.approve,
            VoteType::Reject => &mut self.reject,
            VoteType::Escalate => &mut self.escalate,
            VoteType::Flag => &mut self.flag,
        };
        *counter = counter
            .checked_add(1)
            .ok_or(CounterOverflow(vote_type))?;
        Ok(())
    }
}

/// What counting one vote did to a tally.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppendOutcome {
    /// Counted; tally state after the vote
    Counted {
        counts: VoteCounts,
        final_decision: Option<Decision>,
    },
    /// Key image already consumed for this submission
    Duplicate,
    /// A closing decision was recorded before this vote
    Closed(Decision),
}

/// Aggregate of accepted votes for a submission.
///
/// Invariant: `seen_key_images.len() == counts.total()`. Key images are
/// append-only for the life of the tally.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tally {
    pub submission_id: SubmissionId,
    pub counts: VoteCounts,
    pub final_decision: Option<Decision>,
    pub seen_key_images: BTreeSet<KeyImage>,
}

impl Tally {
    pub fn new(submission_id: SubmissionId) -> Self {
        Self {
            submission_id,
            counts: VoteCounts::default(),
            final_decision: None,
            seen_key_images: BTreeSet::new(),
        }
    }

    pub fn has_seen(&self, key_image: &KeyImage) -> bool {
        self.seen_key_images.contains(key_image)
    }

    /// Count a vote unless its key image was already consumed.
    ///
    /// `Ok(false)` on a repeated key image. Nothing changes unless `Ok(true)`.
    pub(crate) fn record(
        &mut self,
        vote_type: VoteType,
        key_image: KeyImage,
    ) -> Result<bool, CounterOverflow> {
        if self.has_seen(&key_image) {
            return Ok(false);
        }
        self.counts.increment(vote_type)?;
        self.seen_key_images.insert(key_image);
        Ok(true)
    }

    /// Count a vote and settle the decision.
    ///
    /// Refused after a closing decision or on a repeated key image. Otherwise
    /// `final_decision` is set from the new counts unless already set.
    pub fn apply(
        &mut self,
        vote_type: VoteType,
        key_image: KeyImage,
        policy: &PolicyConfig,
    ) -> Result<AppendOutcome, CounterOverflow> {
        if let Some(decision) = self.final_decision.filter(Decision::closes) {
            return Ok(AppendOutcome::Closed(decision));
        }
        if !self.record(vote_type, key_image)? {
            return Ok(AppendOutcome::Duplicate);
        }
        if self.final_decision.is_none() {
            self.final_decision = policy::evaluate(&self.counts, policy);
        }
        Ok(AppendOutcome::Counted {
            counts: self.counts,
            final_decision: self.final_decision,
        })
    }

    /// Counter/image invariant.
    pub fn is_consistent(&self) -> bool {
        self.seen_key_images.len() as u64 == self.counts.total()
    }
}

/// An accepted vote as handed to the tally store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoteEntry {
    pub submission_id: SubmissionId,
    pub vote_type: VoteType,
    pub key_image: KeyImage,
    pub signature: Signature,
    /// Unix seconds
    pub recorded_at: u64,
}

impl VoteEntry {
    pub fn new(
        submission_id: SubmissionId,
        vote_type: VoteType,
        key_image: KeyImage,
        signature: Signature,
        recorded_at: u64,
    ) -> Self {
        Self {
            submission_id,
            vote_type,
            key_image,
            signature,
            recorded_at,
        }
    }
}

/// A stored vote in the audit trail.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoteRecord {
    /// 1-based acceptance order within the submission
    pub sequence: u64,
    #[serde(flatten)]
    pub entry: VoteEntry,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn image(byte: u8) -> KeyImage {
        KeyImage::from_bytes([byte; 32])
    }

    #[test]
    fn test_record_counts_each_type() {
        let mut tally = Tally::new(SubmissionId(1));
        for (i, vote) in VoteType::ALL.iter().enumerate() {
            assert!(tally.record(*vote, image(i as u8)).unwrap());
        }
        assert_eq!(tally.counts, VoteCounts::new(1, 1, 1, 1));
        assert_eq!(tally.counts.total(), 4);
        assert!(tally.is_consistent());
    }

    #[test]
    fn test_repeated_image_changes_nothing() {
        let mut tally = Tally::new(SubmissionId(1));
        assert!(tally.record(VoteType::Approve, image(1)).unwrap());
        let before = tally.clone();

        // Same reviewer trying a different vote type
        assert!(!tally.record(VoteType::Reject, image(1)).unwrap());
        assert_eq!(tally, before);
        assert!(tally.has_seen(&image(1)));
    }

    #[test]
    fn test_full_counter_refused_without_consuming_image() {
        let mut tally = Tally::new(SubmissionId(1));
        tally.counts.reject = u32::MAX;
        let before = tally.clone();

        assert_eq!(
            tally.record(VoteType::Reject, image(3)),
            Err(CounterOverflow(VoteType::Reject))
        );
        assert_eq!(tally, before);
        assert!(!tally.has_seen(&image(3)));
    }

    #[test]
    fn test_total_does_not_wrap() {
        let counts = VoteCounts::new(u32::MAX, u32::MAX, u32::MAX, u32::MAX);
        assert_eq!(counts.total(), 4 * u64::from(u32::MAX));
    }

    #[test]
    fn test_apply_sets_decision_once() {
        let policy = PolicyConfig::new(1, 2, 0);
        let mut tally = Tally::new(SubmissionId(1));

        let outcome = tally.apply(VoteType::Flag, image(1), &policy).unwrap();
        assert_eq!(
            outcome,
            AppendOutcome::Counted {
                counts: VoteCounts::new(0, 0, 0, 1),
                final_decision: Some(Decision::Flagged),
            }
        );

        // Counted, but flagged stays the decision
        let outcome = tally.apply(VoteType::Approve, image(2), &policy).unwrap();
        assert!(matches!(
            outcome,
            AppendOutcome::Counted {
                final_decision: Some(Decision::Flagged),
                ..
            }
        ));
    }

    #[test]
    fn test_apply_refuses_after_close() {
        let policy = PolicyConfig::new(1, 2, 0);
        let mut tally = Tally::new(SubmissionId(1));
        tally.apply(VoteType::Reject, image(1), &policy).unwrap();
        let before = tally.clone();

        assert_eq!(
            tally.apply(VoteType::Approve, image(2), &policy).unwrap(),
            AppendOutcome::Closed(Decision::Rejected)
        );
        assert_eq!(tally, before);
    }

    #[test]
    fn test_apply_duplicate() {
        let policy = PolicyConfig::default();
        let mut tally = Tally::new(SubmissionId(1));
        tally.apply(VoteType::Approve, image(1), &policy).unwrap();
        assert_eq!(
            tally.apply(VoteType::Approve, image(1), &policy).unwrap(),
            AppendOutcome::Duplicate
        );
    }

    #[test]
    fn test_counts_get_matches_fields() {
        let counts = VoteCounts::new(4, 3, 2, 1);
        assert_eq!(counts.get(VoteType::Approve), 4);
        assert_eq!(counts.get(VoteType::Reject), 3);
        assert_eq!(counts.get(VoteType::Escalate), 2);
        assert_eq!(counts.get(VoteType::Flag), 1);
    }

    #[test]
    fn test_tally_serializes_images_as_hex() {
        let mut tally = Tally::new(SubmissionId(5));
        tally.record(VoteType::Flag, image(0xab)).unwrap();
        let json = serde_json::to_value(&tally).unwrap();
        assert_eq!(json["seen_key_images"][0], "ab".repeat(32));
        assert_eq!(json["submission_id"], 5);
    }

    #[test]
    fn test_vote_record_json_is_flat() {
        let record = VoteRecord {
            sequence: 2,
            entry: VoteEntry::new(
                SubmissionId(5),
                VoteType::Escalate,
                image(1),
                Signature::new(image(1), vec![0xcd]),
                1_700_000_000,
            ),
        };
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["sequence"], 2);
        assert_eq!(json["vote_type"], "escalate");
        assert_eq!(json["recorded_at"], 1_700_000_000u64);
    }
}
