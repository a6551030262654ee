//! Property-based tests for tallying
//!
//! Tests for:
//! - Counters: image/counter invariant under arbitrary vote streams with replays
//! - Replay: a repeated key image never changes the tally
//! - Policy: flag dominance, quorum gate, decision stability

use super::engine::{RecordOutcome, TallyEngine};
use super::policy::{evaluate, Decision, PolicyConfig};
use super::record::{Tally, VoteCounts, VoteEntry};
use super::status::SubmissionStatus;
use crate::crypto::{KeyImage, Signature};
use crate::store::{MemorySubmissionStore, MemoryTallyStore, Submission};
use crate::types::{SubmissionId, VoteType};
use proptest::prelude::*;
use std::collections::HashSet;
use std::sync::Arc;

fn vote_type() -> impl Strategy<Value = VoteType> {
    prop::sample::select(VoteType::ALL.to_vec())
}

/// Votes drawn from a small image pool so replays are common.
fn vote_stream() -> impl Strategy<Value = Vec<(VoteType, u8)>> {
    prop::collection::vec((vote_type(), 0u8..12), 0..40)
}

fn policy() -> impl Strategy<Value = PolicyConfig> {
    (1u32..8, 0u32..5, 0u32..4).prop_map(|(q, e, m)| PolicyConfig::new(q, e, m))
}

fn runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap()
}

// ============================================================================
// RECORD PROPERTIES
// ============================================================================

proptest! {
    /// Property: |seen_key_images| equals the counter total after every vote
    #[test]
    fn counters_match_images(votes in vote_stream()) {
        let mut tally = Tally::new(SubmissionId(1));
        for (vote, byte) in votes {
            tally.record(vote, KeyImage::from_bytes([byte; 32])).unwrap();
            prop_assert!(tally.is_consistent());
        }
    }

    /// Property: total equals the number of distinct images seen
    #[test]
    fn total_is_distinct_images(votes in vote_stream()) {
        let mut tally = Tally::new(SubmissionId(1));
        let mut distinct = HashSet::new();
        for (vote, byte) in &votes {
            tally.record(*vote, KeyImage::from_bytes([*byte; 32])).unwrap();
            distinct.insert(*byte);
        }
        prop_assert_eq!(tally.counts.total(), distinct.len() as u64);
    }

    /// Property: replaying an already seen image leaves the tally unchanged
    #[test]
    fn replay_is_noop(votes in vote_stream(), replay_vote in vote_type()) {
        let mut tally = Tally::new(SubmissionId(1));
        for (vote, byte) in &votes {
            tally.record(*vote, KeyImage::from_bytes([*byte; 32])).unwrap();
        }
        if let Some((_, byte)) = votes.first() {
            let before = tally.clone();
            prop_assert!(!tally.record(replay_vote, KeyImage::from_bytes([*byte; 32])).unwrap());
            prop_assert_eq!(tally, before);
        }
    }
}

// ============================================================================
// POLICY PROPERTIES
// ============================================================================

proptest! {
    /// Property: any flag yields flagged regardless of other counts
    #[test]
    fn flag_dominates(
        a in 0u32..20, r in 0u32..20, e in 0u32..20, f in 1u32..5,
        policy in policy(),
    ) {
        prop_assert_eq!(
            evaluate(&VoteCounts::new(a, r, e, f), &policy),
            Some(Decision::Flagged)
        );
    }

    /// Property: approve/reject are never decided below quorum
    #[test]
    fn no_majority_below_quorum(
        a in 0u32..10, r in 0u32..10, e in 0u32..10,
        policy in policy(),
    ) {
        let counts = VoteCounts::new(a, r, e, 0);
        let decision = evaluate(&counts, &policy);
        if counts.total() < u64::from(policy.quorum) {
            prop_assert!(matches!(decision, None | Some(Decision::Escalated)));
            if decision == Some(Decision::Escalated) {
                prop_assert!(e > policy.escalation_threshold);
            }
        }
    }

    /// Property: approved/rejected imply a lead strictly above the margin
    #[test]
    fn majority_exceeds_margin(
        a in 0u32..20, r in 0u32..20, e in 0u32..20,
        policy in policy(),
    ) {
        let counts = VoteCounts::new(a, r, e, 0);
        match evaluate(&counts, &policy) {
            Some(Decision::Approved) => prop_assert!(a > r + policy.tie_margin),
            Some(Decision::Rejected) => prop_assert!(r > a + policy.tie_margin),
            _ => {}
        }
    }
}

// ============================================================================
// ENGINE PROPERTIES
// ============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    /// Property: once a decision is recorded it never changes, and the
    /// stored status never returns to voting
    #[test]
    fn decision_is_stable(votes in vote_stream(), policy in policy()) {
        let rt = runtime();
        rt.block_on(async {
            let submissions = MemorySubmissionStore::new();
            submissions.insert_submission(Submission::new(SubmissionId(1), "news", "ref", 0));
            let engine = TallyEngine::new(
                Arc::new(submissions),
                Arc::new(MemoryTallyStore::new()),
                policy,
            );

            let mut decided: Option<Decision> = None;
            let mut accepted = HashSet::new();
            for (vote, byte) in votes {
                let image = KeyImage::from_bytes([byte; 32]);
                let entry = VoteEntry::new(
                    SubmissionId(1),
                    vote,
                    image,
                    Signature::new(image, Vec::new()),
                    0,
                );
                let outcome = engine.record_vote(entry).await.unwrap();

                match outcome {
                    RecordOutcome::Accepted(receipt) => {
                        prop_assert!(accepted.insert(byte), "image accepted twice");
                        prop_assert_ne!(receipt.status, SubmissionStatus::Pending);
                        if let Some(earlier) = decided {
                            prop_assert_eq!(receipt.final_decision, Some(earlier));
                            prop_assert_ne!(receipt.status, SubmissionStatus::Voting);
                        }
                        decided = receipt.final_decision;
                    }
                    RecordOutcome::Rejected(_) => {}
                }
            }

            if let Some(tally) = engine.snapshot(SubmissionId(1)).await.unwrap() {
                prop_assert!(tally.is_consistent());
                prop_assert_eq!(tally.counts.total(), accepted.len() as u64);
            }
            Ok(())
        })?;
    }
}
