//! Integration tests for the full vote flow.
//!
//! Real LSAG signatures, in-memory collaborators:
//! 1. Reviewers enroll keys in the registry
//! 2. Each builds a ring, signs a ballot
//! 3. The board validates and counts it
//! 4. Status and tally are checked after every vote

use futures::future::join_all;
use ringtally::crypto::{Lsag, PublicKey, SecretKey, Seed, Signature};
use ringtally::registry::{InMemoryKeyRegistry, KeyRegistry, ReviewerKey};
use ringtally::store::{
    MemorySubmissionStore, MemoryTallyStore, StoreError, Submission, SubmissionStore,
};
use ringtally::tally::{Decision, PolicyConfig, SubmissionStatus, VoteCounts};
use ringtally::{
    Ballot, RejectReason, ReviewBoard, ReviewerId, Role, SubmissionId, VoteOutcome, VoteRequest,
    VoteType,
};
use std::sync::Arc;

const GENRE: &str = "short-fiction";
const SUBMISSION: SubmissionId = SubmissionId(1);

struct Harness {
    board: Arc<ReviewBoard<Lsag>>,
    registry: InMemoryKeyRegistry,
    submissions: MemorySubmissionStore,
    tallies: MemoryTallyStore,
    reviewers: Vec<(SecretKey, PublicKey)>,
}

fn harness(policy: PolicyConfig, reviewers: u8) -> Harness {
    let registry = InMemoryKeyRegistry::new();
    let reviewers: Vec<_> = (0..reviewers)
        .map(|i| Lsag::derive_keypair(&Seed::from_bytes([i + 1; 32])).unwrap())
        .collect();
    for (i, (_, public)) in reviewers.iter().enumerate() {
        registry
            .publish(ReviewerKey::new(ReviewerId(i as u64), *public, Role::Reviewer))
            .unwrap();
    }

    let submissions = MemorySubmissionStore::new();
    submissions.insert_submission(Submission::new(SUBMISSION, GENRE, "blob://1", 1_000));
    let tallies = MemoryTallyStore::new();

    let board = ReviewBoard::new(
        Arc::new(registry.clone()),
        Arc::new(submissions.clone()),
        Arc::new(tallies.clone()),
        Lsag,
        policy,
    )
    .unwrap();

    Harness {
        board: Arc::new(board),
        registry,
        submissions,
        tallies,
        reviewers,
    }
}

impl Harness {
    /// Ring of every enrolled reviewer, in enrollment order.
    fn ring(&self) -> Vec<PublicKey> {
        self.reviewers.iter().map(|(_, public)| *public).collect()
    }

    fn request(&self, reviewer: usize, submission: SubmissionId, vote: VoteType) -> VoteRequest {
        Ballot::new(submission, GENRE, vote)
            .sign(
                self.board.engine(),
                self.ring(),
                reviewer,
                &self.reviewers[reviewer].0,
            )
            .unwrap()
    }

    async fn cast(&self, reviewer: usize, vote: VoteType) -> VoteOutcome {
        let request = self.request(reviewer, SUBMISSION, vote);
        self.board.cast_vote(&request).await.unwrap()
    }

    async fn status(&self) -> SubmissionStatus {
        self.submissions
            .lookup(SUBMISSION)
            .await
            .unwrap()
            .unwrap()
            .status
    }
}

fn status_of(outcome: VoteOutcome) -> SubmissionStatus {
    match outcome {
        VoteOutcome::Accepted { status, .. } => status,
        VoteOutcome::Rejected { reason } => panic!("vote rejected: {}", reason),
    }
}

fn rejected(reason: RejectReason) -> VoteOutcome {
    VoteOutcome::Rejected { reason }
}

#[tokio::test]
async fn test_approve_approve_reject_reaches_approved() {
    let h = harness(PolicyConfig::new(3, 2, 0), 5);

    assert_eq!(
        status_of(h.cast(0, VoteType::Approve).await),
        SubmissionStatus::Voting
    );
    assert_eq!(
        status_of(h.cast(1, VoteType::Approve).await),
        SubmissionStatus::Voting
    );
    assert_eq!(
        status_of(h.cast(2, VoteType::Reject).await),
        SubmissionStatus::Approved
    );

    assert_eq!(h.status().await, SubmissionStatus::Approved);
    let tally = h.board.get_tally(SUBMISSION).await.unwrap().unwrap();
    assert_eq!(tally.counts, VoteCounts::new(2, 1, 0, 0));
    assert_eq!(tally.final_decision, Some(Decision::Approved));
    assert!(tally.is_consistent());
}

#[tokio::test]
async fn test_one_vote_lead_with_margin_one_escalates() {
    let h = harness(PolicyConfig::new(3, 2, 1), 5);
    h.cast(0, VoteType::Approve).await;
    h.cast(1, VoteType::Approve).await;
    assert_eq!(
        status_of(h.cast(2, VoteType::Reject).await),
        SubmissionStatus::Escalated
    );

    let escalated = h.board.list_escalated().await.unwrap();
    assert_eq!(escalated.len(), 1);
    assert_eq!(escalated[0].id, SUBMISSION);
}

#[tokio::test]
async fn test_lone_flag_bypasses_quorum() {
    let h = harness(PolicyConfig::new(5, 2, 0), 3);
    assert_eq!(
        status_of(h.cast(0, VoteType::Flag).await),
        SubmissionStatus::Flagged
    );

    let flagged = h.board.list_flagged().await.unwrap();
    assert_eq!(flagged.len(), 1);
    let tally = h.board.get_tally(SUBMISSION).await.unwrap().unwrap();
    assert_eq!(tally.final_decision, Some(Decision::Flagged));
}

#[tokio::test]
async fn test_second_vote_from_same_key_rejected() {
    let h = harness(PolicyConfig::default(), 4);
    assert!(h.cast(1, VoteType::Approve).await.is_accepted());

    // Fresh ballot, different vote type, different ring order: same key image
    let mut ring = h.ring();
    ring.reverse();
    let index = ring.iter().position(|k| *k == h.reviewers[1].1).unwrap();
    let request = Ballot::new(SUBMISSION, GENRE, VoteType::Reject)
        .sign(h.board.engine(), ring, index, &h.reviewers[1].0)
        .unwrap();

    let outcome = h.board.cast_vote(&request).await.unwrap();
    assert_eq!(outcome, rejected(RejectReason::DuplicateVote));

    let tally = h.board.get_tally(SUBMISSION).await.unwrap().unwrap();
    assert_eq!(tally.counts, VoteCounts::new(1, 0, 0, 0));
}

#[tokio::test]
async fn test_exact_replay_rejected() {
    let h = harness(PolicyConfig::default(), 4);
    let request = h.request(2, SUBMISSION, VoteType::Escalate);

    assert!(h.board.cast_vote(&request).await.unwrap().is_accepted());
    assert_eq!(
        h.board.cast_vote(&request).await.unwrap(),
        rejected(RejectReason::DuplicateVote)
    );
}

#[tokio::test]
async fn test_same_key_votes_on_each_submission() {
    let h = harness(PolicyConfig::default(), 3);
    let other = SubmissionId(2);
    h.submissions
        .insert_submission(Submission::new(other, GENRE, "blob://2", 2_000));

    let first = h.request(0, SUBMISSION, VoteType::Approve);
    let second = h.request(0, other, VoteType::Approve);
    assert!(h.board.cast_vote(&first).await.unwrap().is_accepted());
    assert!(h.board.cast_vote(&second).await.unwrap().is_accepted());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_duplicates_accepted_once() {
    let h = harness(PolicyConfig::new(10, 10, 0), 4);
    let requests: Vec<_> = (0..8)
        .map(|i| h.request(3, SUBMISSION, VoteType::ALL[i % 3]))
        .collect();

    let outcomes = join_all(requests.iter().map(|r| {
        let board = Arc::clone(&h.board);
        let request = r.clone();
        tokio::spawn(async move { board.cast_vote(&request).await.unwrap() })
    }))
    .await;

    let accepted = outcomes
        .into_iter()
        .map(|joined| joined.unwrap())
        .filter(VoteOutcome::is_accepted)
        .count();
    assert_eq!(accepted, 1);

    let tally = h.board.get_tally(SUBMISSION).await.unwrap().unwrap();
    assert_eq!(tally.counts.total(), 1);
}

#[tokio::test]
async fn test_ring_with_unregistered_key() {
    let h = harness(PolicyConfig::default(), 3);
    let (_, outsider) = Lsag::derive_keypair(&Seed::from_bytes([200; 32])).unwrap();
    let mut ring = h.ring();
    ring.push(outsider);

    let request = Ballot::new(SUBMISSION, GENRE, VoteType::Approve)
        .sign(h.board.engine(), ring, 0, &h.reviewers[0].0)
        .unwrap();
    assert_eq!(
        h.board.cast_vote(&request).await.unwrap(),
        rejected(RejectReason::UnknownRingMember)
    );
    assert!(h.board.get_tally(SUBMISSION).await.unwrap().is_none());
}

#[tokio::test]
async fn test_retired_key_in_ring() {
    let h = harness(PolicyConfig::default(), 3);
    h.registry.retire(ReviewerId(2)).unwrap();
    assert!(!h.registry.is_active(&h.reviewers[2].1).await.unwrap());

    assert_eq!(
        h.cast(0, VoteType::Approve).await,
        rejected(RejectReason::UnknownRingMember)
    );
}

#[tokio::test]
async fn test_genre_mismatch_is_message_mismatch() {
    let h = harness(PolicyConfig::default(), 3);
    let request = Ballot::new(SUBMISSION, "poetry", VoteType::Approve)
        .sign(h.board.engine(), h.ring(), 0, &h.reviewers[0].0)
        .unwrap();
    assert_eq!(
        h.board.cast_vote(&request).await.unwrap(),
        rejected(RejectReason::MessageMismatch)
    );
}

#[tokio::test]
async fn test_signature_from_other_message() {
    let h = harness(PolicyConfig::default(), 3);
    let mut request = h.request(0, SUBMISSION, VoteType::Approve);
    let other = h.request(1, SUBMISSION, VoteType::Approve);
    request.signature = Signature::new(
        request.signature.key_image(),
        other.signature.material().to_vec(),
    );
    assert_eq!(
        h.board.cast_vote(&request).await.unwrap(),
        rejected(RejectReason::InvalidSignature)
    );
}

#[tokio::test]
async fn test_votes_after_close_rejected() {
    let h = harness(PolicyConfig::new(1, 2, 0), 3);
    assert_eq!(
        status_of(h.cast(0, VoteType::Reject).await),
        SubmissionStatus::Rejected
    );
    assert_eq!(
        h.cast(1, VoteType::Approve).await,
        rejected(RejectReason::SubmissionClosed)
    );
}

#[tokio::test]
async fn test_unknown_submission() {
    let h = harness(PolicyConfig::default(), 3);
    let request = h.request(0, SubmissionId(77), VoteType::Approve);
    assert_eq!(
        h.board.cast_vote(&request).await.unwrap(),
        rejected(RejectReason::UnknownSubmission)
    );
}

#[tokio::test]
async fn test_storage_failure_is_error_not_rejection() {
    let h = harness(PolicyConfig::default(), 3);
    h.tallies.set_unavailable(true);
    let request = h.request(0, SUBMISSION, VoteType::Approve);

    let result = h.board.cast_vote(&request).await;
    assert!(matches!(result, Err(StoreError::Unavailable(_))));

    // Nothing was applied; the same ballot counts once storage is back
    h.tallies.set_unavailable(false);
    assert!(h.board.cast_vote(&request).await.unwrap().is_accepted());
}

#[tokio::test]
async fn test_status_write_failure_repaired_by_next_cast() {
    let h = harness(PolicyConfig::new(3, 2, 0), 5);
    h.cast(0, VoteType::Approve).await;
    h.cast(1, VoteType::Approve).await;

    h.submissions.set_read_only(true);
    let request = h.request(2, SUBMISSION, VoteType::Reject);
    assert!(h.board.cast_vote(&request).await.is_err());
    h.submissions.set_read_only(false);
    assert_eq!(h.status().await, SubmissionStatus::Voting);

    // The decision was recorded with the third vote; voting is over
    assert_eq!(
        h.cast(3, VoteType::Reject).await,
        rejected(RejectReason::SubmissionClosed)
    );
    assert_eq!(h.status().await, SubmissionStatus::Approved);

    let tally = h.board.get_tally(SUBMISSION).await.unwrap().unwrap();
    assert_eq!(tally.final_decision, Some(Decision::Approved));
    assert_eq!(tally.counts, VoteCounts::new(2, 1, 0, 0));
}

#[tokio::test]
async fn test_vote_trail_for_escalated_submission() {
    let h = harness(PolicyConfig::new(3, 2, 0), 4);
    let votes = [VoteType::Approve, VoteType::Reject, VoteType::Escalate];
    let mut requests = Vec::new();
    for (reviewer, vote) in votes.iter().enumerate() {
        let request = h.request(reviewer, SUBMISSION, *vote);
        assert!(h.board.cast_vote(&request).await.unwrap().is_accepted());
        requests.push(request);
    }
    // Replay is refused and leaves no trace in the trail
    h.board.cast_vote(&requests[0]).await.unwrap();
    assert_eq!(h.status().await, SubmissionStatus::Escalated);

    let trail = h.board.list_votes(SUBMISSION).await.unwrap();
    assert_eq!(trail.len(), 3);
    for (i, (record, request)) in trail.iter().zip(&requests).enumerate() {
        assert_eq!(record.sequence, i as u64 + 1);
        assert_eq!(record.entry.vote_type, votes[i]);
        assert_eq!(record.entry.signature, request.signature);
        assert_eq!(record.entry.key_image, request.signature.key_image());
    }
}

#[tokio::test]
async fn test_list_escalated_newest_first() {
    let h = harness(PolicyConfig::new(10, 0, 0), 3);
    for (id, created_at) in [(2u64, 5_000u64), (3, 3_000)] {
        h.submissions.insert_submission(Submission::new(
            SubmissionId(id),
            GENRE,
            format!("blob://{}", id),
            created_at,
        ));
    }

    // One escalate vote exceeds threshold 0
    for id in [1u64, 2, 3] {
        let request = h.request(0, SubmissionId(id), VoteType::Escalate);
        assert_eq!(
            status_of(h.board.cast_vote(&request).await.unwrap()),
            SubmissionStatus::Escalated
        );
    }

    let ids: Vec<u64> = h
        .board
        .list_escalated()
        .await
        .unwrap()
        .iter()
        .map(|s| s.id.0)
        .collect();
    assert_eq!(ids, vec![2, 3, 1]);
    assert!(h.board.list_flagged().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_counter_invariant_after_every_vote() {
    let h = harness(PolicyConfig::new(20, 20, 0), 6);
    let votes = [
        VoteType::Approve,
        VoteType::Reject,
        VoteType::Escalate,
        VoteType::Approve,
        VoteType::Reject,
        VoteType::Approve,
    ];
    for (reviewer, vote) in votes.iter().enumerate() {
        assert!(h.cast(reviewer, *vote).await.is_accepted());
        let tally = h.board.get_tally(SUBMISSION).await.unwrap().unwrap();
        assert!(tally.is_consistent());
        assert_eq!(tally.counts.total() as usize, reviewer + 1);
    }
}

#[test]
fn test_zero_quorum_refused_at_construction() {
    let result = ReviewBoard::new(
        Arc::new(InMemoryKeyRegistry::new()),
        Arc::new(MemorySubmissionStore::new()),
        Arc::new(MemoryTallyStore::new()),
        Lsag,
        PolicyConfig::new(0, 2, 0),
    );
    assert!(result.is_err());
}
