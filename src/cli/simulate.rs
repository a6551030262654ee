//! End-to-end voting simulation.
//!
//! Enrolls `reviewers` fresh keys, creates one submission and casts the given
//! votes through the full protocol (ring selection, signing, intake, tally).
//! Vote `i` is cast by reviewer `i % reviewers`, so listing more votes than
//! reviewers shows replay rejection. Prints a JSON report.

use super::config::RingtallyConfig;
use rand::rngs::OsRng;
use ringtally::crypto::{Lsag, PublicKey, SecretKey};
use ringtally::registry::{choose_ring, InMemoryKeyRegistry, KeyRegistry, ReviewerKey};
use ringtally::store::{
    MemorySubmissionStore, MemoryTallyStore, SqliteStore, Submission, SubmissionStore, TallyStore,
};
use ringtally::tally::{PolicyConfig, Tally};
use ringtally::{Ballot, ReviewBoard, ReviewerId, Role, SubmissionId, VoteOutcome, VoteType};
use serde::Serialize;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::info;

pub struct SimulateArgs {
    pub reviewers: usize,
    pub ring_size: usize,
    pub genre: String,
    pub votes: Vec<VoteType>,
}

#[derive(Debug, Serialize)]
struct CastRecord {
    vote_type: VoteType,
    ring_size: usize,
    #[serde(flatten)]
    outcome: VoteOutcome,
}

#[derive(Debug, Serialize)]
struct SimulationReport {
    policy: PolicyConfig,
    submission: Option<Submission>,
    votes: Vec<CastRecord>,
    tally: Option<Tally>,
}

pub async fn execute(
    config: &RingtallyConfig,
    args: SimulateArgs,
) -> Result<(), Box<dyn std::error::Error>> {
    let report = run(config, args).await?;
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

async fn run(
    config: &RingtallyConfig,
    args: SimulateArgs,
) -> Result<SimulationReport, Box<dyn std::error::Error>> {
    if args.reviewers < 2 {
        return Err("simulation needs at least 2 reviewers".into());
    }

    let registry = InMemoryKeyRegistry::new();
    let mut reviewers: Vec<(SecretKey, PublicKey)> = Vec::with_capacity(args.reviewers);
    for i in 0..args.reviewers {
        let (_seed, secret, public) = Lsag::generate_keypair()?;
        registry.publish(ReviewerKey::new(ReviewerId(i as u64), public, Role::Reviewer))?;
        reviewers.push((secret, public));
    }

    let created_at = SystemTime::now().duration_since(UNIX_EPOCH)?.as_secs();
    let submissions: Arc<dyn SubmissionStore>;
    let tallies: Arc<dyn TallyStore>;
    let submission_id;
    match &config.storage.database {
        Some(path) => {
            let store = SqliteStore::open(path).await?;
            submission_id = store.next_submission_id().await?;
            store
                .insert_submission(&Submission::new(
                    submission_id,
                    &args.genre,
                    "simulation",
                    created_at,
                ))
                .await?;
            info!(database = %path.display(), %submission_id, "using SQLite store");
            submissions = Arc::new(store.clone());
            tallies = Arc::new(store);
        }
        None => {
            let store = MemorySubmissionStore::new();
            submission_id = SubmissionId(1);
            store.insert_submission(Submission::new(
                submission_id,
                &args.genre,
                "simulation",
                created_at,
            ));
            submissions = Arc::new(store);
            tallies = Arc::new(MemoryTallyStore::new());
        }
    }

    let board = ReviewBoard::new(
        Arc::new(registry.clone()),
        Arc::clone(&submissions),
        tallies,
        Lsag,
        config.policy,
    )?;

    let candidates = registry.all_active_keys().await?;
    let mut records = Vec::with_capacity(args.votes.len());
    for (i, vote_type) in args.votes.iter().copied().enumerate() {
        let (secret, public) = &reviewers[i % reviewers.len()];
        let (ring, index) = choose_ring(&candidates, *public, args.ring_size, &mut OsRng)?;
        let ring_size = ring.len();

        let request = Ballot::new(submission_id, &args.genre, vote_type).sign(
            board.engine(),
            ring,
            index,
            secret,
        )?;
        let outcome = board.cast_vote(&request).await?;
        records.push(CastRecord {
            vote_type,
            ring_size,
            outcome,
        });
    }

    Ok(SimulationReport {
        policy: *board.policy(),
        submission: submissions.lookup(submission_id).await?,
        votes: records,
        tally: board.get_tally(submission_id).await?,
    })
}
