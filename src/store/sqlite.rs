//! SQLite adapter.
//!
//! Tables:
//!
//! ```text
//! submissions       (id PK, genre, status, content_ref, created_at)
//! tallies           (submission_id PK, count_approve, count_reject,
//!                    count_escalate, count_flag, final_decision)
//! tally_key_images  (submission_id, key_image, PK(submission_id, key_image))
//! tally_votes       (submission_id, sequence, vote_type, key_image,
//!                    signature, recorded_at, PK(submission_id, sequence))
//! ```
//!
//! `append` runs one transaction per vote. Its first statement is a write, so
//! the transaction holds the database write lock before it reads the tally.
//! The key image is inserted without `OR IGNORE`; the composite primary key
//! rejects a replay even when several processes share the file. Counters are
//! incremented in place, never overwritten.

use super::memory::sort_newest_first;
use super::traits::*;
use crate::crypto::{KeyImage, Signature};
use crate::tally::{
    evaluate, AppendOutcome, Decision, PolicyConfig, SubmissionStatus, Tally, VoteCounts,
    VoteEntry, VoteRecord,
};
use crate::types::{SubmissionId, VoteType};
use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteRow};
use sqlx::{Row, SqlitePool};
use std::path::Path;
use std::str::FromStr;

const SCHEMA: [&str; 5] = [
    "CREATE TABLE IF NOT EXISTS submissions (
        id INTEGER PRIMARY KEY,
        genre TEXT NOT NULL,
        status TEXT NOT NULL,
        content_ref TEXT NOT NULL,
        created_at INTEGER NOT NULL
    )",
    "CREATE INDEX IF NOT EXISTS submissions_by_status
        ON submissions (status, created_at DESC, id DESC)",
    "CREATE TABLE IF NOT EXISTS tallies (
        submission_id INTEGER PRIMARY KEY,
        count_approve INTEGER NOT NULL DEFAULT 0,
        count_reject INTEGER NOT NULL DEFAULT 0,
        count_escalate INTEGER NOT NULL DEFAULT 0,
        count_flag INTEGER NOT NULL DEFAULT 0,
        final_decision TEXT
    )",
    "CREATE TABLE IF NOT EXISTS tally_key_images (
        submission_id INTEGER NOT NULL,
        key_image BLOB NOT NULL,
        PRIMARY KEY (submission_id, key_image)
    )",
    "CREATE TABLE IF NOT EXISTS tally_votes (
        submission_id INTEGER NOT NULL,
        sequence INTEGER NOT NULL,
        vote_type TEXT NOT NULL,
        key_image BLOB NOT NULL,
        signature BLOB NOT NULL,
        recorded_at INTEGER NOT NULL,
        PRIMARY KEY (submission_id, sequence)
    )",
];

/// Submission and tally store on one SQLite database.
#[derive(Debug, Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Open (creating if missing) a database file and apply the schema.
    pub async fn open(path: &Path) -> StoreResult<Self> {
        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal);

        let pool = SqlitePoolOptions::new()
            .max_connections(4)
            .connect_with(options)
            .await?;

        let store = Self { pool };
        store.migrate().await?;
        Ok(store)
    }

    /// Private in-memory database. One connection, kept alive for the life of
    /// the pool so the data is not dropped.
    pub async fn in_memory() -> StoreResult<Self> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")?;
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await?;

        let store = Self { pool };
        store.migrate().await?;
        Ok(store)
    }

    pub async fn migrate(&self) -> StoreResult<()> {
        for statement in SCHEMA {
            sqlx::query(statement).execute(&self.pool).await?;
        }
        Ok(())
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Insert or replace a submission (external writes, simulator setup).
    pub async fn insert_submission(&self, submission: &Submission) -> StoreResult<()> {
        sqlx::query(
            "INSERT OR REPLACE INTO submissions (id, genre, status, content_ref, created_at)
             VALUES (?, ?, ?, ?, ?)",
        )
        .bind(sql_id(submission.id)?)
        .bind(&submission.genre)
        .bind(submission.status.code())
        .bind(&submission.content_ref)
        .bind(sql_time(submission.created_at)?)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// One past the highest stored submission id.
    pub async fn next_submission_id(&self) -> StoreResult<SubmissionId> {
        let max: i64 = sqlx::query_scalar("SELECT COALESCE(MAX(id), 0) FROM submissions")
            .fetch_one(&self.pool)
            .await?;
        let next = u64::try_from(max)
            .map_err(|_| StoreError::Corrupt(format!("negative submission id {}", max)))?;
        Ok(SubmissionId(next + 1))
    }
}

fn sql_id(id: SubmissionId) -> StoreResult<i64> {
    i64::try_from(id.0)
        .map_err(|_| StoreError::Corrupt(format!("submission id {} out of range", id)))
}

fn sql_time(secs: u64) -> StoreResult<i64> {
    i64::try_from(secs).map_err(|_| StoreError::Corrupt(format!("timestamp {} out of range", secs)))
}

fn counter(row: &SqliteRow, column: &str) -> StoreResult<u32> {
    let value: i64 = row.try_get(column)?;
    u32::try_from(value).map_err(|_| StoreError::Corrupt(format!("{} = {}", column, value)))
}

fn row_counts(row: &SqliteRow) -> StoreResult<VoteCounts> {
    Ok(VoteCounts::new(
        counter(row, "count_approve")?,
        counter(row, "count_reject")?,
        counter(row, "count_escalate")?,
        counter(row, "count_flag")?,
    ))
}

fn row_decision(row: &SqliteRow) -> StoreResult<Option<Decision>> {
    let code: Option<String> = row.try_get("final_decision")?;
    code.map(|code| code.parse::<Decision>())
        .transpose()
        .map_err(StoreError::Corrupt)
}

fn key_image(bytes: &[u8]) -> StoreResult<KeyImage> {
    KeyImage::from_slice(bytes).map_err(|e| StoreError::Corrupt(format!("key image: {}", e)))
}

/// Bump one counter and settle `final_decision`.
fn increment_statement(vote_type: VoteType) -> &'static str {
    match vote_type {
        VoteType::Approve => {
            "UPDATE tallies SET count_approve = count_approve + 1, final_decision = ?
             WHERE submission_id = ?"
        }
        VoteType::Reject => {
            "UPDATE tallies SET count_reject = count_reject + 1, final_decision = ?
             WHERE submission_id = ?"
        }
        VoteType::Escalate => {
            "UPDATE tallies SET count_escalate = count_escalate + 1, final_decision = ?
             WHERE submission_id = ?"
        }
        VoteType::Flag => {
            "UPDATE tallies SET count_flag = count_flag + 1, final_decision = ?
             WHERE submission_id = ?"
        }
    }
}

fn row_to_vote(id: SubmissionId, row: &SqliteRow) -> StoreResult<VoteRecord> {
    let sequence: i64 = row.try_get("sequence")?;
    let vote_type: String = row.try_get("vote_type")?;
    let image: Vec<u8> = row.try_get("key_image")?;
    let material: Vec<u8> = row.try_get("signature")?;
    let recorded_at: i64 = row.try_get("recorded_at")?;

    let image = key_image(&image)?;
    Ok(VoteRecord {
        sequence: u64::try_from(sequence)
            .map_err(|_| StoreError::Corrupt(format!("vote sequence {}", sequence)))?,
        entry: VoteEntry::new(
            id,
            vote_type.parse().map_err(StoreError::Corrupt)?,
            image,
            Signature::new(image, material),
            u64::try_from(recorded_at)
                .map_err(|_| StoreError::Corrupt(format!("recorded_at {}", recorded_at)))?,
        ),
    })
}

fn row_to_submission(row: &SqliteRow) -> StoreResult<Submission> {
    let id: i64 = row.try_get("id")?;
    let created_at: i64 = row.try_get("created_at")?;
    let status: String = row.try_get("status")?;

    Ok(Submission {
        id: SubmissionId(
            u64::try_from(id).map_err(|_| StoreError::Corrupt(format!("submission id {}", id)))?,
        ),
        genre: row.try_get("genre")?,
        status: status.parse().map_err(StoreError::Corrupt)?,
        content_ref: row.try_get("content_ref")?,
        created_at: u64::try_from(created_at)
            .map_err(|_| StoreError::Corrupt(format!("created_at {}", created_at)))?,
    })
}

#[async_trait]
impl SubmissionStore for SqliteStore {
    async fn lookup(&self, id: SubmissionId) -> StoreResult<Option<Submission>> {
        let row = sqlx::query(
            "SELECT id, genre, status, content_ref, created_at FROM submissions WHERE id = ?",
        )
        .bind(sql_id(id)?)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(row_to_submission).transpose()
    }

    async fn set_status(&self, id: SubmissionId, status: SubmissionStatus) -> StoreResult<()> {
        let result = sqlx::query("UPDATE submissions SET status = ? WHERE id = ?")
            .bind(status.code())
            .bind(sql_id(id)?)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::UnknownSubmission(id));
        }
        Ok(())
    }

    async fn list_by_status(&self, status: SubmissionStatus) -> StoreResult<Vec<Submission>> {
        let rows = sqlx::query(
            "SELECT id, genre, status, content_ref, created_at FROM submissions
             WHERE status = ? ORDER BY created_at DESC, id DESC",
        )
        .bind(status.code())
        .fetch_all(&self.pool)
        .await?;

        let mut submissions = rows
            .iter()
            .map(row_to_submission)
            .collect::<StoreResult<Vec<_>>>()?;
        sort_newest_first(&mut submissions);
        Ok(submissions)
    }
}

#[async_trait]
impl TallyStore for SqliteStore {
    async fn load(&self, id: SubmissionId) -> StoreResult<Option<Tally>> {
        let key = sql_id(id)?;
        let row = sqlx::query(
            "SELECT count_approve, count_reject, count_escalate, count_flag, final_decision
             FROM tallies WHERE submission_id = ?",
        )
        .bind(key)
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        let images: Vec<Vec<u8>> =
            sqlx::query_scalar("SELECT key_image FROM tally_key_images WHERE submission_id = ?")
                .bind(key)
                .fetch_all(&self.pool)
                .await?;

        let mut tally = Tally::new(id);
        tally.counts = row_counts(&row)?;
        tally.final_decision = row_decision(&row)?;
        for bytes in images {
            tally.seen_key_images.insert(key_image(&bytes)?);
        }
        Ok(Some(tally))
    }

    async fn append(
        &self,
        entry: &VoteEntry,
        policy: &PolicyConfig,
    ) -> StoreResult<AppendOutcome> {
        let key = sql_id(entry.submission_id)?;
        let mut tx = self.pool.begin().await?;

        sqlx::query("INSERT INTO tallies (submission_id) VALUES (?) ON CONFLICT DO NOTHING")
            .bind(key)
            .execute(&mut *tx)
            .await?;

        let row = sqlx::query(
            "SELECT count_approve, count_reject, count_escalate, count_flag, final_decision
             FROM tallies WHERE submission_id = ?",
        )
        .bind(key)
        .fetch_one(&mut *tx)
        .await?;
        let mut counts = row_counts(&row)?;
        let recorded = row_decision(&row)?;

        if let Some(decision) = recorded.filter(Decision::closes) {
            tx.rollback().await?;
            return Ok(AppendOutcome::Closed(decision));
        }

        let inserted =
            sqlx::query("INSERT INTO tally_key_images (submission_id, key_image) VALUES (?, ?)")
                .bind(key)
                .bind(entry.key_image.as_bytes().to_vec())
                .execute(&mut *tx)
                .await;
        match inserted {
            Ok(_) => {}
            Err(sqlx::Error::Database(e)) if e.is_unique_violation() => {
                tx.rollback().await?;
                return Ok(AppendOutcome::Duplicate);
            }
            Err(e) => return Err(e.into()),
        }

        counts.increment(entry.vote_type)?;
        let final_decision = recorded.or_else(|| evaluate(&counts, policy));

        sqlx::query(increment_statement(entry.vote_type))
            .bind(final_decision.map(|d| d.code()))
            .bind(key)
            .execute(&mut *tx)
            .await?;

        let sequence = i64::try_from(counts.total())
            .map_err(|_| StoreError::Corrupt(format!("vote sequence {}", counts.total())))?;
        sqlx::query(
            "INSERT INTO tally_votes
                (submission_id, sequence, vote_type, key_image, signature, recorded_at)
             VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(key)
        .bind(sequence)
        .bind(entry.vote_type.code())
        .bind(entry.key_image.as_bytes().to_vec())
        .bind(entry.signature.material().to_vec())
        .bind(sql_time(entry.recorded_at)?)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(AppendOutcome::Counted {
            counts,
            final_decision,
        })
    }

    async fn votes(&self, id: SubmissionId) -> StoreResult<Vec<VoteRecord>> {
        let rows = sqlx::query(
            "SELECT sequence, vote_type, key_image, signature, recorded_at FROM tally_votes
             WHERE submission_id = ? ORDER BY sequence",
        )
        .bind(sql_id(id)?)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(|row| row_to_vote(id, row)).collect()
    }
}
