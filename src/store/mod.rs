//! Submission and tally storage.
//!
//! - `traits`: the collaborator interfaces the vote path consumes
//! - `memory`: in-process adapters
//! - `sqlite`: SQLite adapter via `sqlx`

pub mod memory;
pub mod sqlite;
pub mod traits;

pub use memory::{MemorySubmissionStore, MemoryTallyStore};
pub use sqlite::SqliteStore;
pub use traits::{StoreError, StoreResult, Submission, SubmissionStore, TallyStore};
