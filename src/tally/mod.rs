//! Tallying: counters, decision policy, status machine and the engine that
//! applies votes.

pub mod engine;
pub mod policy;
pub mod record;
pub mod status;

#[cfg(test)]
mod proptests;

pub use engine::{RecordOutcome, TallyEngine, VoteReceipt};
pub use policy::{evaluate, Decision, PolicyConfig, PolicyError};
pub use record::{AppendOutcome, CounterOverflow, Tally, VoteCounts, VoteEntry, VoteRecord};
pub use status::{SubmissionStatus, Transition};
