//! ringtally - anonymous reviewer voting with linkable ring signatures
//!
//! Reviewers vote approve/reject/escalate/flag on content submissions. Each
//! vote is signed with a linkable ring signature over a ring of registered
//! reviewer keys, so:
//!
//! - a vote provably comes from *some* registered reviewer, never revealing which
//! - a reviewer can be counted at most once per submission, detected by the
//!   signature's key image rather than by identity
//!
//! Votes flow registry → codec → signature engine → intake → tally engine →
//! status machine. `board::ReviewBoard` wires these together over injected
//! collaborators.

pub mod ballot;
pub mod board;
pub mod codec;
pub mod crypto;
pub mod error;
pub mod intake;
pub mod registry;
pub mod store;
pub mod tally;
pub mod types;

pub use ballot::{Ballot, BallotError};
pub use board::{ReviewBoard, VoteOutcome};
pub use error::RejectReason;
pub use intake::{VerifiedVote, VoteIntake, VoteRequest};
pub use types::{ReviewerId, Role, SubmissionId, VoteType};
