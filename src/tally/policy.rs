//! Decision policy.
//!
//! A pure function of the current counters. Evaluated after every accepted
//! vote:
//!
//! 1. any flag                                   → flagged (ignores quorum)
//! 2. escalate > escalation_threshold            → escalated
//! 3. N ≥ quorum and |approve − reject| ≤ margin → escalated
//! 4. N ≥ quorum and one side leads by > margin  → approved / rejected
//! 5. otherwise                                  → still voting
//!
//! "Exceeds" is strict, the tie margin is inclusive.

use super::record::VoteCounts;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Outcome the policy can reach.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Decision {
    Approved,
    Rejected,
    Escalated,
    Flagged,
}

impl Decision {
    pub fn code(&self) -> &'static str {
        match self {
            Decision::Approved => "approved",
            Decision::Rejected => "rejected",
            Decision::Escalated => "escalated",
            Decision::Flagged => "flagged",
        }
    }

    /// Approved and rejected close the submission to further votes.
    pub fn closes(&self) -> bool {
        matches!(self, Decision::Approved | Decision::Rejected)
    }
}

impl fmt::Display for Decision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

impl FromStr for Decision {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "approved" => Ok(Decision::Approved),
            "rejected" => Ok(Decision::Rejected),
            "escalated" => Ok(Decision::Escalated),
            "flagged" => Ok(Decision::Flagged),
            other => Err(format!("unknown decision: {}", other)),
        }
    }
}

/// Policy configuration errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PolicyError {
    #[error("quorum must be at least 1")]
    ZeroQuorum,
}

/// Thresholds for the decision policy (external configuration).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PolicyConfig {
    /// Votes needed before approve/reject can be decided
    pub quorum: u32,
    /// Escalate votes above this count escalate regardless of quorum
    pub escalation_threshold: u32,
    /// |approve − reject| at or below this at quorum is a tie
    pub tie_margin: u32,
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            quorum: 3,
            escalation_threshold: 2,
            tie_margin: 0,
        }
    }
}

impl PolicyConfig {
    pub fn new(quorum: u32, escalation_threshold: u32, tie_margin: u32) -> Self {
        Self {
            quorum,
            escalation_threshold,
            tie_margin,
        }
    }

    pub fn validate(&self) -> Result<(), PolicyError> {
        if self.quorum == 0 {
            return Err(PolicyError::ZeroQuorum);
        }
        Ok(())
    }
}

/// Evaluate the policy. `None` means keep voting.
pub fn evaluate(counts: &VoteCounts, policy: &PolicyConfig) -> Option<Decision> {
    if counts.flag >= 1 {
        return Some(Decision::Flagged);
    }

    if counts.escalate > policy.escalation_threshold {
        return Some(Decision::Escalated);
    }

    if counts.total() < u64::from(policy.quorum) {
        return None;
    }

    let spread = counts.approve.abs_diff(counts.reject);
    if spread <= policy.tie_margin {
        Some(Decision::Escalated)
    } else if counts.approve > counts.reject {
        Some(Decision::Approved)
    } else {
        Some(Decision::Rejected)
    }
}
