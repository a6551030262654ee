//! Submission status state machine.
//!
//! ```text
//! pending ──first accepted vote──▶ voting ──policy──▶ approved | rejected | escalated | flagged
//! ```
//!
//! Only policy evaluation moves a submission out of `voting`. Once out of
//! `voting` a submission never moves again through this machine; escalated and
//! flagged are resolved by administrators outside the core.

use super::policy::Decision;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubmissionStatus {
    Pending,
    Voting,
    Approved,
    Rejected,
    Escalated,
    Flagged,
}

impl SubmissionStatus {
    pub fn code(&self) -> &'static str {
        match self {
            SubmissionStatus::Pending => "pending",
            SubmissionStatus::Voting => "voting",
            SubmissionStatus::Approved => "approved",
            SubmissionStatus::Rejected => "rejected",
            SubmissionStatus::Escalated => "escalated",
            SubmissionStatus::Flagged => "flagged",
        }
    }

    /// Closed submissions accept no further votes.
    pub fn is_closed(&self) -> bool {
        matches!(self, SubmissionStatus::Approved | SubmissionStatus::Rejected)
    }

    /// Out of `voting` for good, as far as the core is concerned.
    pub fn is_terminal(&self) -> bool {
        self.decision().is_some()
    }

    pub fn decision(&self) -> Option<Decision> {
        match self {
            SubmissionStatus::Approved => Some(Decision::Approved),
            SubmissionStatus::Rejected => Some(Decision::Rejected),
            SubmissionStatus::Escalated => Some(Decision::Escalated),
            SubmissionStatus::Flagged => Some(Decision::Flagged),
            SubmissionStatus::Pending | SubmissionStatus::Voting => None,
        }
    }

    /// Status after an accepted vote, given the policy result.
    ///
    /// Returns `None` when the status does not change.
    pub fn advance(self, decision: Option<Decision>) -> Option<Transition> {
        let to = match (self, decision) {
            (SubmissionStatus::Pending, None) => SubmissionStatus::Voting,
            (SubmissionStatus::Pending | SubmissionStatus::Voting, Some(decision)) => {
                decision.into()
            }
            // Still voting, or already terminal
            _ => return None,
        };
        Some(Transition { from: self, to })
    }
}

impl From<Decision> for SubmissionStatus {
    fn from(decision: Decision) -> Self {
        match decision {
            Decision::Approved => SubmissionStatus::Approved,
            Decision::Rejected => SubmissionStatus::Rejected,
            Decision::Escalated => SubmissionStatus::Escalated,
            Decision::Flagged => SubmissionStatus::Flagged,
        }
    }
}

impl fmt::Display for SubmissionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

impl FromStr for SubmissionStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(SubmissionStatus::Pending),
            "voting" => Ok(SubmissionStatus::Voting),
            "approved" => Ok(SubmissionStatus::Approved),
            "rejected" => Ok(SubmissionStatus::Rejected),
            "escalated" => Ok(SubmissionStatus::Escalated),
            "flagged" => Ok(SubmissionStatus::Flagged),
            other => Err(format!("unknown submission status: {}", other)),
        }
    }
}

/// A status change requested from the submission store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
    pub from: SubmissionStatus,
    pub to: SubmissionStatus,
}
