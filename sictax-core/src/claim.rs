//! Claim filter and claim results

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::entities::Assignment;
use crate::identity::{AssignmentId, UserId};
use crate::property::Property;

/// Which pending assignments a claim may take.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ClaimFilter {
    /// Administrative mode: every pending assignment regardless of owner.
    AllCaseworkers,
    /// Only assignments whose `usuario_asignado` is this user.
    AssignedTo(UserId),
}

impl ClaimFilter {
    /// The user restriction, if any.
    pub fn assigned_user(&self) -> Option<UserId> {
        match self {
            ClaimFilter::AllCaseworkers => None,
            ClaimFilter::AssignedTo(user) => Some(*user),
        }
    }

    /// Whether an assignment owned by `assigned_to` falls under this filter.
    pub fn matches(&self, assigned_to: Option<UserId>) -> bool {
        match self {
            ClaimFilter::AllCaseworkers => true,
            ClaimFilter::AssignedTo(user) => assigned_to == Some(*user),
        }
    }

    /// Whether this filter selects `assignment` for claiming.
    pub fn selects(&self, assignment: &Assignment) -> bool {
        assignment.is_claimable() && self.matches(assignment.assigned_to)
    }

    pub fn is_unfiltered(&self) -> bool {
        matches!(self, ClaimFilter::AllCaseworkers)
    }
}

impl fmt::Display for ClaimFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ClaimFilter::AllCaseworkers => write!(f, "all"),
            ClaimFilter::AssignedTo(user) => write!(f, "user:{}", user),
        }
    }
}

/// Result of a successful claim, before aggregation.
#[derive(Debug, Clone, PartialEq)]
pub struct ClaimBatch {
    /// Pending assignments matching the filter, counted before the transition.
    pub total_eligible: u64,
    /// Assignments moved to downloaded by this claim, in first-seen order.
    pub claimed_ids: Vec<AssignmentId>,
    /// Claimed rows folded into property trees, in first-seen order.
    pub properties: Vec<Property>,
}

impl ClaimBatch {
    pub fn claimed(&self) -> u64 {
        self.claimed_ids.len() as u64
    }

    /// Pending work left for the filter right after commit.
    pub fn remaining(&self) -> u64 {
        self.total_eligible.saturating_sub(self.claimed())
    }
}

/// Outcome of one claim attempt.
#[derive(Debug, Clone, PartialEq)]
pub enum ClaimOutcome {
    Claimed(ClaimBatch),
    /// No rows were eligible; nothing was changed.
    NothingToClaim { total_eligible: u64 },
}

impl ClaimOutcome {
    pub fn total_eligible(&self) -> u64 {
        match self {
            ClaimOutcome::Claimed(batch) => batch.total_eligible,
            ClaimOutcome::NothingToClaim { total_eligible } => *total_eligible,
        }
    }

    pub fn claimed_ids(&self) -> &[AssignmentId] {
        match self {
            ClaimOutcome::Claimed(batch) => &batch.claimed_ids,
            ClaimOutcome::NothingToClaim { .. } => &[],
        }
    }

    /// Label used for metrics and logs.
    pub fn label(&self) -> &'static str {
        match self {
            ClaimOutcome::Claimed(_) => "claimed",
            ClaimOutcome::NothingToClaim { .. } => "empty",
        }
    }
}
