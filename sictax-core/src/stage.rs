//! Workflow stages of an assignment.
//!
//! Stages live in `sictax_tramitesdb.etapas` and are referenced by integer
//! code. This crate drives exactly one edge of that workflow:
//!
//! ```text
//! Pending (13) ─── claim ──→ Downloaded (14)
//! ```
//!
//! Every other code is carried through untouched as [`Stage::Other`].

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::StageTransitionError;

/// Stage code of an assignment waiting to be claimed.
pub const STAGE_PENDING: i32 = 13;

/// Stage code of an assignment already delivered to a caseworker.
pub const STAGE_DOWNLOADED: i32 = 14;

/// Position of an assignment in the case workflow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "i32", into = "i32")]
pub enum Stage {
    /// Waiting for a caseworker to claim it
    Pending,
    /// Claimed and delivered to a caseworker
    Downloaded,
    /// Any stage outside the claim workflow
    Other(i32),
}

impl Stage {
    /// Database code for this stage.
    pub fn code(&self) -> i32 {
        match self {
            Stage::Pending => STAGE_PENDING,
            Stage::Downloaded => STAGE_DOWNLOADED,
            Stage::Other(code) => *code,
        }
    }

    /// Map a database code onto a stage.
    pub fn from_code(code: i32) -> Self {
        match code {
            STAGE_PENDING => Stage::Pending,
            STAGE_DOWNLOADED => Stage::Downloaded,
            other => Stage::Other(other),
        }
    }

    /// Whether this assignment can still be claimed.
    pub fn is_claimable(&self) -> bool {
        matches!(self, Stage::Pending)
    }

    /// Validate a transition requested by this crate.
    ///
    /// Only `Pending → Downloaded` is accepted.
    pub fn transition_to(self, target: Stage) -> Result<Stage, StageTransitionError> {
        match (self, target) {
            (Stage::Pending, Stage::Downloaded) => Ok(Stage::Downloaded),
            (from, to) => Err(StageTransitionError {
                from: from.code(),
                to: to.code(),
            }),
        }
    }
}

impl From<i32> for Stage {
    fn from(code: i32) -> Self {
        Stage::from_code(code)
    }
}

impl From<Stage> for i32 {
    fn from(stage: Stage) -> Self {
        stage.code()
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stage::Pending => write!(f, "pending({})", STAGE_PENDING),
            Stage::Downloaded => write!(f, "downloaded({})", STAGE_DOWNLOADED),
            Stage::Other(code) => write!(f, "stage({})", code),
        }
    }
}
