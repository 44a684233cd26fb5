//! Assignment entity

use serde::{Deserialize, Serialize};

use crate::error::StageTransitionError;
use crate::identity::{AssignmentId, PropertyId, Timestamp, UserId};
use crate::stage::Stage;

/// One caseworker task over one property.
///
/// Created upstream in [`Stage::Pending`]. This crate only ever moves it to
/// [`Stage::Downloaded`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Assignment {
    pub assignment_id: AssignmentId,
    pub property_id: PropertyId,
    pub stage: Stage,
    pub assigned_by: UserId,
    pub assigned_to: Option<UserId>,
    pub assigned_at: Timestamp,
    pub unassigned_at: Option<Timestamp>,
}

impl Assignment {
    pub fn is_claimable(&self) -> bool {
        self.stage.is_claimable()
    }

    /// Apply the claim transition in place.
    pub fn mark_downloaded(&mut self) -> Result<(), StageTransitionError> {
        self.stage = self.stage.transition_to(Stage::Downloaded)?;
        Ok(())
    }
}
