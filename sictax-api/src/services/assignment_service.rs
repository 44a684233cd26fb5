//! Assignment Service
//!
//! Composition root of the claim: runs the [`ClaimCoordinator`] and turns its
//! outcome into the delivered counters and property trees.

use sictax_core::{ClaimFilter, ClaimOutcome, Property};

use crate::auth::CaseworkerIdentity;
use crate::error::ApiResult;
use crate::services::ClaimCoordinator;

/// Counters and payload of a claim that moved at least one assignment.
#[derive(Debug, Clone, PartialEq)]
pub struct DeliveredClaim {
    /// Pending assignments matching the filter when the claim started.
    pub total: u64,
    /// Assignments this claim moved to downloaded.
    pub downloaded: u64,
    /// `total - downloaded`
    pub remaining: u64,
    pub properties: Vec<Property>,
}

/// What a caller gets back from [`AssignmentService::fetch`].
#[derive(Debug, Clone, PartialEq)]
pub enum ClaimResult {
    Delivered(DeliveredClaim),
    /// Nothing was eligible; nothing changed.
    Empty { total_eligible: u64 },
}

impl ClaimResult {
    pub fn is_delivered(&self) -> bool {
        matches!(self, ClaimResult::Delivered(_))
    }
}

#[derive(Clone)]
pub struct AssignmentService {
    coordinator: ClaimCoordinator,
}

impl AssignmentService {
    pub fn new(coordinator: ClaimCoordinator) -> Self {
        Self { coordinator }
    }

    pub fn coordinator(&self) -> &ClaimCoordinator {
        &self.coordinator
    }

    /// Claim the caller's pending batch and return it as a property tree.
    pub async fn fetch(
        &self,
        identity: &CaseworkerIdentity,
        filter: ClaimFilter,
    ) -> ApiResult<ClaimResult> {
        match self.coordinator.claim(identity, filter).await? {
            ClaimOutcome::NothingToClaim { total_eligible } => {
                Ok(ClaimResult::Empty { total_eligible })
            }
            ClaimOutcome::Claimed(batch) => Ok(ClaimResult::Delivered(DeliveredClaim {
                total: batch.total_eligible,
                downloaded: batch.claimed(),
                remaining: batch.remaining(),
                properties: batch.properties,
            })),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sictax_core::{IntegerId, Stage, UserId};
    use sictax_test_utils::assertions::assert_counters_balance;
    use sictax_test_utils::fixtures::{seeded_store, user_seven_scenario, SCENARIO_USER};
    use std::sync::Arc;

    fn service(store: &sictax_test_utils::MockRecordStore) -> AssignmentService {
        AssignmentService::new(ClaimCoordinator::new(Arc::new(store.clone())))
    }

    fn caseworker() -> CaseworkerIdentity {
        CaseworkerIdentity {
            login_name: "lmartinez".to_string(),
            display_name: Some("Laura".to_string()),
            role: Some("Reconocedor".to_string()),
            user_id: Some(UserId::new(SCENARIO_USER)),
        }
    }

    #[tokio::test]
    async fn test_fetch_user_seven_scenario() -> ApiResult<()> {
        let store = seeded_store(user_seven_scenario());
        let filter = ClaimFilter::AssignedTo(UserId::new(SCENARIO_USER));

        let ClaimResult::Delivered(claim) = service(&store).fetch(&caseworker(), filter).await?
        else {
            panic!("expected a delivered claim");
        };

        assert_eq!(claim.total, 3);
        assert_eq!(claim.downloaded, 3);
        assert_eq!(claim.remaining, 0);
        assert_counters_balance(claim.total, claim.downloaded, claim.remaining);
        assert_eq!(claim.properties.len(), 1);
        assert_eq!(claim.properties[0].construccion.len(), 1);
        assert_eq!(store.ids_in_stage(Stage::Pending).len(), 5);
        Ok(())
    }

    #[tokio::test]
    async fn test_fetch_empty_is_not_an_error() -> ApiResult<()> {
        let store = seeded_store(user_seven_scenario());
        let filter = ClaimFilter::AssignedTo(UserId::new(4242));

        let first = service(&store).fetch(&caseworker(), filter).await?;
        let second = service(&store).fetch(&caseworker(), filter).await?;

        assert_eq!(first, ClaimResult::Empty { total_eligible: 0 });
        assert_eq!(first, second);
        assert_eq!(store.ids_in_stage(Stage::Pending).len(), 8);
        Ok(())
    }
}
