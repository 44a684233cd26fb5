//! Claim Coordinator
//!
//! Runs one claim as a single store transaction:
//!
//! 1. lock the pending assignments matching the filter, skipping rows another
//!    claim holds
//! 2. count every pending assignment matching the filter
//! 3. fetch the joined rows of the locked assignments
//! 4. fold the rows into property trees, failing on an inconsistent join
//! 5. move exactly the fetched assignments from pending to downloaded
//! 6. commit
//!
//! Any failure rolls the transaction back. A dropped claim future drops its
//! transaction, which rolls back as well.

use sictax_core::{
    aggregate, AssignmentId, ClaimBatch, ClaimFilter, ClaimOutcome, JoinedRow, SictaxError,
    SictaxResult, Stage, StoreError,
};
use sictax_storage::{ClaimTransaction, RecordStore};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Instant;
use tracing::{info_span, Instrument};

use crate::auth::CaseworkerIdentity;
use crate::error::ApiResult;
use crate::telemetry::metrics::with_metrics;

/// Distinct assignment ids in first-seen order.
fn distinct_assignment_ids(rows: &[JoinedRow]) -> Vec<AssignmentId> {
    let mut seen = HashSet::new();
    rows.iter()
        .map(JoinedRow::assignment_id)
        .filter(|id| seen.insert(*id))
        .collect()
}

/// Orchestrates the transactional pending to downloaded claim.
#[derive(Clone)]
pub struct ClaimCoordinator {
    store: Arc<dyn RecordStore>,
}

impl ClaimCoordinator {
    pub fn new(store: Arc<dyn RecordStore>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &Arc<dyn RecordStore> {
        &self.store
    }

    /// Claim the caller's pending batch.
    ///
    /// # Errors
    /// Store failures surface as retryable server errors; rows that do not fold
    /// into a consistent tree surface as an internal error. Either way nothing
    /// was transitioned.
    pub async fn claim(
        &self,
        identity: &CaseworkerIdentity,
        filter: ClaimFilter,
    ) -> ApiResult<ClaimOutcome> {
        if filter.is_unfiltered() {
            tracing::warn!(
                caller = %identity.login_name,
                "Claiming pending assignments across all caseworkers"
            );
        }

        let span = info_span!("claim", filter = %filter, caller = %identity.login_name);

        async {
            let start = Instant::now();
            let result = self.run(filter).await;
            let elapsed = start.elapsed().as_secs_f64();

            match &result {
                Ok(outcome) => {
                    let claimed = outcome.claimed_ids().len() as u64;
                    with_metrics(|m| m.record_claim(outcome.label(), claimed, elapsed));
                    tracing::info!(
                        outcome = outcome.label(),
                        total = outcome.total_eligible(),
                        claimed,
                        remaining = outcome.total_eligible().saturating_sub(claimed),
                        "Claim finished"
                    );
                }
                Err(e) => {
                    with_metrics(|m| m.record_claim("error", 0, elapsed));
                    tracing::warn!(error = %e, "Claim rolled back");
                }
            }

            result.map_err(Into::into)
        }
        .instrument(span)
        .await
    }

    async fn run(&self, filter: ClaimFilter) -> SictaxResult<ClaimOutcome> {
        let mut tx = self.store.begin().await?;

        let staged = match Self::stage(tx.as_mut(), filter).await {
            Ok(outcome) => outcome,
            Err(e) => {
                Self::rollback_quietly(tx).await;
                return Err(e);
            }
        };

        match staged {
            ClaimOutcome::Claimed(_) => tx.commit().await?,
            ClaimOutcome::NothingToClaim { .. } => tx.rollback().await?,
        }

        Ok(staged)
    }

    /// Every step up to, but not including, commit.
    async fn stage(
        tx: &mut dyn ClaimTransaction,
        filter: ClaimFilter,
    ) -> SictaxResult<ClaimOutcome> {
        // Lock first so every id this claim transitions is also in the count.
        let locked = tx.lock_pending(filter).await?;
        let total_eligible = tx.count_pending(filter).await?;

        if locked.is_empty() {
            return Ok(ClaimOutcome::NothingToClaim { total_eligible });
        }

        let rows = tx.fetch_rows(&locked).await?;
        if rows.is_empty() {
            return Ok(ClaimOutcome::NothingToClaim { total_eligible });
        }

        // Fold before the transition so inconsistent rows stay pending.
        let properties = aggregate(&rows)?;

        let claimed_ids = distinct_assignment_ids(&rows);
        let affected = tx
            .transition(&claimed_ids, Stage::Pending, Stage::Downloaded)
            .await?;
        if affected != claimed_ids.len() as u64 {
            return Err(SictaxError::Store(StoreError::TransitionConflict {
                expected: claimed_ids.len(),
                affected,
            }));
        }

        Ok(ClaimOutcome::Claimed(ClaimBatch {
            total_eligible,
            claimed_ids,
            properties,
        }))
    }

    async fn rollback_quietly(tx: Box<dyn ClaimTransaction>) {
        if let Err(e) = tx.rollback().await {
            tracing::error!(error = %e, "Rollback after failed claim also failed");
        }
    }
}
