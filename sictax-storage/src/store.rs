//! Record store seam for the claim pipeline.
//!
//! The claim runs as a single transaction. A [`RecordStore`] hands out
//! [`ClaimTransaction`]s; each one owns its backend session until
//! [`ClaimTransaction::commit`] or [`ClaimTransaction::rollback`] consumes it.
//! Dropping an unfinished transaction must roll it back.

use ::async_trait::async_trait;
use sictax_core::{AssignmentId, ClaimFilter, JoinedRow, Stage, StoreResult};

/// Source of claim transactions.
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Open a new transaction.
    async fn begin(&self) -> StoreResult<Box<dyn ClaimTransaction>>;

    /// Round-trip to the backend for readiness checks.
    async fn ping(&self) -> StoreResult<()>;
}

/// One open claim transaction.
///
/// Stage changes made through [`transition`](Self::transition) are invisible
/// to other transactions until commit.
#[async_trait]
pub trait ClaimTransaction: Send {
    /// Lock every pending assignment matching `filter` that no other open
    /// transaction holds, skipping the ones that are held.
    ///
    /// Returns the locked ids in ascending order. Only these ids may be
    /// fetched and transitioned by this transaction.
    async fn lock_pending(&mut self, filter: ClaimFilter) -> StoreResult<Vec<AssignmentId>>;

    /// Count committed pending assignments matching `filter`, locked or not.
    async fn count_pending(&mut self, filter: ClaimFilter) -> StoreResult<u64>;

    /// Joined rows for the given assignments that are still pending.
    ///
    /// Rows are ordered by assignment id, then construction, then unit.
    async fn fetch_rows(&mut self, ids: &[AssignmentId]) -> StoreResult<Vec<JoinedRow>>;

    /// Move `ids` from stage `from` to stage `to`, touching only rows that are
    /// currently in `from`. Returns the number of rows changed.
    async fn transition(&mut self, ids: &[AssignmentId], from: Stage, to: Stage)
        -> StoreResult<u64>;

    /// Make every change of this transaction visible.
    async fn commit(self: Box<Self>) -> StoreResult<()>;

    /// Discard every change of this transaction and release its locks.
    async fn rollback(self: Box<Self>) -> StoreResult<()>;
}
