//! In-memory record store for tests.
//!
//! Behaves like the PostgreSQL store under read committed isolation:
//! - `lock_pending` takes row locks and skips rows another open transaction
//!   holds.
//! - Stage changes are buffered per transaction and applied on commit.
//! - Rollback, a failed commit or dropping the transaction releases its locks
//!   and discards its changes.
//!
//! Every operation yields to the scheduler first so concurrent claims
//! interleave. Faults can be injected at each step.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use ::async_trait::async_trait;
use sictax_core::{
    Assignment, AssignmentColumns, AssignmentId, ClaimFilter, JoinedRow, Stage,
    StoreError, StoreResult, UserId,
};

use crate::store::{ClaimTransaction, RecordStore};

type TxId = u64;

/// Step of a claim transaction where a fault can be injected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FaultPoint {
    Begin,
    LockPending,
    CountPending,
    FetchRows,
    Transition,
    Commit,
}

#[derive(Debug, Clone)]
enum Fault {
    Fail(StoreError),
    Hang,
}

/// Transaction counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MockStats {
    pub begun: u64,
    pub committed: u64,
    pub rolled_back: u64,
    /// Transactions dropped without commit or rollback.
    pub abandoned: u64,
    /// Transactions whose commit failed and were rolled back.
    pub failed_commits: u64,
}

#[derive(Debug)]
struct StoredAssignment {
    stage: Stage,
    assigned_to: Option<UserId>,
    locked_by: Option<TxId>,
    rows: Vec<JoinedRow>,
}

#[derive(Debug)]
struct MockState {
    assignments: BTreeMap<AssignmentId, StoredAssignment>,
    faults: HashMap<FaultPoint, Fault>,
    available: bool,
    next_tx: TxId,
    stats: MockStats,
}

impl Default for MockState {
    fn default() -> Self {
        Self {
            assignments: BTreeMap::new(),
            faults: HashMap::new(),
            available: true,
            next_tx: 1,
            stats: MockStats::default(),
        }
    }
}

impl MockState {
    fn release(&mut self, tx: TxId) {
        for assignment in self.assignments.values_mut() {
            if assignment.locked_by == Some(tx) {
                assignment.locked_by = None;
            }
        }
    }
}

/// In-memory [`RecordStore`].
///
/// Clones share the same data.
#[derive(Debug, Clone, Default)]
pub struct MockRecordStore {
    state: Arc<Mutex<MockState>>,
}

impl MockRecordStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    // Helpers below never fail; a poisoned lock still holds valid data.
    fn state(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Seed joined rows. Rows are grouped by assignment; stage and owner are
    /// taken from the first row of each assignment.
    pub fn seed_rows<I>(&self, rows: I)
    where
        I: IntoIterator<Item = JoinedRow>,
    {
        let mut state = self.state();
        for row in rows {
            let entry = state
                .assignments
                .entry(row.assignment_id())
                .or_insert_with(|| StoredAssignment {
                    stage: row.assignment.etapa_id,
                    assigned_to: row.assigned_to(),
                    locked_by: None,
                    rows: Vec::new(),
                });
            entry.rows.push(row);
        }
        for assignment in state.assignments.values_mut() {
            // NULLs last, like an ascending ORDER BY
            assignment.rows.sort_by_key(|r| {
                let c = r.construction.idconstruccion;
                let u = r.unit.idunidadconstruccion;
                (c.is_none(), c, u.is_none(), u)
            });
        }
    }

    /// Seed an assignment whose property has no constructions.
    pub fn seed_assignment(&self, assignment: &Assignment) {
        let mut row = JoinedRow::new(AssignmentColumns::from(assignment));
        row.property.predio_id = Some(assignment.property_id);
        self.seed_rows([row]);
    }

    /// Committed stage of an assignment.
    pub fn stage_of(&self, id: AssignmentId) -> Option<Stage> {
        self.state().assignments.get(&id).map(|a| a.stage)
    }

    /// Committed assignments in `stage`, ascending.
    pub fn ids_in_stage(&self, stage: Stage) -> Vec<AssignmentId> {
        self.state()
            .assignments
            .iter()
            .filter(|(_, a)| a.stage == stage)
            .map(|(id, _)| *id)
            .collect()
    }

    /// Committed pending assignments matching `filter`.
    pub fn pending_count(&self, filter: ClaimFilter) -> usize {
        self.state()
            .assignments
            .values()
            .filter(|a| a.stage.is_claimable() && filter.matches(a.assigned_to))
            .count()
    }

    /// Row locks currently held by open transactions.
    pub fn locked_count(&self) -> usize {
        self.state()
            .assignments
            .values()
            .filter(|a| a.locked_by.is_some())
            .count()
    }

    pub fn stats(&self) -> MockStats {
        self.state().stats
    }

    /// Fail the next operation that reaches `point` with `error`.
    pub fn inject_fault(&self, point: FaultPoint, error: StoreError) {
        self.state().faults.insert(point, Fault::Fail(error));
    }

    /// Make the next operation that reaches `point` never complete.
    pub fn hang_at(&self, point: FaultPoint) {
        self.state().faults.insert(point, Fault::Hang);
    }

    /// Clear every pending fault.
    pub fn clear_faults(&self) {
        self.state().faults.clear();
    }

    /// Simulate the backend going away (or coming back).
    pub fn set_available(&self, available: bool) {
        self.state().available = available;
    }
}

async fn checkpoint(state: &Mutex<MockState>, point: FaultPoint) -> StoreResult<()> {
    let fault = {
        let mut state = state.lock().map_err(|_| StoreError::LockPoisoned)?;
        if !state.available {
            return Err(StoreError::Unavailable {
                reason: "mock store offline".to_string(),
            });
        }
        state.faults.remove(&point)
    };

    match fault {
        Some(Fault::Fail(error)) => return Err(error),
        Some(Fault::Hang) => std::future::pending::<()>().await,
        None => {}
    }

    tokio::task::yield_now().await;
    Ok(())
}

#[async_trait]
impl RecordStore for MockRecordStore {
    async fn begin(&self) -> StoreResult<Box<dyn ClaimTransaction>> {
        checkpoint(&self.state, FaultPoint::Begin).await?;

        let id = {
            let mut state = self.state.lock().map_err(|_| StoreError::LockPoisoned)?;
            let id = state.next_tx;
            state.next_tx += 1;
            state.stats.begun += 1;
            id
        };

        Ok(Box::new(MockTransaction {
            id,
            state: Arc::clone(&self.state),
            changes: BTreeMap::new(),
            finished: false,
        }))
    }

    async fn ping(&self) -> StoreResult<()> {
        let state = self.state.lock().map_err(|_| StoreError::LockPoisoned)?;
        if state.available {
            Ok(())
        } else {
            Err(StoreError::Unavailable {
                reason: "mock store offline".to_string(),
            })
        }
    }
}

/// Transaction handed out by [`MockRecordStore`].
#[derive(Debug)]
pub struct MockTransaction {
    id: TxId,
    state: Arc<Mutex<MockState>>,
    /// Buffered stage changes, applied on commit.
    changes: BTreeMap<AssignmentId, Stage>,
    finished: bool,
}

impl MockTransaction {
    fn guard(&self) -> StoreResult<MutexGuard<'_, MockState>> {
        self.state.lock().map_err(|_| StoreError::LockPoisoned)
    }

    /// Stage as seen from inside this transaction.
    fn visible_stage(&self, id: AssignmentId, stored: &StoredAssignment) -> Stage {
        self.changes.get(&id).copied().unwrap_or(stored.stage)
    }
}

#[async_trait]
impl ClaimTransaction for MockTransaction {
    async fn lock_pending(&mut self, filter: ClaimFilter) -> StoreResult<Vec<AssignmentId>> {
        checkpoint(&self.state, FaultPoint::LockPending).await?;

        let tx = self.id;
        let mut state = self.guard()?;
        let mut locked = Vec::new();
        for (id, assignment) in state.assignments.iter_mut() {
            let stage = self.changes.get(id).copied().unwrap_or(assignment.stage);
            if !stage.is_claimable() || !filter.matches(assignment.assigned_to) {
                continue;
            }
            match assignment.locked_by {
                None => {
                    assignment.locked_by = Some(tx);
                    locked.push(*id);
                }
                Some(owner) if owner == tx => locked.push(*id),
                Some(_) => {}
            }
        }
        Ok(locked)
    }

    async fn count_pending(&mut self, filter: ClaimFilter) -> StoreResult<u64> {
        checkpoint(&self.state, FaultPoint::CountPending).await?;

        let state = self.guard()?;
        let count = state
            .assignments
            .iter()
            .filter(|(id, a)| {
                self.visible_stage(**id, a).is_claimable() && filter.matches(a.assigned_to)
            })
            .count();
        Ok(count as u64)
    }

    async fn fetch_rows(&mut self, ids: &[AssignmentId]) -> StoreResult<Vec<JoinedRow>> {
        checkpoint(&self.state, FaultPoint::FetchRows).await?;

        let mut wanted = ids.to_vec();
        wanted.sort();
        wanted.dedup();

        let state = self.guard()?;
        let mut rows = Vec::new();
        for id in wanted {
            let Some(assignment) = state.assignments.get(&id) else {
                continue;
            };
            let stage = self.visible_stage(id, assignment);
            if !stage.is_claimable() {
                continue;
            }
            rows.extend(assignment.rows.iter().cloned().map(|mut row| {
                row.assignment.etapa_id = stage;
                row
            }));
        }
        Ok(rows)
    }

    async fn transition(
        &mut self,
        ids: &[AssignmentId],
        from: Stage,
        to: Stage,
    ) -> StoreResult<u64> {
        checkpoint(&self.state, FaultPoint::Transition).await?;

        from.transition_to(to).map_err(|e| StoreError::Query {
            operation: "transition".to_string(),
            reason: e.to_string(),
        })?;

        let tx = self.id;
        let mut affected = Vec::new();
        {
            let state = self.guard()?;
            for id in ids {
                let Some(assignment) = state.assignments.get(id) else {
                    continue;
                };
                let held_elsewhere = matches!(assignment.locked_by, Some(owner) if owner != tx);
                if !held_elsewhere && self.visible_stage(*id, assignment) == from {
                    affected.push(*id);
                }
            }
        }

        for id in &affected {
            self.changes.insert(*id, to);
        }
        Ok(affected.len() as u64)
    }

    async fn commit(self: Box<Self>) -> StoreResult<()> {
        let mut this = self;
        if let Err(error) = checkpoint(&this.state, FaultPoint::Commit).await {
            let mut state = this.guard()?;
            state.release(this.id);
            state.stats.failed_commits += 1;
            drop(state);
            this.finished = true;
            return Err(error);
        }

        let mut state = this.guard()?;
        for (id, stage) in &this.changes {
            if let Some(assignment) = state.assignments.get_mut(id) {
                assignment.stage = *stage;
            }
        }
        state.release(this.id);
        state.stats.committed += 1;
        drop(state);

        tracing::trace!(tx = this.id, changed = this.changes.len(), "mock commit");
        this.finished = true;
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> StoreResult<()> {
        let mut this = self;
        let mut state = this.guard()?;
        state.release(this.id);
        state.stats.rolled_back += 1;
        drop(state);

        this.changes.clear();
        this.finished = true;
        Ok(())
    }
}

impl Drop for MockTransaction {
    fn drop(&mut self) {
        if self.finished {
            return;
        }
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        state.release(self.id);
        state.stats.abandoned += 1;
        tracing::debug!(tx = self.id, "mock transaction dropped before finishing, rolled back");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sictax_core::{ConstructionId, IntegerId, PropertyId};
    use std::time::Duration;

    fn pending_row(assignment: i64, property: i64, owner: Option<i64>) -> JoinedRow {
        let property = PropertyId::new(property);
        let mut columns = AssignmentColumns::pending(AssignmentId::new(assignment), property);
        columns.usuario_asignado = owner.map(UserId::new);
        let mut row = JoinedRow::new(columns);
        row.property.predio_id = Some(property);
        row
    }

    fn seeded() -> MockRecordStore {
        let store = MockRecordStore::new();
        store.seed_rows([
            pending_row(1, 100, Some(7)),
            pending_row(2, 100, Some(7)),
            pending_row(3, 200, Some(8)),
        ]);
        store
    }

    fn user(id: i64) -> ClaimFilter {
        ClaimFilter::AssignedTo(UserId::new(id))
    }

    #[tokio::test]
    async fn test_lock_skips_rows_held_by_another_transaction() -> StoreResult<()> {
        let store = seeded();
        let mut first = store.begin().await?;
        let mut second = store.begin().await?;

        let a = first.lock_pending(ClaimFilter::AllCaseworkers).await?;
        let b = second.lock_pending(ClaimFilter::AllCaseworkers).await?;

        assert_eq!(a.len(), 3);
        assert!(b.is_empty());
        assert_eq!(store.locked_count(), 3);

        first.rollback().await?;
        assert_eq!(store.locked_count(), 0);

        let b = second.lock_pending(ClaimFilter::AllCaseworkers).await?;
        assert_eq!(b.len(), 3);
        second.rollback().await
    }

    #[tokio::test]
    async fn test_changes_visible_only_after_commit() -> StoreResult<()> {
        let store = seeded();
        let mut tx = store.begin().await?;
        let ids = tx.lock_pending(user(7)).await?;

        let affected = tx.transition(&ids, Stage::Pending, Stage::Downloaded).await?;
        assert_eq!(affected, 2);
        assert_eq!(store.stage_of(AssignmentId::new(1)), Some(Stage::Pending));
        assert_eq!(tx.count_pending(user(7)).await?, 0);

        tx.commit().await?;
        assert_eq!(store.stage_of(AssignmentId::new(1)), Some(Stage::Downloaded));
        assert_eq!(store.pending_count(user(7)), 0);
        assert_eq!(store.pending_count(user(8)), 1);
        Ok(())
    }

    #[tokio::test]
    async fn test_count_includes_rows_locked_elsewhere() -> StoreResult<()> {
        let store = seeded();
        let mut holder = store.begin().await?;
        holder.lock_pending(user(7)).await?;

        let mut other = store.begin().await?;
        assert_eq!(other.count_pending(user(7)).await?, 2);
        assert!(other.lock_pending(user(7)).await?.is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn test_transition_is_conditional_on_stage() -> StoreResult<()> {
        let store = seeded();
        let ids = vec![AssignmentId::new(1), AssignmentId::new(1), AssignmentId::new(99)];
        let mut tx = store.begin().await?;
        tx.lock_pending(user(7)).await?;

        assert_eq!(tx.transition(&ids[..1], Stage::Pending, Stage::Downloaded).await?, 1);
        // Already downloaded inside this transaction, so nothing left to touch
        assert_eq!(tx.transition(&ids, Stage::Pending, Stage::Downloaded).await?, 0);
        tx.rollback().await?;

        assert_eq!(store.stage_of(AssignmentId::new(1)), Some(Stage::Pending));
        Ok(())
    }

    #[tokio::test]
    async fn test_backward_transition_is_refused() -> StoreResult<()> {
        let store = seeded();
        let mut tx = store.begin().await?;
        let err = tx
            .transition(&[AssignmentId::new(1)], Stage::Downloaded, Stage::Pending)
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Query { .. }));
        Ok(())
    }

    #[tokio::test]
    async fn test_fetch_rows_orders_fan_out() -> StoreResult<()> {
        let store = MockRecordStore::new();
        let mut late = pending_row(5, 100, Some(7));
        late.construction.idconstruccion = Some(ConstructionId::new(2));
        let mut early = pending_row(5, 100, Some(7));
        early.construction.idconstruccion = Some(ConstructionId::new(1));
        store.seed_rows([late, early, pending_row(4, 100, Some(7))]);

        let mut tx = store.begin().await?;
        let ids = tx.lock_pending(user(7)).await?;
        let rows = tx.fetch_rows(&ids).await?;

        let order: Vec<(i64, Option<i64>)> = rows
            .iter()
            .map(|r| (r.assignment_id().get(), r.construction.idconstruccion.map(|c| c.get())))
            .collect();
        assert_eq!(order, vec![(4, None), (5, Some(1)), (5, Some(2))]);
        tx.rollback().await
    }

    #[tokio::test]
    async fn test_dropped_transaction_releases_locks() -> StoreResult<()> {
        let store = seeded();
        {
            let mut tx = store.begin().await?;
            let ids = tx.lock_pending(ClaimFilter::AllCaseworkers).await?;
            tx.transition(&ids, Stage::Pending, Stage::Downloaded).await?;
        }

        assert_eq!(store.locked_count(), 0);
        assert_eq!(store.pending_count(ClaimFilter::AllCaseworkers), 3);
        assert_eq!(store.stats().abandoned, 1);
        Ok(())
    }

    #[tokio::test]
    async fn test_commit_fault_discards_changes() -> StoreResult<()> {
        let store = seeded();
        store.inject_fault(
            FaultPoint::Commit,
            StoreError::Timeout {
                operation: "commit".into(),
            },
        );

        let mut tx = store.begin().await?;
        let ids = tx.lock_pending(user(7)).await?;
        tx.transition(&ids, Stage::Pending, Stage::Downloaded).await?;
        assert!(matches!(tx.commit().await, Err(StoreError::Timeout { .. })));

        assert_eq!(store.pending_count(user(7)), 2);
        assert_eq!(store.locked_count(), 0);
        assert_eq!(store.stats().failed_commits, 1);
        Ok(())
    }

    #[tokio::test]
    async fn test_hung_commit_cancelled_by_timeout() -> StoreResult<()> {
        let store = seeded();
        store.hang_at(FaultPoint::Commit);

        let store_in_task = store.clone();
        let claim = async move {
            let mut tx = store_in_task.begin().await?;
            let ids = tx.lock_pending(user(7)).await?;
            tx.transition(&ids, Stage::Pending, Stage::Downloaded).await?;
            tx.commit().await
        };
        let result = tokio::time::timeout(Duration::from_millis(50), claim).await;

        assert!(result.is_err());
        assert_eq!(store.locked_count(), 0);
        assert_eq!(store.pending_count(user(7)), 2);
        Ok(())
    }

    #[tokio::test]
    async fn test_offline_store_rejects_begin_and_ping() {
        let store = seeded();
        store.set_available(false);

        assert!(matches!(store.begin().await, Err(StoreError::Unavailable { .. })));
        assert!(store.ping().await.is_err());

        store.set_available(true);
        assert!(store.ping().await.is_ok());
    }
}
