//! Claim pipeline under concurrency, injected faults and cancellation.
//!
//! Runs the coordinator and the assignment service directly against the
//! in-memory store, which locks rows and skips locked ones the way
//! PostgreSQL does with `FOR UPDATE SKIP LOCKED`.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use sictax_api::error::ErrorCode;
use sictax_api::{AssignmentService, ClaimCoordinator, ClaimResult};
use sictax_core::{AssignmentId, ClaimFilter, ClaimOutcome, IntegerId, Stage, StoreError, UserId};
use sictax_storage::RecordStore;
use sictax_test_utils::assertions::{assert_disjoint, assert_stage};
use sictax_test_utils::fixtures::{pending_assignment, seeded_store, user_seven_scenario};
use sictax_test_utils::{FaultPoint, MockRecordStore};

#[path = "support/app.rs"]
mod app_support;
use app_support::caseworker;

fn service(store: &MockRecordStore) -> AssignmentService {
    let store: Arc<dyn RecordStore> = Arc::new(store.clone());
    AssignmentService::new(ClaimCoordinator::new(store))
}

fn user(id: i64) -> ClaimFilter {
    ClaimFilter::AssignedTo(UserId::new(id))
}

/// Fifty pending assignments spread over two caseworkers.
fn crowded_store() -> MockRecordStore {
    let store = MockRecordStore::new();
    for id in 1..=50 {
        store.seed_assignment(&pending_assignment(id, 1_000 + id, 1 + id % 2));
    }
    store
}

// ============================================================================
// AT-MOST-ONCE CLAIMING
// ============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_overlapping_concurrent_claims_are_disjoint() {
    let store = crowded_store();
    let coordinator = ClaimCoordinator::new(Arc::new(store.clone()));

    // Unfiltered and filtered claims compete for the same rows
    let filters = [
        ClaimFilter::AllCaseworkers,
        user(1),
        user(2),
        ClaimFilter::AllCaseworkers,
        user(1),
        ClaimFilter::AllCaseworkers,
        user(2),
        ClaimFilter::AllCaseworkers,
    ];

    let handles: Vec<_> = filters
        .into_iter()
        .enumerate()
        .map(|(i, filter)| {
            let coordinator = coordinator.clone();
            tokio::spawn(async move {
                let identity = caseworker(&format!("caseworker-{i}"));
                coordinator.claim(&identity, filter).await
            })
        })
        .collect();

    let mut results: Vec<Vec<AssignmentId>> = Vec::new();
    for handle in handles {
        let outcome = handle
            .await
            .expect("claim task should not panic")
            .expect("claim should succeed");
        results.push(outcome.claimed_ids().to_vec());
    }

    for (i, a) in results.iter().enumerate() {
        for b in &results[i + 1..] {
            assert_disjoint(a, b);
        }
    }

    let claimed: BTreeSet<AssignmentId> = results.into_iter().flatten().collect();
    assert_eq!(claimed.len(), 50 - store.pending_count(ClaimFilter::AllCaseworkers));
    assert_stage(&store, &claimed.iter().copied().collect::<Vec<_>>(), Stage::Downloaded);
    assert_eq!(store.locked_count(), 0);
}

#[tokio::test]
async fn test_rows_locked_by_another_claim_are_counted_but_skipped() {
    let store = seeded_store(user_seven_scenario());
    let coordinator = ClaimCoordinator::new(Arc::new(store.clone()));

    let mut holder = store.begin().await.expect("begin");
    let held = holder.lock_pending(user(7)).await.expect("lock");
    assert_eq!(held.len(), 3);

    let outcome = coordinator
        .claim(&caseworker("second"), user(7))
        .await
        .expect("claim should succeed");
    assert_eq!(outcome, ClaimOutcome::NothingToClaim { total_eligible: 3 });

    holder.rollback().await.expect("rollback");
    let outcome = coordinator
        .claim(&caseworker("second"), user(7))
        .await
        .expect("claim should succeed");
    assert_eq!(outcome.claimed_ids().len(), 3);
}

// ============================================================================
// FAILURE BEFORE COMMIT
// ============================================================================

#[tokio::test]
async fn test_failure_before_commit_leaves_no_partial_transition() {
    let points = [
        FaultPoint::LockPending,
        FaultPoint::CountPending,
        FaultPoint::FetchRows,
        FaultPoint::Transition,
        FaultPoint::Commit,
    ];

    for point in points {
        let store = seeded_store(user_seven_scenario());
        let service = service(&store);
        let identity = caseworker("lmartinez");

        store.inject_fault(
            point,
            StoreError::Unavailable {
                reason: "connection reset".to_string(),
            },
        );
        let err = service
            .fetch(&identity, user(7))
            .await
            .expect_err("claim should fail");
        assert_eq!(err.code, ErrorCode::ServiceUnavailable, "fault at {point:?}");
        assert!(err.is_retryable());
        assert_eq!(store.locked_count(), 0, "fault at {point:?}");
        assert_eq!(store.pending_count(ClaimFilter::AllCaseworkers), 8, "fault at {point:?}");

        // The retry sees exactly what the failed attempt saw
        match service.fetch(&identity, user(7)).await.expect("retry should succeed") {
            ClaimResult::Delivered(claim) => {
                assert_eq!(claim.total, 3, "fault at {point:?}");
                assert_eq!(claim.downloaded, 3);
            }
            other => panic!("expected a delivered claim after {point:?}, got {other:?}"),
        }
    }
}

#[tokio::test]
async fn test_store_timeout_maps_to_gateway_timeout() {
    let store = seeded_store(user_seven_scenario());
    store.inject_fault(
        FaultPoint::FetchRows,
        StoreError::Timeout {
            operation: "fetch_rows".to_string(),
        },
    );

    let err = service(&store)
        .fetch(&caseworker("lmartinez"), user(7))
        .await
        .expect_err("claim should time out");

    assert_eq!(err.code, ErrorCode::Timeout);
    assert_eq!(store.stats().rolled_back, 1);
}

// ============================================================================
// CANCELLATION
// ============================================================================

#[tokio::test]
async fn test_cancelled_claim_rolls_back() {
    let store = seeded_store(user_seven_scenario());
    let service = service(&store);
    let identity = caseworker("lmartinez");
    store.hang_at(FaultPoint::Commit);

    let attempt = tokio::time::timeout(Duration::from_millis(50), service.fetch(&identity, user(7))).await;
    assert!(attempt.is_err(), "hung commit should hit the timeout");

    assert_eq!(store.stats().abandoned, 1);
    assert_eq!(store.locked_count(), 0);
    assert_eq!(store.pending_count(user(7)), 3);

    let retry = service.fetch(&identity, user(7)).await.expect("retry should succeed");
    assert!(retry.is_delivered());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_aborted_task_releases_its_locks() {
    let store = seeded_store(user_seven_scenario());
    store.hang_at(FaultPoint::Transition);

    let service = service(&store);
    let task = tokio::spawn(async move { service.fetch(&caseworker("lmartinez"), user(7)).await });

    // Wait until the claim holds its locks
    for _ in 0..100 {
        if store.locked_count() > 0 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    assert_eq!(store.locked_count(), 3);

    task.abort();
    assert!(task.await.is_err_and(|e| e.is_cancelled()));

    assert_eq!(store.locked_count(), 0);
    assert_eq!(store.ids_in_stage(Stage::Downloaded), Vec::<AssignmentId>::new());
}
