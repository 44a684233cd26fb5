#![cfg(feature = "db-tests")]
//! PostgreSQL-backed claim tests.
//!
//! Require a reachable server configured through `SICTAX_DB_*` (or the
//! legacy `DB_*`) variables and `DB_TESTS=1`. Each test recreates the schema
//! in `tests/sql/schema.sql`, so they run one at a time.

use std::collections::BTreeSet;
use std::sync::Arc;

use deadpool_postgres::Pool;
use sictax_api::{AssignmentService, ClaimCoordinator, ClaimResult, DbConfig, PgRecordStore};
use sictax_core::{AssignmentId, ClaimFilter, ClaimOutcome, IntegerId, UserId};
use sictax_storage::RecordStore;
use sictax_test_utils::assertions::{assert_counters_balance, assert_disjoint};
use tokio::sync::Mutex;

#[path = "support/app.rs"]
mod app_support;
use app_support::caseworker;

const SCHEMA_SQL: &str = include_str!("sql/schema.sql");

static DB_LOCK: Mutex<()> = Mutex::const_new(());

fn db_tests_enabled() -> bool {
    std::env::var("DB_TESTS").ok().as_deref() == Some("1")
}

async fn fresh_pool() -> Pool {
    let pool = DbConfig::from_env()
        .create_pool()
        .expect("Failed to create database pool");
    let client = pool.get().await.expect("Failed to connect to PostgreSQL");
    client
        .batch_execute(SCHEMA_SQL)
        .await
        .expect("Failed to provision schema");
    pool
}

/// Seed `count` pending assignments, each on its own property with one
/// construction carrying two units. Owners alternate between users 7 and 8.
async fn seed_pending(pool: &Pool, count: i64) {
    let client = pool.get().await.expect("Failed to connect to PostgreSQL");
    for id in 1..=count {
        let property = 1_000 + id;
        let owner = if id % 2 == 0 { 8i64 } else { 7i64 };
        client
            .execute(
                "INSERT INTO sictax_data_temporal.lc_predio_t (idpredio, numero_predial, departamento, municipio) \
                 VALUES ($1, $2, '68', '68001')",
                &[&property, &format!("68001{property:011}")],
            )
            .await
            .expect("insert property");
        client
            .execute(
                "INSERT INTO sictax_data_temporal.lc_construccion_t (idconstruccion, idpredio, identificador, tipo_construccion) \
                 VALUES ($1, $2, 'A', 'Residencial')",
                &[&(10_000 + id), &property],
            )
            .await
            .expect("insert construction");
        for unit in 0..2i64 {
            client
                .execute(
                    "INSERT INTO sictax_data_temporal.lc_unidadconstruccion_t (idunidadconstruccion, lc_construccion, identificador) \
                     VALUES ($1, $2, 'U')",
                    &[&(100_000 + id * 10 + unit), &(10_000 + id)],
                )
                .await
                .expect("insert unit");
        }
        client
            .execute(
                "INSERT INTO sictax_tramitesdb.asignacion (idasignacion, idpredio, etapa_id, usuario_asigna, fecha_asignado, usuario_asignado) \
                 VALUES ($1, $2, 13, 1, now()::timestamp, $3)",
                &[&id, &property, &owner],
            )
            .await
            .expect("insert assignment");
    }
}

async fn stage_counts(pool: &Pool) -> (i64, i64) {
    let client = pool.get().await.expect("Failed to connect to PostgreSQL");
    let row = client
        .query_one(
            "SELECT COUNT(*) FILTER (WHERE etapa_id = 13), COUNT(*) FILTER (WHERE etapa_id = 14) \
             FROM sictax_tramitesdb.asignacion",
            &[],
        )
        .await
        .expect("count stages");
    (row.get(0), row.get(1))
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn db_test_concurrent_claims_are_disjoint() {
    if !db_tests_enabled() {
        return;
    }
    let _guard = DB_LOCK.lock().await;

    let pool = fresh_pool().await;
    seed_pending(&pool, 40).await;
    let store: Arc<dyn RecordStore> = Arc::new(PgRecordStore::new(pool.clone()));
    let coordinator = ClaimCoordinator::new(store);

    let filters = [
        ClaimFilter::AllCaseworkers,
        ClaimFilter::AssignedTo(UserId::new(7)),
        ClaimFilter::AllCaseworkers,
        ClaimFilter::AssignedTo(UserId::new(8)),
        ClaimFilter::AllCaseworkers,
        ClaimFilter::AssignedTo(UserId::new(7)),
    ];
    let handles: Vec<_> = filters
        .into_iter()
        .enumerate()
        .map(|(i, filter)| {
            let coordinator = coordinator.clone();
            tokio::spawn(async move {
                coordinator
                    .claim(&caseworker(&format!("db-{i}")), filter)
                    .await
            })
        })
        .collect();

    let mut claims: Vec<Vec<AssignmentId>> = Vec::new();
    for handle in handles {
        let outcome: ClaimOutcome = handle
            .await
            .expect("claim task should not panic")
            .expect("claim should succeed");
        claims.push(outcome.claimed_ids().to_vec());
    }

    for (i, a) in claims.iter().enumerate() {
        for b in &claims[i + 1..] {
            assert_disjoint(a, b);
        }
    }

    let claimed: BTreeSet<_> = claims.into_iter().flatten().collect();
    let (pending, downloaded) = stage_counts(&pool).await;
    assert_eq!(downloaded as usize, claimed.len());
    assert_eq!(pending + downloaded, 40);
}

#[tokio::test]
async fn db_test_claim_returns_property_trees() {
    if !db_tests_enabled() {
        return;
    }
    let _guard = DB_LOCK.lock().await;

    let pool = fresh_pool().await;
    seed_pending(&pool, 6).await;
    let store: Arc<dyn RecordStore> = Arc::new(PgRecordStore::new(pool.clone()));
    let service = AssignmentService::new(ClaimCoordinator::new(store));
    let identity = caseworker("lmartinez");

    let result = service
        .fetch(&identity, ClaimFilter::AssignedTo(UserId::new(7)))
        .await
        .expect("claim should succeed");
    let claim = match result {
        ClaimResult::Delivered(claim) => claim,
        other => panic!("expected a delivered claim, got {other:?}"),
    };

    assert_counters_balance(claim.total, claim.downloaded, claim.remaining);
    assert_eq!(claim.downloaded, 3);
    assert_eq!(claim.properties.len(), 3);
    for property in &claim.properties {
        assert_eq!(property.construccion.len(), 1);
        assert_eq!(property.unidadconstruccion.len(), 2);
        assert_eq!(property.departamentoname.as_deref(), Some("Santander"));
    }

    let again = service
        .fetch(&identity, ClaimFilter::AssignedTo(UserId::new(7)))
        .await
        .expect("second claim should succeed");
    assert_eq!(again, ClaimResult::Empty { total_eligible: 0 });
    assert_eq!(stage_counts(&pool).await, (3, 3));
}

#[tokio::test]
async fn db_test_ping_reaches_the_server() {
    if !db_tests_enabled() {
        return;
    }
    let store = PgRecordStore::from_config(&DbConfig::from_env()).expect("pool should build");
    store.ping().await.expect("ping should succeed");
}
