//! SICTAX Test Utilities
//!
//! Shared test infrastructure for the SICTAX workspace:
//! - A builder for joined claim rows
//! - Fixtures for the canonical claim scenarios
//! - Proptest generators for consistent row sets
//! - Assertions over claim results

// Re-export mock storage from its source crate
pub use sictax_storage::{FaultPoint, MockRecordStore, MockStats};

// Re-export core types for convenience
pub use sictax_core::{
    Assignment, AssignmentColumns, AssignmentId, ClaimFilter, ConstructionId, IntegerId,
    JoinedRow, PropertyId, Stage, Timestamp, UnitId, UserId,
};

use chrono::NaiveDate;

// ============================================================================
// ROW BUILDER
// ============================================================================

/// Builder for one [`JoinedRow`].
///
/// Starts from a pending assignment whose property row exists, with no
/// construction and no unit.
#[derive(Debug, Clone)]
pub struct RowBuilder {
    row: JoinedRow,
}

impl RowBuilder {
    pub fn pending(assignment: i64, property: i64) -> Self {
        let mut row = JoinedRow::new(AssignmentColumns::pending(
            AssignmentId::new(assignment),
            PropertyId::new(property),
        ));
        row.assignment.etapa = Some("Asignado".to_string());
        row.assignment.fecha_asignado = Some(fixtures::assigned_at());
        row.property.predio_id = Some(PropertyId::new(property));
        row.property.numero_predial = Some(format!("68001{property:011}"));
        Self { row }
    }

    pub fn assigned_to(mut self, user: i64) -> Self {
        self.row.assignment.usuario_asignado = Some(UserId::new(user));
        self
    }

    pub fn assigned_by(mut self, user: i64) -> Self {
        self.row.assignment.usuario_asigna = Some(UserId::new(user));
        self
    }

    pub fn stage(mut self, stage: Stage) -> Self {
        self.row.assignment.etapa_id = stage;
        self
    }

    pub fn location(mut self, departamento: &str, municipio: &str) -> Self {
        self.row.property.departamento = Some(departamento.to_string());
        self.row.property.municipio = Some(municipio.to_string());
        self
    }

    pub fn avaluo_catastral(mut self, value: f64) -> Self {
        self.row.property.avaluo_catastral = Some(value);
        self
    }

    /// Join through construction `id`.
    pub fn construction(mut self, id: i64) -> Self {
        self.row.construction.idconstruccion = Some(ConstructionId::new(id));
        self.row.construction.identificador = Some(format!("C-{id}"));
        self
    }

    /// Join a unit under the current construction.
    pub fn unit(mut self, id: i64) -> Self {
        self.row.unit.idunidadconstruccion = Some(UnitId::new(id));
        self.row.unit.idconstruccion = self.row.construction.idconstruccion;
        self
    }

    /// The assignment points at a property row that does not exist.
    pub fn without_property(mut self) -> Self {
        self.row.property = Default::default();
        self
    }

    pub fn build(self) -> JoinedRow {
        self.row
    }
}

// ============================================================================
// TEST FIXTURES
// ============================================================================

pub mod fixtures {
    //! Canonical scenarios.

    use super::*;

    /// Caseworker whose batch the main scenario claims.
    pub const SCENARIO_USER: i64 = 7;

    /// Property all of [`SCENARIO_USER`]'s assignments point at.
    pub const SCENARIO_PROPERTY: i64 = 100;

    /// Construction shared by every scenario row.
    pub const SCENARIO_CONSTRUCTION: i64 = 500;

    pub fn assigned_at() -> Timestamp {
        NaiveDate::from_ymd_opt(2024, 3, 1)
            .and_then(|d| d.and_hms_opt(8, 30, 0))
            .unwrap_or_default()
    }

    /// A pending assignment owned by `owner`.
    pub fn pending_assignment(id: i64, property: i64, owner: i64) -> Assignment {
        Assignment {
            assignment_id: AssignmentId::new(id),
            property_id: PropertyId::new(property),
            stage: Stage::Pending,
            assigned_by: UserId::new(1),
            assigned_to: Some(UserId::new(owner)),
            assigned_at: assigned_at(),
            unassigned_at: None,
        }
    }

    /// Three pending assignments for user 7, all on property 100 and all
    /// joined through construction 500, plus five pending assignments for
    /// five other users.
    pub fn user_seven_scenario() -> Vec<JoinedRow> {
        let mut rows: Vec<JoinedRow> = (1..=3)
            .map(|id| {
                RowBuilder::pending(id, SCENARIO_PROPERTY)
                    .assigned_to(SCENARIO_USER)
                    .assigned_by(1)
                    .location("68", "68001")
                    .construction(SCENARIO_CONSTRUCTION)
                    .build()
            })
            .collect();

        rows.extend((4..=8).map(|id| {
            RowBuilder::pending(id, 200 + id)
                .assigned_to(SCENARIO_USER + id)
                .assigned_by(1)
                .build()
        }));
        rows
    }

    /// Store seeded with `rows`.
    pub fn seeded_store(rows: Vec<JoinedRow>) -> MockRecordStore {
        let store = MockRecordStore::new();
        store.seed_rows(rows);
        store
    }
}

// ============================================================================
// PROPTEST GENERATORS
// ============================================================================

pub mod generators {
    //! Proptest strategies for claim row sets.

    use super::*;
    use proptest::prelude::*;

    /// Owners drawn by the generators.
    pub const OWNERS: std::ops::RangeInclusive<i64> = 1..=3;

    pub fn arb_owner() -> impl Strategy<Value = i64> {
        OWNERS
    }

    /// Joined rows for one pending assignment: one row per construction, or
    /// a single bare row when it has none.
    fn rows_for(id: i64, owner: i64, property: i64, constructions: &[(i64, bool)]) -> Vec<JoinedRow> {
        let base = RowBuilder::pending(id, property).assigned_to(owner);
        if constructions.is_empty() {
            return vec![base.build()];
        }
        constructions
            .iter()
            .map(|&(construction, has_unit)| {
                let row = base.clone().construction(construction);
                if has_unit {
                    row.unit(id * 1_000 + construction).build()
                } else {
                    row.build()
                }
            })
            .collect()
    }

    /// A consistent set of pending rows: 1 to 12 assignments over 5
    /// properties, each with up to 3 (possibly repeated) constructions.
    pub fn arb_claim_rows() -> impl Strategy<Value = Vec<JoinedRow>> {
        prop::collection::vec(
            (
                arb_owner(),
                100i64..=104,
                prop::collection::vec((500i64..=503, any::<bool>()), 0..3),
            ),
            1..12,
        )
        .prop_map(|assignments| {
            assignments
                .iter()
                .enumerate()
                .flat_map(|(i, (owner, property, constructions))| {
                    rows_for(i as i64 + 1, *owner, *property, constructions)
                })
                .collect()
        })
    }

    /// A filter over the generated owners, or the unfiltered mode.
    pub fn arb_filter() -> impl Strategy<Value = ClaimFilter> {
        prop_oneof![
            Just(ClaimFilter::AllCaseworkers),
            arb_owner().prop_map(|u| ClaimFilter::AssignedTo(UserId::new(u))),
        ]
    }
}

// ============================================================================
// CUSTOM ASSERTIONS
// ============================================================================

pub mod assertions {
    //! Assertions over claim results.

    use super::*;
    use std::collections::HashSet;

    /// Assert no assignment id appears in both claims.
    pub fn assert_disjoint(a: &[AssignmentId], b: &[AssignmentId]) {
        let left: HashSet<_> = a.iter().collect();
        let shared: Vec<_> = b.iter().filter(|id| left.contains(id)).collect();
        assert!(shared.is_empty(), "Assignments claimed twice: {:?}", shared);
    }

    /// Assert downloaded plus remaining adds up to the total.
    pub fn assert_counters_balance(total: u64, downloaded: u64, remaining: u64) {
        assert_eq!(
            downloaded + remaining,
            total,
            "downloaded ({downloaded}) + remaining ({remaining}) != total ({total})"
        );
    }

    /// Assert every listed assignment is in `stage`.
    pub fn assert_stage(store: &MockRecordStore, ids: &[AssignmentId], stage: Stage) {
        for id in ids {
            assert_eq!(store.stage_of(*id), Some(stage), "assignment {id}");
        }
    }
}
