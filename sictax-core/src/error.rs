//! Error types for SICTAX operations

use crate::identity::{AssignmentId, ConstructionId, PropertyId, UnitId};
use thiserror::Error;

/// Record store errors.
///
/// Messages here may contain backend detail; they are logged, never sent to
/// API callers verbatim.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StoreError {
    #[error("Record store unavailable: {reason}")]
    Unavailable { reason: String },

    #[error("Record store operation timed out: {operation}")]
    Timeout { operation: String },

    #[error("Query failed during {operation}: {reason}")]
    Query { operation: String, reason: String },

    #[error("Stage transition touched {affected} of {expected} claimed assignments")]
    TransitionConflict { expected: usize, affected: u64 },

    #[error("Malformed row in column {column}: {reason}")]
    MalformedRow { column: String, reason: String },

    #[error("Transaction already finished")]
    TransactionClosed,

    #[error("Store lock poisoned")]
    LockPoisoned,
}

impl StoreError {
    /// Whether the caller may safely retry the whole claim.
    ///
    /// A failed claim never leaves a partial transition behind, so every
    /// transient failure is retryable.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            StoreError::Unavailable { .. }
                | StoreError::Timeout { .. }
                | StoreError::TransitionConflict { .. }
        )
    }
}

/// Errors raised while folding joined rows into the property tree.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum AggregationError {
    #[error("Assignment {assignment_id} references property {property_id}, which has no property row")]
    MissingProperty {
        assignment_id: AssignmentId,
        property_id: PropertyId,
    },

    #[error("Assignment {assignment_id} references property {expected} but the join produced property {found}")]
    PropertyMismatch {
        assignment_id: AssignmentId,
        expected: PropertyId,
        found: PropertyId,
    },

    #[error("Construction unit {unit_id} belongs to construction {parent:?} but was joined through construction {joined:?}")]
    UnitParentMismatch {
        unit_id: UnitId,
        parent: Option<ConstructionId>,
        joined: Option<ConstructionId>,
    },
}

/// A stage change this crate refuses to perform.
#[derive(Debug, Clone, Copy, Error, PartialEq, Eq)]
#[error("Invalid stage transition from {from} to {to}")]
pub struct StageTransitionError {
    pub from: i32,
    pub to: i32,
}

/// Umbrella error for SICTAX core operations.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SictaxError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Aggregation(#[from] AggregationError),

    #[error(transparent)]
    Stage(#[from] StageTransitionError),
}

/// Result type for SICTAX core operations.
pub type SictaxResult<T> = Result<T, SictaxError>;

/// Result type for record store operations.
pub type StoreResult<T> = Result<T, StoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_classification() {
        assert!(StoreError::Unavailable { reason: "down".into() }.is_retryable());
        assert!(StoreError::Timeout { operation: "count".into() }.is_retryable());
        assert!(StoreError::TransitionConflict { expected: 3, affected: 2 }.is_retryable());
        assert!(!StoreError::MalformedRow {
            column: "idpredio".into(),
            reason: "null".into()
        }
        .is_retryable());
        assert!(!StoreError::LockPoisoned.is_retryable());
    }

    #[test]
    fn test_umbrella_conversion() {
        let err: SictaxError = StoreError::TransactionClosed.into();
        assert!(matches!(err, SictaxError::Store(StoreError::TransactionClosed)));
        assert_eq!(err.to_string(), "Transaction already finished");
    }
}
