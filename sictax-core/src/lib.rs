//! SICTAX Core - Assignment Claim Types
//!
//! Pure data structures and the row aggregator. All other crates depend on
//! this. No I/O happens here.

pub mod aggregate;
pub mod claim;
pub mod entities;
pub mod error;
pub mod identity;
pub mod property;
pub mod row;
pub mod stage;

pub use aggregate::{aggregate, RowAggregator};
pub use claim::{ClaimBatch, ClaimFilter, ClaimOutcome};
pub use entities::Assignment;
pub use error::{
    AggregationError, SictaxError, SictaxResult, StageTransitionError, StoreError, StoreResult,
};
pub use identity::{
    AssignmentId, ConstructionId, IntegerId, PropertyId, RawId, Timestamp, UnitId, UserId,
};
pub use property::{Construction, ConstructionUnit, Property};
pub use row::{
    AddressExtension, AssignmentColumns, ConstructionColumns, JoinedRow, LandParcel,
    PropertyColumns, UnitColumns,
};
pub use stage::{Stage, STAGE_DOWNLOADED, STAGE_PENDING};
