//! SICTAX Storage - Record Store Traits and Mock Implementation
//!
//! Defines the transactional seam the claim pipeline runs against. The
//! PostgreSQL implementation lives in sictax-api.

pub mod mock;
pub mod store;

pub use mock::{FaultPoint, MockRecordStore, MockStats, MockTransaction};
pub use store::{ClaimTransaction, RecordStore};
