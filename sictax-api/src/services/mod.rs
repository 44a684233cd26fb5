//! Service Layer
//!
//! Claim orchestration. Routes stay thin DTO adapters over these services.

mod assignment_service;
mod claim_coordinator;

pub use assignment_service::*;
pub use claim_coordinator::*;
