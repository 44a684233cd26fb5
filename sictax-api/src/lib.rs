//! SICTAX API - Assignment Claim Service
//!
//! HTTP layer over the claim pipeline: caseworkers authenticate with a
//! bearer token and download their pending cadastral assignments as
//! nested property trees. Claimed assignments move to the downloaded stage
//! in the same transaction that reads them.

pub mod auth;
pub mod config;
pub mod db;
pub mod error;
pub mod macros;
pub mod middleware;
#[cfg(feature = "openapi")]
pub mod openapi;
pub mod routes;
pub mod services;
pub mod state;
pub mod telemetry;

// Re-export commonly used types
pub use auth::{
    extract_bearer_token, generate_jwt_token, validate_jwt_token, AuthConfig, AuthGateway,
    CaseworkerIdentity, Claims, JwtAuthGateway, JwtSecret,
};
pub use config::ApiConfig;
pub use db::{DbConfig, PgRecordStore};
pub use error::{ApiError, ApiResult, ErrorCode};
pub use middleware::{auth_middleware, AuthExtractor};
#[cfg(feature = "openapi")]
pub use openapi::ApiDoc;
pub use routes::create_api_router;
pub use services::{AssignmentService, ClaimCoordinator, ClaimResult, DeliveredClaim};
pub use state::AppState;
