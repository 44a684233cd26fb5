//! Shared application state for Axum routers.

use std::sync::Arc;
use std::time::Instant;

use sictax_storage::RecordStore;

use crate::auth::AuthGateway;
use crate::services::{AssignmentService, ClaimCoordinator};

/// Application-wide state shared across all routes.
#[derive(Clone)]
pub struct AppState {
    pub assignments: AssignmentService,
    /// Same store the claim runs on; used directly by readiness checks.
    pub store: Arc<dyn RecordStore>,
    pub auth: Arc<dyn AuthGateway>,
    pub start_time: Instant,
}

impl AppState {
    /// Wire the claim pipeline over `store`, authenticating with `auth`.
    pub fn new(store: Arc<dyn RecordStore>, auth: Arc<dyn AuthGateway>) -> Self {
        let coordinator = ClaimCoordinator::new(Arc::clone(&store));
        Self {
            assignments: AssignmentService::new(coordinator),
            store,
            auth,
            start_time: Instant::now(),
        }
    }
}

crate::impl_from_ref!(AssignmentService, assignments);
crate::impl_from_ref!(Arc<dyn RecordStore>, store);
crate::impl_from_ref!(Arc<dyn AuthGateway>, auth);
crate::impl_from_ref!(Instant, start_time);
