//! OpenAPI Document for SICTAX API
//!
//! Generated with utoipa from the route annotations and response types.

use utoipa::openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme};
use utoipa::{Modify, OpenApi};

use crate::error::{ApiError, ErrorCode};
use crate::routes::assignment::{self, ClaimRequest, ClaimResponse, EmptyClaimResponse};
use crate::routes::health::{self, ComponentHealth, HealthDetails, HealthResponse, HealthStatus};
use crate::telemetry::metrics;

use sictax_core::{AddressExtension, Construction, ConstructionUnit, LandParcel, Property};

/// OpenAPI document for the SICTAX assignment API.
#[derive(OpenApi)]
#[openapi(
    info(
        title = "SICTAX API",
        version = "0.1.0",
        description = "Claiming of cadastral caseworker assignments",
        license(name = "MIT", url = "https://opensource.org/licenses/MIT")
    ),
    servers(
        (url = "http://localhost:3000", description = "Local Development")
    ),
    tags(
        (name = "Assignments", description = "Claiming pending assignments as property trees"),
        (name = "Health", description = "Liveness and readiness probes"),
        (name = "Observability", description = "Prometheus metrics")
    ),
    paths(
        assignment::claim_assignments,
        health::ping,
        health::readiness,
        metrics::metrics_handler,
    ),
    components(
        schemas(
            ClaimRequest,
            ClaimResponse,
            EmptyClaimResponse,
            Property,
            Construction,
            ConstructionUnit,
            AddressExtension,
            LandParcel,
            HealthResponse,
            HealthStatus,
            HealthDetails,
            ComponentHealth,
            ApiError,
            ErrorCode,
        )
    ),
    modifiers(&SecurityAddon)
)]
pub struct ApiDoc;

/// Security scheme modifier for OpenAPI document.
struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer_auth",
                SecurityScheme::Http(
                    HttpBuilder::new()
                        .scheme(HttpAuthScheme::Bearer)
                        .bearer_format("JWT")
                        .description(Some("Token issued by the SICTAX login service"))
                        .build(),
                ),
            );
        }
    }
}

impl ApiDoc {
    /// Render the OpenAPI document as pretty JSON.
    pub fn to_json() -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(&Self::openapi())
    }
}
