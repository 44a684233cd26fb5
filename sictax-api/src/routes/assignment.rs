//! Assignment Claim Endpoint
//!
//! `POST /datosasignados` claims the caller's pending assignments and returns
//! them as property trees.

use axum::{
    body::Bytes,
    extract::State,
    response::{IntoResponse, Response},
    routing::post,
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sictax_core::{ClaimFilter, IntegerId, Property, UserId};

use crate::error::{ApiError, ApiResult};
use crate::middleware::AuthExtractor;
use crate::services::{AssignmentService, ClaimResult};
use crate::state::AppState;

/// Field carrying the optional owner filter.
const FILTER_FIELD: &str = "usuarioasignado";

pub const FOUND_MESSAGE: &str = "Datos encontrados";
pub const NOT_FOUND_MESSAGE: &str = "No se encontraron datos";

// ============================================================================
// TYPES
// ============================================================================

/// Request body. Every field is optional; an empty body is accepted too.
#[derive(Debug, Clone, Default, Serialize, Deserialize, utoipa::ToSchema)]
pub struct ClaimRequest {
    /// Only claim assignments owned by this user. Absent or null claims
    /// across all caseworkers. A numeric string is accepted.
    #[schema(minimum = 1)]
    pub usuarioasignado: Option<i64>,
}

#[derive(Debug, Clone, Serialize, utoipa::ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ClaimResponse {
    pub success: bool,
    pub message: String,
    /// Pending assignments matching the filter when the claim started.
    pub total_asignaciones: u64,
    /// Assignments downloaded by this request.
    pub asignaciones_descargadas: u64,
    /// Pending assignments left for the filter.
    pub asignaciones_faltantes: u64,
    pub datos: Vec<Property>,
}

/// Returned with 200 when nothing was eligible.
#[derive(Debug, Clone, Serialize, utoipa::ToSchema)]
pub struct EmptyClaimResponse {
    pub success: bool,
    pub message: String,
}

impl IntoResponse for ClaimResult {
    fn into_response(self) -> Response {
        match self {
            ClaimResult::Delivered(claim) => Json(ClaimResponse {
                success: true,
                message: FOUND_MESSAGE.to_string(),
                total_asignaciones: claim.total,
                asignaciones_descargadas: claim.downloaded,
                asignaciones_faltantes: claim.remaining,
                datos: claim.properties,
            })
            .into_response(),
            ClaimResult::Empty { .. } => Json(EmptyClaimResponse {
                success: false,
                message: NOT_FOUND_MESSAGE.to_string(),
            })
            .into_response(),
        }
    }
}

// ============================================================================
// REQUEST PARSING
// ============================================================================

fn positive_user(id: i64) -> ApiResult<ClaimFilter> {
    if id <= 0 {
        return Err(ApiError::must_be_positive(FILTER_FIELD));
    }
    Ok(ClaimFilter::AssignedTo(UserId::new(id)))
}

/// Turn the raw request body into a claim filter.
///
/// Runs before any transaction opens. Malformed input is always an error and
/// never falls back to the unfiltered mode.
pub fn parse_claim_filter(body: &[u8]) -> ApiResult<ClaimFilter> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(ClaimFilter::AllCaseworkers);
    }

    let value: Value = serde_json::from_slice(body)?;
    let Value::Object(fields) = value else {
        return Err(ApiError::invalid_format("body", "a JSON object"));
    };

    match fields.get(FILTER_FIELD) {
        None | Some(Value::Null) => Ok(ClaimFilter::AllCaseworkers),
        Some(Value::Number(n)) => match n.as_i64() {
            Some(id) => positive_user(id),
            None => Err(ApiError::invalid_format(FILTER_FIELD, "a positive integer")),
        },
        Some(Value::String(s)) => match s.trim().parse::<i64>() {
            Ok(id) => positive_user(id),
            Err(_) => Err(ApiError::invalid_format(FILTER_FIELD, "a positive integer")),
        },
        Some(_) => Err(ApiError::invalid_format(FILTER_FIELD, "a positive integer")),
    }
}

// ============================================================================
// HANDLERS
// ============================================================================

/// POST /datosasignados - Claim pending assignments
#[utoipa::path(
    post,
    path = "/datosasignados",
    tag = "Assignments",
    request_body(content = ClaimRequest, description = "Optional owner filter"),
    responses(
        (status = 200, description = "Claimed assignments; `success: false` with only a message when nothing was eligible", body = ClaimResponse),
        (status = 400, description = "Invalid filter", body = ApiError),
        (status = 401, description = "Missing or invalid token", body = ApiError),
        (status = 500, description = "Query failed", body = ApiError),
        (status = 503, description = "Record store unavailable", body = ApiError),
        (status = 504, description = "Record store timed out", body = ApiError),
    ),
    security(("bearer_auth" = []))
)]
pub async fn claim_assignments(
    State(service): State<AssignmentService>,
    AuthExtractor(identity): AuthExtractor,
    body: Bytes,
) -> ApiResult<Response> {
    let filter = parse_claim_filter(&body)?;
    let result = service.fetch(&identity, filter).await?;
    Ok(result.into_response())
}

// ============================================================================
// ROUTER
// ============================================================================

/// Routes that require an authenticated caseworker.
pub fn create_router() -> Router<AppState> {
    Router::new().route("/datosasignados", post(claim_assignments))
}
