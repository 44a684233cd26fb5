//! Error Types for SICTAX API
//!
//! This module defines error handling for the API layer, including:
//! - ApiError struct for structured error responses
//! - ErrorCode enum for categorizing errors
//! - IntoResponse implementation for Axum HTTP responses
//!
//! Every error body carries `success: false` so clients can branch on the
//! same flag they use for the claim payload.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use sictax_core::{AggregationError, SictaxError, StageTransitionError, StoreError};
use std::fmt;

/// Message returned for any store failure; matches what existing clients
/// display.
pub const QUERY_FAILED_MESSAGE: &str = "Error al ejecutar la consulta";

// ============================================================================
// ERROR CODE ENUM
// ============================================================================

/// Error codes for API responses.
///
/// Each error code maps to a specific HTTP status code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, utoipa::ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    // ========================================================================
    // Authentication Errors (401)
    // ========================================================================
    /// Request lacks authentication credentials
    Unauthorized,

    /// Authentication token is invalid or malformed
    InvalidToken,

    /// Authentication token has expired
    TokenExpired,

    // ========================================================================
    // Validation Errors (400)
    // ========================================================================
    /// Request contains invalid input data
    InvalidInput,

    /// Field format is incorrect
    InvalidFormat,

    /// Field value is out of valid range
    InvalidRange,

    // ========================================================================
    // Conflict Errors (409)
    // ========================================================================
    /// Claimed rows changed under the claim; the whole claim was rolled back
    ConcurrentModification,

    // ========================================================================
    // Server Errors (500, 503, 504)
    // ========================================================================
    /// Internal server error
    InternalError,

    /// Database operation failed
    DatabaseError,

    /// Service is temporarily unavailable
    ServiceUnavailable,

    /// Database connection pool exhausted
    ConnectionPoolExhausted,

    /// Operation timed out
    Timeout,
}

impl ErrorCode {
    /// Get the HTTP status code for this error code.
    pub fn status_code(&self) -> StatusCode {
        match self {
            ErrorCode::Unauthorized | ErrorCode::InvalidToken | ErrorCode::TokenExpired => {
                StatusCode::UNAUTHORIZED
            }

            ErrorCode::InvalidInput | ErrorCode::InvalidFormat | ErrorCode::InvalidRange => {
                StatusCode::BAD_REQUEST
            }

            ErrorCode::ConcurrentModification => StatusCode::CONFLICT,

            ErrorCode::ServiceUnavailable | ErrorCode::ConnectionPoolExhausted => {
                StatusCode::SERVICE_UNAVAILABLE
            }

            ErrorCode::Timeout => StatusCode::GATEWAY_TIMEOUT,

            ErrorCode::InternalError | ErrorCode::DatabaseError => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// Get a default message for this error code.
    pub fn default_message(&self) -> &'static str {
        match self {
            ErrorCode::Unauthorized => "Authentication required",
            ErrorCode::InvalidToken => "Invalid authentication token",
            ErrorCode::TokenExpired => "Authentication token has expired",
            ErrorCode::InvalidInput => "Invalid input data",
            ErrorCode::InvalidFormat => "Invalid format",
            ErrorCode::InvalidRange => "Value is out of valid range",
            ErrorCode::ConcurrentModification => "Concurrent modification detected",
            ErrorCode::InternalError => "Internal server error",
            ErrorCode::DatabaseError => QUERY_FAILED_MESSAGE,
            ErrorCode::ServiceUnavailable => "Service temporarily unavailable",
            ErrorCode::ConnectionPoolExhausted => "Connection pool exhausted",
            ErrorCode::Timeout => "Operation timed out",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

// ============================================================================
// API ERROR STRUCT
// ============================================================================

/// Structured error response for API operations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, utoipa::ToSchema)]
pub struct ApiError {
    /// Error code categorizing the error
    pub code: ErrorCode,

    /// Human-readable error message
    pub message: String,

    /// Optional additional details
    #[serde(skip_serializing_if = "Option::is_none")]
    #[schema(value_type = Option<Object>)]
    pub details: Option<serde_json::Value>,
}

impl ApiError {
    /// Create a new API error with the given code and message.
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            details: None,
        }
    }

    /// Create a new API error with the given code, using the default message.
    pub fn from_code(code: ErrorCode) -> Self {
        Self::new(code, code.default_message())
    }

    /// Add additional details to the error.
    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = Some(details);
        self
    }

    /// Mark the error as safe to retry.
    pub fn retryable(self) -> Self {
        self.with_details(serde_json::json!({ "retryable": true }))
    }

    /// Whether the error was marked retryable.
    pub fn is_retryable(&self) -> bool {
        self.details
            .as_ref()
            .and_then(|d| d.get("retryable"))
            .and_then(serde_json::Value::as_bool)
            .unwrap_or(false)
    }

    /// Get the HTTP status code for this error.
    pub fn status_code(&self) -> StatusCode {
        self.code.status_code()
    }

    // ========================================================================
    // Convenience constructors for common errors
    // ========================================================================

    /// Create an Unauthorized error.
    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Unauthorized, message)
    }

    /// Create an InvalidToken error.
    pub fn invalid_token(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InvalidToken, message)
    }

    /// Create a TokenExpired error.
    pub fn token_expired() -> Self {
        Self::from_code(ErrorCode::TokenExpired)
    }

    /// Create an InvalidInput error.
    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InvalidInput, message)
    }

    /// Create an InvalidFormat error.
    pub fn invalid_format(field: &str, expected: &str) -> Self {
        Self::new(
            ErrorCode::InvalidFormat,
            format!("Field '{}' has invalid format, expected {}", field, expected),
        )
    }

    /// Create an InvalidRange error for a lower bound.
    pub fn must_be_positive(field: &str) -> Self {
        Self::new(
            ErrorCode::InvalidRange,
            format!("Field '{}' must be a positive integer", field),
        )
    }

    /// Create an InternalError.
    pub fn internal_error(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InternalError, message)
    }

    /// Create a DatabaseError with the client-facing query failure message.
    pub fn query_failed() -> Self {
        Self::from_code(ErrorCode::DatabaseError)
    }

    /// Create a ServiceUnavailable error.
    pub fn service_unavailable(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::ServiceUnavailable, message)
    }

    /// Create a ConnectionPoolExhausted error.
    pub fn connection_pool_exhausted() -> Self {
        Self::from_code(ErrorCode::ConnectionPoolExhausted)
    }
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

impl std::error::Error for ApiError {}

// ============================================================================
// AXUM INTEGRATION
// ============================================================================

#[derive(Serialize)]
struct ErrorBody<'a> {
    success: bool,
    #[serde(flatten)]
    error: &'a ApiError,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = Json(ErrorBody {
            success: false,
            error: &self,
        });
        (status, body).into_response()
    }
}

// ============================================================================
// CONVERSIONS FROM DOMAIN AND LIBRARY ERRORS
// ============================================================================

/// Store errors never reach the client verbatim.
impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        tracing::error!(error = %err, retryable = err.is_retryable(), "Record store error");

        let api = match &err {
            StoreError::Timeout { .. } => ApiError::new(ErrorCode::Timeout, QUERY_FAILED_MESSAGE),
            StoreError::Unavailable { .. } => ApiError::service_unavailable(QUERY_FAILED_MESSAGE),
            StoreError::TransitionConflict { .. } => {
                ApiError::new(ErrorCode::ConcurrentModification, QUERY_FAILED_MESSAGE)
            }
            StoreError::Query { .. }
            | StoreError::MalformedRow { .. }
            | StoreError::TransactionClosed
            | StoreError::LockPoisoned => ApiError::query_failed(),
        };

        if err.is_retryable() {
            api.retryable()
        } else {
            api
        }
    }
}

impl From<AggregationError> for ApiError {
    fn from(err: AggregationError) -> Self {
        tracing::error!(error = %err, "Claimed rows could not be aggregated");
        ApiError::internal_error("Claimed records are inconsistent and were not delivered")
    }
}

impl From<StageTransitionError> for ApiError {
    fn from(err: StageTransitionError) -> Self {
        tracing::error!(error = %err, "Refused stage transition");
        ApiError::internal_error("Invalid stage transition")
    }
}

impl From<SictaxError> for ApiError {
    fn from(err: SictaxError) -> Self {
        match err {
            SictaxError::Store(e) => e.into(),
            SictaxError::Aggregation(e) => e.into(),
            SictaxError::Stage(e) => e.into(),
        }
    }
}

/// Convert from tokio_postgres::Error to ApiError.
impl From<tokio_postgres::Error> for ApiError {
    fn from(err: tokio_postgres::Error) -> Self {
        // Log the full error for debugging
        tracing::error!("Database error: {:?}", err);

        // Return a generic database error to avoid leaking internal details
        ApiError::query_failed()
    }
}

/// Convert from deadpool_postgres::PoolError to ApiError.
impl From<deadpool_postgres::PoolError> for ApiError {
    fn from(err: deadpool_postgres::PoolError) -> Self {
        tracing::error!("Connection pool error: {:?}", err);

        match err {
            deadpool_postgres::PoolError::Timeout(_) => {
                ApiError::connection_pool_exhausted().retryable()
            }
            deadpool_postgres::PoolError::Closed => {
                ApiError::service_unavailable("Database connection pool is closed")
            }
            _ => ApiError::query_failed(),
        }
    }
}

/// Convert from serde_json::Error to ApiError.
impl From<serde_json::Error> for ApiError {
    fn from(err: serde_json::Error) -> Self {
        tracing::debug!("Rejected request body: {:?}", err);
        ApiError::invalid_input(format!("Invalid JSON: {}", err))
    }
}

// ============================================================================
// RESULT TYPE ALIAS
// ============================================================================

/// Result type alias for API operations.
pub type ApiResult<T> = Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_code_status_mapping() {
        assert_eq!(ErrorCode::Unauthorized.status_code(), StatusCode::UNAUTHORIZED);
        assert_eq!(ErrorCode::TokenExpired.status_code(), StatusCode::UNAUTHORIZED);
        assert_eq!(ErrorCode::InvalidInput.status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(ErrorCode::InvalidRange.status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(ErrorCode::ConcurrentModification.status_code(), StatusCode::CONFLICT);
        assert_eq!(ErrorCode::DatabaseError.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(ErrorCode::ServiceUnavailable.status_code(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(ErrorCode::Timeout.status_code(), StatusCode::GATEWAY_TIMEOUT);
    }

    #[test]
    fn test_store_errors_hide_backend_detail() {
        let err: ApiError = StoreError::Query {
            operation: "fetch_rows".into(),
            reason: "relation \"lc_predio_t\" does not exist".into(),
        }
        .into();

        assert_eq!(err.code, ErrorCode::DatabaseError);
        assert_eq!(err.message, QUERY_FAILED_MESSAGE);
        assert!(!err.message.contains("lc_predio_t"));
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_transient_store_errors_are_retryable() {
        let timeout: ApiError = StoreError::Timeout {
            operation: "count_pending".into(),
        }
        .into();
        assert_eq!(timeout.code, ErrorCode::Timeout);
        assert!(timeout.is_retryable());

        let conflict: ApiError = StoreError::TransitionConflict {
            expected: 3,
            affected: 2,
        }
        .into();
        assert_eq!(conflict.status_code(), StatusCode::CONFLICT);
        assert!(conflict.is_retryable());

        let down: ApiError = StoreError::Unavailable {
            reason: "connection refused".into(),
        }
        .into();
        assert_eq!(down.status_code(), StatusCode::SERVICE_UNAVAILABLE);
        assert!(!down.message.contains("refused"));
    }

    #[test]
    fn test_error_body_shape() -> Result<(), serde_json::Error> {
        let err = ApiError::invalid_input("bad filter");
        let body = serde_json::to_value(ErrorBody {
            success: false,
            error: &err,
        })?;

        assert_eq!(body["success"], serde_json::json!(false));
        assert_eq!(body["code"], serde_json::json!("INVALID_INPUT"));
        assert_eq!(body["message"], serde_json::json!("bad filter"));
        assert!(body.get("details").is_none());
        Ok(())
    }

    #[test]
    fn test_error_display() {
        let err = ApiError::query_failed();
        let display = format!("{}", err);

        assert!(display.contains("DatabaseError"));
        assert!(display.contains(QUERY_FAILED_MESSAGE));
    }
}
