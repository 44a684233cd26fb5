//! Authentication Middleware
//!
//! Validates the bearer credential through the [`AuthGateway`] before any
//! protected handler runs and injects the resulting [`CaseworkerIdentity`]
//! into request extensions.

use axum::{
    extract::{FromRequestParts, Request, State},
    http::{header::AUTHORIZATION, request::Parts},
    middleware::Next,
    response::Response,
};
use std::sync::Arc;

use crate::auth::{AuthGateway, CaseworkerIdentity};
use crate::error::{ApiError, ApiResult};

// ============================================================================
// AUTHENTICATION MIDDLEWARE
// ============================================================================

/// Reject the request unless its `Authorization` header authenticates.
///
/// # Example
///
/// ```rust,ignore
/// let app = Router::new()
///     .route("/datosasignados", post(handler))
///     .layer(middleware::from_fn_with_state(state.auth.clone(), auth_middleware));
/// ```
pub async fn auth_middleware(
    State(gateway): State<Arc<dyn AuthGateway>>,
    mut request: Request,
    next: Next,
) -> ApiResult<Response> {
    let authorization = request
        .headers()
        .get(AUTHORIZATION)
        .map(|h| {
            h.to_str()
                .map_err(|_| ApiError::invalid_token("Authorization header is not valid text"))
        })
        .transpose()?;

    let identity = gateway.authenticate(authorization).await?;
    tracing::debug!(caller = %identity.login_name, "Caller authenticated");

    request.extensions_mut().insert(identity);
    Ok(next.run(request).await)
}

// ============================================================================
// TYPED EXTRACTOR
// ============================================================================

/// Typed extractor for the authenticated caseworker.
///
/// `auth_middleware` must run first; without it the extractor fails with a
/// 500.
#[derive(Debug, Clone)]
pub struct AuthExtractor(pub CaseworkerIdentity);

#[axum::async_trait]
impl<S> FromRequestParts<S> for AuthExtractor
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<CaseworkerIdentity>()
            .cloned()
            .map(AuthExtractor)
            .ok_or_else(|| {
                ApiError::internal_error(
                    "Caseworker identity not found in request extensions. \
                     Ensure auth_middleware is applied to this route.",
                )
            })
    }
}

impl std::ops::Deref for AuthExtractor {
    type Target = CaseworkerIdentity;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::{generate_jwt_token, test_clocks, AuthConfig, Claims, JwtAuthGateway, JwtSecret};
    use crate::error::ErrorCode;
    use axum::{body::Body, http::StatusCode, middleware, routing::get, Router};
    use tower::ServiceExt;

    fn test_config() -> AuthConfig {
        AuthConfig {
            jwt_secret: JwtSecret::new("middleware-test-secret-0123456789".to_string())
                .expect("secret should be valid"),
            clock: Arc::new(test_clocks::valid()),
            ..AuthConfig::default()
        }
    }

    fn test_app(config: AuthConfig) -> Router {
        async fn handler(AuthExtractor(identity): AuthExtractor) -> String {
            identity.login_name
        }

        let gateway: Arc<dyn AuthGateway> = Arc::new(JwtAuthGateway::new(config));
        Router::new()
            .route("/protected", get(handler))
            .layer(middleware::from_fn_with_state(gateway, auth_middleware))
    }

    async fn error_code(response: Response) -> Result<ErrorCode, String> {
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .map_err(|e| format!("Failed to read body: {:?}", e))?;
        let value: serde_json::Value = serde_json::from_slice(&body).map_err(|e| e.to_string())?;
        serde_json::from_value(value["code"].clone()).map_err(|e| e.to_string())
    }

    #[tokio::test]
    async fn test_missing_header_is_unauthorized() -> Result<(), String> {
        let request = Request::builder()
            .uri("/protected")
            .body(Body::empty())
            .map_err(|e| e.to_string())?;

        let response = test_app(test_config())
            .oneshot(request)
            .await
            .map_err(|e| format!("Request failed: {:?}", e))?;

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(error_code(response).await?, ErrorCode::Unauthorized);
        Ok(())
    }

    #[tokio::test]
    async fn test_wrong_scheme_is_invalid_token() -> Result<(), String> {
        let request = Request::builder()
            .uri("/protected")
            .header("authorization", "NotBearer token")
            .body(Body::empty())
            .map_err(|e| e.to_string())?;

        let response = test_app(test_config())
            .oneshot(request)
            .await
            .map_err(|e| format!("Request failed: {:?}", e))?;

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(error_code(response).await?, ErrorCode::InvalidToken);
        Ok(())
    }

    #[tokio::test]
    async fn test_identity_injection() -> Result<(), String> {
        let config = test_config();
        let claims = Claims::new("lmartinez", 3600, config.clock.as_ref());
        let token = generate_jwt_token(&config, &claims).map_err(|e| e.message)?;

        let request = Request::builder()
            .uri("/protected")
            .header("authorization", format!("Bearer {}", token))
            .body(Body::empty())
            .map_err(|e| e.to_string())?;

        let response = test_app(config)
            .oneshot(request)
            .await
            .map_err(|e| format!("Request failed: {:?}", e))?;

        assert_eq!(response.status(), StatusCode::OK);
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .map_err(|e| format!("Failed to read body: {:?}", e))?;
        assert_eq!(&body[..], b"lmartinez");
        Ok(())
    }
}
