//! REST API Routes Module
//!
//! Route modules and the top-level router:
//! - `/datosasignados` (auth required)
//! - `/health/*` (public)
//! - `/metrics` (public)
//! - `/openapi.json` (public, `openapi` feature)

use axum::{
    http::{header, HeaderValue, Method},
    middleware::{from_fn, from_fn_with_state},
    routing::get,
    Router,
};
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::config::ApiConfig;
use crate::middleware::auth_middleware;
use crate::state::AppState;
use crate::telemetry::{metrics_handler, observability_middleware};

pub mod assignment;
pub mod health;

// ============================================================================
// OPENAPI HANDLER
// ============================================================================

#[cfg(feature = "openapi")]
async fn openapi_json() -> impl axum::response::IntoResponse {
    use utoipa::OpenApi;
    axum::Json(crate::openapi::ApiDoc::openapi())
}

// ============================================================================
// CORS LAYER
// ============================================================================

/// Build the CORS layer from ApiConfig.
///
/// In development mode (empty origins), allows all origins.
/// In production mode, only allows configured origins (exact or `*.` wildcard).
fn build_cors_layer(config: &ApiConfig) -> CorsLayer {
    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE, header::ACCEPT])
        .max_age(config.cors_max_age());

    if !config.is_cors_restricted() {
        tracing::info!("CORS: Development mode - allowing all origins");
        cors.allow_origin(Any)
    } else {
        tracing::info!(
            "CORS: Production mode - allowing origins: {:?}",
            config.cors_origins
        );
        let allowed = config.clone();
        let cors = cors.allow_origin(AllowOrigin::predicate(
            move |origin: &HeaderValue, _| {
                origin
                    .to_str()
                    .map(|o| allowed.is_origin_allowed(o))
                    .unwrap_or(false)
            },
        ));

        if config.cors_allow_credentials {
            cors.allow_credentials(true)
        } else {
            cors
        }
    }
}

// ============================================================================
// ROUTER
// ============================================================================

/// Create the complete API router.
///
/// Layer order, outermost first: CORS, HTTP trace, observability, then auth on
/// the protected routes only.
pub fn create_api_router(state: AppState, api_config: &ApiConfig) -> Router {
    // route_layer keeps unmatched paths out of auth so they still 404
    let protected = assignment::create_router()
        .route_layer(from_fn_with_state(state.auth.clone(), auth_middleware));

    #[allow(unused_mut)]
    let mut router = Router::new()
        .merge(protected)
        .nest("/health", health::create_router())
        .route("/metrics", get(metrics_handler));

    #[cfg(feature = "openapi")]
    {
        router = router.route("/openapi.json", get(openapi_json));
    }

    router
        .layer(from_fn(observability_middleware))
        .layer(TraceLayer::new_for_http())
        .layer(build_cors_layer(api_config))
        .with_state(state)
}
