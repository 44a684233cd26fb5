//! SICTAX API Server Entry Point
//!
//! Loads configuration from the environment, builds the connection pool and
//! starts the Axum HTTP server.

use std::sync::Arc;

use axum::Router;
use sictax_api::telemetry::{init_tracing, TelemetryConfig};
use sictax_api::{
    create_api_router, ApiConfig, ApiError, ApiResult, AppState, AuthConfig, AuthGateway,
    DbConfig, JwtAuthGateway, PgRecordStore,
};
use sictax_storage::RecordStore;

#[tokio::main]
async fn main() -> ApiResult<()> {
    let telemetry_config = TelemetryConfig::from_env();
    init_tracing(&telemetry_config)?;

    let auth_config = AuthConfig::from_env();
    auth_config.validate_for_production()?;

    let db_config = DbConfig::from_env();
    let store: Arc<dyn RecordStore> = Arc::new(PgRecordStore::from_config(&db_config)?);
    let auth: Arc<dyn AuthGateway> = Arc::new(JwtAuthGateway::new(auth_config));

    let api_config = ApiConfig::from_env();
    let app: Router = create_api_router(AppState::new(store, auth), &api_config);

    let addr = api_config.socket_addr();
    tracing::info!(
        %addr,
        db_host = %db_config.host,
        db_name = %db_config.dbname,
        pool_size = db_config.max_size,
        "Starting SICTAX API server"
    );

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| ApiError::internal_error(format!("Failed to bind {}: {}", addr, e)))?;

    let server = axum::serve(listener, app);
    tokio::select! {
        result = server => {
            result.map_err(|e| ApiError::internal_error(format!("Server error: {}", e)))?;
        }
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Shutdown signal received");
        }
    }

    Ok(())
}
