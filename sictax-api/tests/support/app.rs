//! Router harness over the in-memory record store.
#![allow(dead_code)]


use std::sync::Arc;

use axum::{
    body::Body,
    http::{header, Method, Request, StatusCode},
    Router,
};
use sictax_api::auth::test_clocks;
use sictax_api::{
    create_api_router, generate_jwt_token, ApiConfig, AppState, AuthConfig, AuthGateway,
    CaseworkerIdentity, Claims, JwtAuthGateway, JwtSecret,
};
use sictax_storage::{MockRecordStore, RecordStore};
use tower::ServiceExt;

pub const TEST_SECRET: &str = "integration-test-secret-0123456789";

pub fn auth_config() -> AuthConfig {
    AuthConfig {
        jwt_secret: JwtSecret::new(TEST_SECRET.to_string()).expect("test secret is valid"),
        clock: Arc::new(test_clocks::valid()),
        ..AuthConfig::default()
    }
}

pub fn caseworker(login: &str) -> CaseworkerIdentity {
    CaseworkerIdentity {
        login_name: login.to_string(),
        display_name: None,
        role: None,
        user_id: None,
    }
}

/// Full router over a clone of `store`.
pub fn test_app(store: &MockRecordStore) -> Router {
    let store: Arc<dyn RecordStore> = Arc::new(store.clone());
    let auth: Arc<dyn AuthGateway> = Arc::new(JwtAuthGateway::new(auth_config()));
    create_api_router(AppState::new(store, auth), &ApiConfig::default())
}

/// `Authorization` header value for `login`, signed with the test secret.
pub fn bearer(login: &str) -> String {
    let config = auth_config();
    let claims = Claims::new(login, 3600, config.clock.as_ref()).with_profile("Laura", "Reconocedor");
    let token = generate_jwt_token(&config, &claims).expect("token should be generated");
    format!("Bearer {}", token)
}

pub fn claim_request(authorization: Option<&str>, body: &str) -> Request<Body> {
    let mut builder = Request::builder()
        .method(Method::POST)
        .uri("/datosasignados")
        .header(header::CONTENT_TYPE, "application/json");
    if let Some(value) = authorization {
        builder = builder.header(header::AUTHORIZATION, value);
    }
    builder
        .body(Body::from(body.to_string()))
        .expect("request should build")
}

pub fn get(uri: &str) -> Request<Body> {
    Request::builder()
        .uri(uri)
        .body(Body::empty())
        .expect("request should build")
}

/// Send one request and return status and raw body.
pub async fn send_raw(app: Router, request: Request<Body>) -> (StatusCode, Vec<u8>) {
    let response = app.oneshot(request).await.expect("router is infallible");
    let status = response.status();
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("body should be readable");
    (status, body.to_vec())
}

/// Send one request and parse the JSON body.
pub async fn send(app: Router, request: Request<Body>) -> (StatusCode, serde_json::Value) {
    let (status, body) = send_raw(app, request).await;
    let value = serde_json::from_slice(&body).expect("body should be JSON");
    (status, value)
}
