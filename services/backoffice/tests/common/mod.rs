#![allow(dead_code)]

use axum::body::Body;
use axum::extract::connect_info::MockConnectInfo;
use axum::http::{Request, StatusCode};
use backoffice::app::{AppState, build_router};
use backoffice::auth::rbac::bootstrap::seed_admin;
use backoffice::auth::rbac::sync::SyncContext;
use backoffice::config::{AdminSeedConfig, DEFAULT_JWT_ISSUER, SecurityConfig};
use backoffice::store::memory::InMemoryStore;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceExt;

pub const ADMIN_USERNAME: &str = "admin";
pub const ADMIN_PASSWORD: &str = "admin-password";
pub const MAX_FAILED_ATTEMPTS: u32 = 3;
/// Every test request arrives from this peer, which is a trusted proxy in
/// [`security`], so `x-forwarded-for` picks the client.
pub const TEST_PEER: SocketAddr = SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), 40_000);

pub type TestApp = axum::routing::RouterIntoService<Body, ()>;

pub async fn read_json(response: axum::response::Response) -> serde_json::Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("body");
    serde_json::from_slice(&bytes).expect("json")
}

pub fn security() -> SecurityConfig {
    SecurityConfig {
        jwt_secret: "test-secret-test-secret-test-secret".to_string(),
        jwt_issuer: DEFAULT_JWT_ISSUER.to_string(),
        access_token_minutes: 5,
        refresh_token_minutes: 60,
        max_failed_attempts: MAX_FAILED_ATTEMPTS,
        lock_minutes: 1,
        password_strength: 2,
        trusted_proxies: vec![TEST_PEER.ip()],
    }
}

/// Memory-backed state with a seeded staff administrator.
pub async fn test_state() -> AppState {
    test_state_with(security()).await
}

pub async fn test_state_with(security: SecurityConfig) -> AppState {
    let state = AppState::new(
        Arc::new(InMemoryStore::new()),
        security,
        Duration::from_secs(5),
    )
    .await
    .expect("state");
    let seed = AdminSeedConfig {
        username: ADMIN_USERNAME.to_string(),
        password: ADMIN_PASSWORD.to_string(),
    };
    seed_admin(&SyncContext::background(), &state.sync, &seed)
        .await
        .expect("seed admin");
    state
}

pub fn app(state: &AppState) -> TestApp {
    build_router(state.clone())
        .layer(MockConnectInfo(TEST_PEER))
        .into_service()
}

pub async fn login(app: &TestApp, username: &str, password: &str) -> axum::response::Response {
    let request = Request::builder()
        .method("POST")
        .uri("/api/v1/login")
        .header("content-type", "application/json")
        .header("x-forwarded-for", format!("client-{username}"))
        .body(Body::from(
            serde_json::json!({ "username": username, "password": password }).to_string(),
        ))
        .expect("request");
    app.clone().oneshot(request).await.expect("login")
}

pub async fn login_token(app: &TestApp, username: &str, password: &str) -> String {
    let response = login(app, username, password).await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = read_json(response).await;
    body["access_token"]
        .as_str()
        .expect("access_token")
        .to_string()
}

pub async fn admin_token(app: &TestApp) -> String {
    login_token(app, ADMIN_USERNAME, ADMIN_PASSWORD).await
}
