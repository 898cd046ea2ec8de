mod common;
mod http_helpers;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use common::{
    MAX_FAILED_ATTEMPTS, admin_token, app, login, login_token, read_json, security, test_state,
    test_state_with,
};
use http_helpers::{empty_request, json_request};
use tower::ServiceExt;

#[tokio::test]
async fn failed_logins_count_down_then_lock() {
    let state = test_state().await;
    let app = app(&state);

    for expected in (0..MAX_FAILED_ATTEMPTS).rev() {
        let response = login(&app, "admin", "wrong-password").await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        let body = read_json(response).await;
        assert_eq!(body["remaining_attempts"], expected);
    }

    // even the right password is refused while locked
    let response = login(&app, "admin", common::ADMIN_PASSWORD).await;
    assert_eq!(response.status(), StatusCode::LOCKED);
}

#[tokio::test]
async fn forwarded_for_from_an_untrusted_peer_cannot_dodge_the_lockout() {
    let state = test_state_with(backoffice::config::SecurityConfig {
        trusted_proxies: Vec::new(),
        ..security()
    })
    .await;
    let app = app(&state);

    let mut statuses = Vec::new();
    for attempt in 0..10 {
        let request = Request::builder()
            .method("POST")
            .uri("/api/v1/login")
            .header("content-type", "application/json")
            .header("x-forwarded-for", format!("198.51.100.{attempt}"))
            .body(Body::from(
                serde_json::json!({ "username": "admin", "password": "wrong-password" })
                    .to_string(),
            ))
            .expect("request");
        let response = app.clone().oneshot(request).await.expect("login");
        statuses.push(response.status());
    }
    assert!(
        statuses[..MAX_FAILED_ATTEMPTS as usize]
            .iter()
            .all(|status| *status == StatusCode::UNAUTHORIZED)
    );
    assert!(
        statuses[MAX_FAILED_ATTEMPTS as usize..]
            .iter()
            .all(|status| *status == StatusCode::LOCKED)
    );
}

#[tokio::test]
async fn success_resets_the_counter() {
    let state = test_state().await;
    let app = app(&state);

    let response = login(&app, "admin", "wrong-password").await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    admin_token(&app).await;

    let response = login(&app, "admin", "wrong-password").await;
    let body = read_json(response).await;
    assert_eq!(body["remaining_attempts"], MAX_FAILED_ATTEMPTS - 1);
}

#[tokio::test]
async fn unknown_user_is_a_bad_credential() {
    let state = test_state().await;
    let app = app(&state);
    let response = login(&app, "nobody", "whatever-password").await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn guarded_routes_require_a_valid_token() {
    let state = test_state().await;
    let app = app(&state);

    let missing = app
        .clone()
        .oneshot(
            Request::get("/api/v1/customer/menus")
                .body(Body::empty())
                .expect("req"),
        )
        .await
        .expect("missing");
    assert_eq!(missing.status(), StatusCode::UNAUTHORIZED);

    let forged = app
        .oneshot(empty_request("GET", "/api/v1/customer/menus", "not-a-jwt"))
        .await
        .expect("forged");
    assert_eq!(forged.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn non_staff_access_follows_the_policy_graph() {
    let state = test_state().await;
    let app = app(&state);
    let admin = admin_token(&app).await;

    let resource = app
        .clone()
        .oneshot(json_request(
            "POST",
            "/api/v1/customer/resources",
            &admin,
            serde_json::json!({ "url": "/api/v1/customer/menus", "method": "GET" }),
        ))
        .await
        .expect("resource");
    let resource_id = read_json(resource).await["id"].as_u64().expect("id");

    let menu = app
        .clone()
        .oneshot(json_request(
            "POST",
            "/api/v1/customer/menus",
            &admin,
            serde_json::json!({ "path": "/menus", "name": "menus", "resource_ids": [resource_id] }),
        ))
        .await
        .expect("menu");
    let menu_id = read_json(menu).await["id"].as_u64().expect("id");

    let role = app
        .clone()
        .oneshot(json_request(
            "POST",
            "/api/v1/customer/roles",
            &admin,
            serde_json::json!({ "name": "viewer", "menu_ids": [menu_id] }),
        ))
        .await
        .expect("role");
    let role_id = read_json(role).await["id"].as_u64().expect("id");

    let user = app
        .clone()
        .oneshot(json_request(
            "POST",
            "/api/v1/customer/users",
            &admin,
            serde_json::json!({ "username": "viewer", "password": "viewer-password", "role_id": role_id }),
        ))
        .await
        .expect("user");
    assert_eq!(user.status(), StatusCode::CREATED);
    let user_id = read_json(user).await["id"].as_u64().expect("id");

    let token = login_token(&app, "viewer", "viewer-password").await;
    let allowed = app
        .clone()
        .oneshot(empty_request("GET", "/api/v1/customer/menus", &token))
        .await
        .expect("allowed");
    assert_eq!(allowed.status(), StatusCode::OK);

    let denied = app
        .clone()
        .oneshot(json_request(
            "POST",
            "/api/v1/customer/menus",
            &token,
            serde_json::json!({ "path": "/x", "name": "x" }),
        ))
        .await
        .expect("denied");
    assert_eq!(denied.status(), StatusCode::FORBIDDEN);

    // dropping the menu from the role revokes access on the next request
    let updated = app
        .clone()
        .oneshot(json_request(
            "PUT",
            &format!("/api/v1/customer/roles/{role_id}"),
            &admin,
            serde_json::json!({ "name": "viewer", "menu_ids": [] }),
        ))
        .await
        .expect("update role");
    assert_eq!(updated.status(), StatusCode::OK);
    let revoked = app
        .clone()
        .oneshot(empty_request("GET", "/api/v1/customer/menus", &token))
        .await
        .expect("revoked");
    assert_eq!(revoked.status(), StatusCode::FORBIDDEN);

    let disabled = app
        .clone()
        .oneshot(json_request(
            "PUT",
            &format!("/api/v1/customer/users/{user_id}"),
            &admin,
            serde_json::json!({ "is_active": false }),
        ))
        .await
        .expect("disable");
    assert_eq!(disabled.status(), StatusCode::OK);
    let response = login(&app, "viewer", "viewer-password").await;
    assert_eq!(response.status(), StatusCode::LOCKED);
}
