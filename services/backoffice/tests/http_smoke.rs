mod common;
mod http_helpers;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use common::{admin_token, app, read_json, test_state};
use http_helpers::{empty_request, json_request};
use tower::ServiceExt;

#[tokio::test]
async fn system_endpoints_are_public() {
    let state = test_state().await;
    let app = app(&state);

    let info = app
        .clone()
        .oneshot(Request::get("/v1/system/info").body(Body::empty()).expect("req"))
        .await
        .expect("info");
    assert_eq!(info.status(), StatusCode::OK);
    let body = read_json(info).await;
    assert_eq!(body["service"], "artweb-backoffice");
    assert_eq!(body["storage_backend"], "memory");
    assert_eq!(body["features"]["persistent_policies"], false);

    let health = app
        .clone()
        .oneshot(Request::get("/v1/system/health").body(Body::empty()).expect("req"))
        .await
        .expect("health");
    assert_eq!(health.status(), StatusCode::OK);

    let doc = app
        .oneshot(Request::get("/v1/openapi.json").body(Body::empty()).expect("req"))
        .await
        .expect("openapi");
    assert_eq!(doc.status(), StatusCode::OK);
}

#[tokio::test]
async fn admin_manages_the_menu_tree() {
    let state = test_state().await;
    let app = app(&state);
    let token = admin_token(&app).await;

    let created = app
        .clone()
        .oneshot(json_request(
            "POST",
            "/api/v1/customer/resources",
            &token,
            serde_json::json!({ "url": "/api/v1/customer/menus", "method": "get", "label": "list menus" }),
        ))
        .await
        .expect("resource");
    assert_eq!(created.status(), StatusCode::CREATED);
    let resource = read_json(created).await;
    assert_eq!(resource["method"], "GET");
    let resource_id = resource["id"].as_u64().expect("id");

    let created = app
        .clone()
        .oneshot(json_request(
            "POST",
            "/api/v1/customer/menus",
            &token,
            serde_json::json!({ "path": "/system", "name": "system", "resource_ids": [resource_id] }),
        ))
        .await
        .expect("menu");
    assert_eq!(created.status(), StatusCode::CREATED);
    let root_id = read_json(created).await["id"].as_u64().expect("id");

    let created = app
        .clone()
        .oneshot(json_request(
            "POST",
            "/api/v1/customer/menus",
            &token,
            serde_json::json!({ "path": "/system/users", "name": "users", "parent_id": root_id }),
        ))
        .await
        .expect("child");
    assert_eq!(created.status(), StatusCode::CREATED);
    let child_id = read_json(created).await["id"].as_u64().expect("id");

    // a menu may not become its own descendant
    let cyclic = app
        .clone()
        .oneshot(json_request(
            "PUT",
            &format!("/api/v1/customer/menus/{root_id}"),
            &token,
            serde_json::json!({ "path": "/system", "name": "system", "parent_id": child_id }),
        ))
        .await
        .expect("cycle");
    assert_eq!(cyclic.status(), StatusCode::BAD_REQUEST);

    let listed = app
        .clone()
        .oneshot(empty_request(
            "GET",
            &format!("/api/v1/customer/menus?parent_id={root_id}"),
            &token,
        ))
        .await
        .expect("list");
    assert_eq!(listed.status(), StatusCode::OK);
    let listed = read_json(listed).await;
    assert_eq!(listed["total"], 1);
    assert_eq!(listed["items"][0]["id"], child_id);

    let removed = app
        .clone()
        .oneshot(empty_request(
            "DELETE",
            &format!("/api/v1/customer/menus/{root_id}"),
            &token,
        ))
        .await
        .expect("delete");
    assert_eq!(removed.status(), StatusCode::OK);
    let removed = read_json(removed).await;
    let menu_ids: Vec<u64> = removed["menu_ids"]
        .as_array()
        .expect("menu_ids")
        .iter()
        .filter_map(|id| id.as_u64())
        .collect();
    assert!(menu_ids.contains(&root_id) && menu_ids.contains(&child_id));

    let missing = app
        .oneshot(empty_request(
            "GET",
            &format!("/api/v1/customer/menus/{child_id}"),
            &token,
        ))
        .await
        .expect("get");
    assert_eq!(missing.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn unknown_filters_and_bad_paging_are_rejected() {
    let state = test_state().await;
    let app = app(&state);
    let token = admin_token(&app).await;

    let response = app
        .clone()
        .oneshot(empty_request("GET", "/api/v1/customer/roles?colour=red", &token))
        .await
        .expect("filter");
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response = app
        .oneshot(empty_request("GET", "/api/v1/customer/roles?order=sideways", &token))
        .await
        .expect("order");
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn policy_dump_and_reconcile() {
    let state = test_state().await;
    let app = app(&state);
    let token = admin_token(&app).await;

    app.clone()
        .oneshot(json_request(
            "POST",
            "/api/v1/customer/resources",
            &token,
            serde_json::json!({ "url": "/api/v1/customer/roles", "method": "GET" }),
        ))
        .await
        .expect("resource");

    let dump = app
        .clone()
        .oneshot(empty_request("GET", "/api/v1/customer/policies", &token))
        .await
        .expect("dump");
    assert_eq!(dump.status(), StatusCode::OK);
    let dump = read_json(dump).await;
    assert_eq!(dump["rules"].as_array().expect("rules").len(), 1);

    let report = app
        .oneshot(empty_request("POST", "/api/v1/customer/policies/reconcile", &token))
        .await
        .expect("reconcile");
    assert_eq!(report.status(), StatusCode::OK);
    let report = read_json(report).await;
    assert_eq!(report["rules"], 1);
    assert_eq!(report["rules_added"], 0);
    assert_eq!(report["rules_pruned"], 0);
}

#[tokio::test]
async fn role_with_users_cannot_be_deleted() {
    let state = test_state().await;
    let app = app(&state);
    let token = admin_token(&app).await;

    let role = app
        .clone()
        .oneshot(json_request(
            "POST",
            "/api/v1/customer/roles",
            &token,
            serde_json::json!({ "name": "auditor" }),
        ))
        .await
        .expect("role");
    assert_eq!(role.status(), StatusCode::CREATED);
    let role_id = read_json(role).await["id"].as_u64().expect("id");

    let user = app
        .clone()
        .oneshot(json_request(
            "POST",
            "/api/v1/customer/users",
            &token,
            serde_json::json!({ "username": "alice", "password": "alice-password", "role_id": role_id }),
        ))
        .await
        .expect("user");
    assert_eq!(user.status(), StatusCode::CREATED);
    let user = read_json(user).await;
    assert!(user.get("password").is_none());
    assert!(user.get("password_hash").is_none());

    let response = app
        .oneshot(empty_request(
            "DELETE",
            &format!("/api/v1/customer/roles/{role_id}"),
            &token,
        ))
        .await
        .expect("delete");
    assert_eq!(response.status(), StatusCode::CONFLICT);
}
