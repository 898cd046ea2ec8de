//! Role handlers.
//!
//! A role's effective permissions are the union of everything reachable from
//! its linked roles, menus and buttons.
use crate::api::error::{ApiError, api_store_error, api_sync_error};
use crate::api::types::RoleListResponse;
use crate::api::{list_query, sync_context};
use crate::app::AppState;
use crate::model::{Role, RoleInput};
use axum::Json;
use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::IntoResponse;
use std::collections::BTreeMap;

#[utoipa::path(
    get,
    path = "/api/v1/customer/roles",
    tag = "roles",
    params(
        ("page" = Option<u32>, Query, description = "1-based page number"),
        ("size" = Option<u32>, Query, description = "Page size, at most 100"),
        ("order" = Option<String>, Query, description = "asc or desc by id"),
        ("name" = Option<String>, Query, description = "Exact name filter")
    ),
    responses(
        (status = 200, description = "List roles", body = RoleListResponse),
        (status = 400, description = "Invalid query", body = crate::api::types::ErrorResponse)
    ),
    security(("bearer" = []))
)]
pub(crate) async fn list_roles(
    State(state): State<AppState>,
    Query(params): Query<BTreeMap<String, String>>,
) -> Result<Json<RoleListResponse>, ApiError> {
    let query = list_query(params)?;
    let page = state
        .store
        .list_roles(&query)
        .await
        .map_err(|err| api_store_error("list roles", err))?;
    Ok(Json(page.into()))
}

#[utoipa::path(
    post,
    path = "/api/v1/customer/roles",
    tag = "roles",
    request_body = RoleInput,
    responses(
        (status = 201, description = "Role created", body = Role),
        (status = 400, description = "Missing name", body = crate::api::types::ErrorResponse),
        (status = 409, description = "name already taken or role still assigned", body = crate::api::types::ErrorResponse)
    ),
    security(("bearer" = []))
)]
pub(crate) async fn create_role(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<RoleInput>,
) -> Result<impl IntoResponse, ApiError> {
    let ctx = sync_context(&state, &headers);
    let role = state
        .sync
        .create_role(&ctx, body)
        .await
        .map_err(|err| api_sync_error("create role", err).with_request_id(ctx.trace_id()))?;
    Ok((StatusCode::CREATED, Json(role)))
}

#[utoipa::path(
    get,
    path = "/api/v1/customer/roles/{id}",
    tag = "roles",
    params(("id" = u32, Path, description = "Role id")),
    responses(
        (status = 200, description = "Role", body = Role),
        (status = 404, description = "Role not found", body = crate::api::types::ErrorResponse)
    ),
    security(("bearer" = []))
)]
pub(crate) async fn get_role(
    Path(id): Path<u32>,
    State(state): State<AppState>,
) -> Result<Json<Role>, ApiError> {
    let role = state
        .store
        .get_role(id)
        .await
        .map_err(|err| api_store_error("load role", err))?;
    Ok(Json(role))
}

#[utoipa::path(
    put,
    path = "/api/v1/customer/roles/{id}",
    tag = "roles",
    params(("id" = u32, Path, description = "Role id")),
    request_body = RoleInput,
    responses(
        (status = 200, description = "Role updated", body = Role),
        (status = 404, description = "Role not found", body = crate::api::types::ErrorResponse)
    ),
    security(("bearer" = []))
)]
pub(crate) async fn update_role(
    Path(id): Path<u32>,
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<RoleInput>,
) -> Result<Json<Role>, ApiError> {
    let ctx = sync_context(&state, &headers);
    let role = state
        .sync
        .update_role(&ctx, id, body)
        .await
        .map_err(|err| api_sync_error("update role", err).with_request_id(ctx.trace_id()))?;
    Ok(Json(role))
}

#[utoipa::path(
    delete,
    path = "/api/v1/customer/roles/{id}",
    tag = "roles",
    params(("id" = u32, Path, description = "Role id")),
    responses(
        (status = 204, description = "Role deleted and its grants withdrawn"),
        (status = 404, description = "Role not found", body = crate::api::types::ErrorResponse),
        (status = 409, description = "Role still assigned to users", body = crate::api::types::ErrorResponse)
    ),
    security(("bearer" = []))
)]
pub(crate) async fn delete_role(
    Path(id): Path<u32>,
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<StatusCode, ApiError> {
    let ctx = sync_context(&state, &headers);
    state
        .sync
        .delete_role(&ctx, id)
        .await
        .map_err(|err| api_sync_error("delete role", err).with_request_id(ctx.trace_id()))?;
    Ok(StatusCode::NO_CONTENT)
}
