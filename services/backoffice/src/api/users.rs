//! User account handlers. Password hashes never leave the store layer.
use crate::api::error::{ApiError, api_store_error, api_sync_error, api_validation_error};
use crate::api::types::{LoginRecordListResponse, PasswordResetRequest, UserListResponse};
use crate::api::{list_query, sync_context};
use crate::app::AppState;
use crate::auth::password::check_strength;
use crate::model::{User, UserCreateRequest, UserUpdateRequest};
use axum::Json;
use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::IntoResponse;
use std::collections::BTreeMap;

#[utoipa::path(
    get,
    path = "/api/v1/customer/users",
    tag = "users",
    params(
        ("page" = Option<u32>, Query, description = "1-based page number"),
        ("size" = Option<u32>, Query, description = "Page size, at most 100"),
        ("order" = Option<String>, Query, description = "asc or desc by id"),
        ("username" = Option<String>, Query, description = "Exact username filter"),
        ("role_id" = Option<u32>, Query, description = "Users holding this role")
    ),
    responses((status = 200, description = "List users", body = UserListResponse)),
    security(("bearer" = []))
)]
pub(crate) async fn list_users(
    State(state): State<AppState>,
    Query(params): Query<BTreeMap<String, String>>,
) -> Result<Json<UserListResponse>, ApiError> {
    let query = list_query(params)?;
    let page = state
        .store
        .list_users(&query)
        .await
        .map_err(|err| api_store_error("list users", err))?;
    Ok(Json(page.into()))
}

#[utoipa::path(
    post,
    path = "/api/v1/customer/users",
    tag = "users",
    request_body = UserCreateRequest,
    responses(
        (status = 201, description = "User created", body = User),
        (status = 404, description = "Role not found", body = crate::api::types::ErrorResponse),
        (status = 409, description = "Username taken", body = crate::api::types::ErrorResponse)
    ),
    security(("bearer" = []))
)]
pub(crate) async fn create_user(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<UserCreateRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let ctx = sync_context(&state, &headers);
    let user = state
        .sync
        .create_user(&ctx, body)
        .await
        .map_err(|err| api_sync_error("create user", err).with_request_id(ctx.trace_id()))?;
    Ok((StatusCode::CREATED, Json(user)))
}

#[utoipa::path(
    get,
    path = "/api/v1/customer/users/{id}",
    tag = "users",
    params(("id" = u32, Path, description = "User id")),
    responses(
        (status = 200, description = "User", body = User),
        (status = 404, description = "User not found", body = crate::api::types::ErrorResponse)
    ),
    security(("bearer" = []))
)]
pub(crate) async fn get_user(
    Path(id): Path<u32>,
    State(state): State<AppState>,
) -> Result<Json<User>, ApiError> {
    state
        .store
        .get_user(id)
        .await
        .map(Json)
        .map_err(|err| api_store_error("load user", err))
}

#[utoipa::path(
    put,
    path = "/api/v1/customer/users/{id}",
    tag = "users",
    params(("id" = u32, Path, description = "User id")),
    request_body = UserUpdateRequest,
    responses(
        (status = 200, description = "User updated", body = User),
        (status = 404, description = "User or role not found", body = crate::api::types::ErrorResponse)
    ),
    security(("bearer" = []))
)]
pub(crate) async fn update_user(
    Path(id): Path<u32>,
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<UserUpdateRequest>,
) -> Result<Json<User>, ApiError> {
    let ctx = sync_context(&state, &headers);
    state
        .sync
        .update_user(&ctx, id, body)
        .await
        .map(Json)
        .map_err(|err| api_sync_error("update user", err).with_request_id(ctx.trace_id()))
}

#[utoipa::path(
    delete,
    path = "/api/v1/customer/users/{id}",
    tag = "users",
    params(("id" = u32, Path, description = "User id")),
    responses(
        (status = 204, description = "User deleted"),
        (status = 404, description = "User not found", body = crate::api::types::ErrorResponse)
    ),
    security(("bearer" = []))
)]
pub(crate) async fn delete_user(
    Path(id): Path<u32>,
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<StatusCode, ApiError> {
    let ctx = sync_context(&state, &headers);
    state
        .sync
        .delete_user(&ctx, id)
        .await
        .map_err(|err| api_sync_error("delete user", err).with_request_id(ctx.trace_id()))?;
    Ok(StatusCode::NO_CONTENT)
}

/// Confirmation must match and the password must reach the configured
/// strength level.
pub(crate) fn checked_new_password(
    state: &AppState,
    new_password: &str,
    confirm_password: &str,
) -> Result<(), ApiError> {
    if new_password != confirm_password {
        return Err(api_validation_error("passwords do not match"));
    }
    check_strength(new_password, state.security.password_strength)
        .map_err(|err| api_validation_error(&err.to_string()))
}

#[utoipa::path(
    patch,
    path = "/api/v1/customer/users/{id}/password",
    tag = "users",
    params(("id" = u32, Path, description = "User id")),
    request_body = PasswordResetRequest,
    responses(
        (status = 204, description = "Password reset"),
        (status = 400, description = "Mismatched or weak password", body = crate::api::types::ErrorResponse),
        (status = 404, description = "User not found", body = crate::api::types::ErrorResponse)
    ),
    security(("bearer" = []))
)]
pub(crate) async fn reset_password(
    Path(id): Path<u32>,
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<PasswordResetRequest>,
) -> Result<StatusCode, ApiError> {
    checked_new_password(&state, &body.new_password, &body.confirm_password)?;
    let ctx = sync_context(&state, &headers);
    state
        .sync
        .update_user(
            &ctx,
            id,
            UserUpdateRequest {
                password: Some(body.new_password),
                ..UserUpdateRequest::default()
            },
        )
        .await
        .map_err(|err| api_sync_error("reset password", err).with_request_id(ctx.trace_id()))?;
    tracing::info!(user_id = id, "password reset by administrator");
    Ok(StatusCode::NO_CONTENT)
}

#[utoipa::path(
    get,
    path = "/api/v1/customer/users/records/login",
    tag = "users",
    params(
        ("page" = Option<u32>, Query, description = "1-based page number"),
        ("size" = Option<u32>, Query, description = "Page size, at most 100"),
        ("order" = Option<String>, Query, description = "asc or desc by id"),
        ("username" = Option<String>, Query, description = "Exact username filter"),
        ("ip_address" = Option<String>, Query, description = "Exact client address filter"),
        ("success" = Option<bool>, Query, description = "Only successful or failed attempts")
    ),
    responses((status = 200, description = "Login attempts", body = LoginRecordListResponse)),
    security(("bearer" = []))
)]
pub(crate) async fn list_login_records(
    State(state): State<AppState>,
    Query(params): Query<BTreeMap<String, String>>,
) -> Result<Json<LoginRecordListResponse>, ApiError> {
    let query = list_query(params)?;
    let page = state
        .store
        .list_login_records(&query)
        .await
        .map_err(|err| api_store_error("list login records", err))?;
    Ok(Json(page.into()))
}
