//! Own-account routes under `/api/v1/me`. The caller is always the token's
//! principal, never a path parameter.
use crate::api::error::{
    ApiError, api_internal, api_internal_message, api_store_error, api_sync_error,
    api_unauthorized, api_validation_error,
};
use crate::api::types::{LoginRecordListResponse, PasswordChangeRequest};
use crate::api::users::checked_new_password;
use crate::api::{list_query, sync_context};
use crate::app::AppState;
use crate::auth::middleware::Principal;
use crate::auth::password::verify_password_blocking;
use crate::model::UserUpdateRequest;
use crate::store::StoreError;
use axum::extract::{Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::{Extension, Json};
use std::collections::BTreeMap;

#[utoipa::path(
    patch,
    path = "/api/v1/me/password",
    tag = "me",
    request_body = PasswordChangeRequest,
    responses(
        (status = 204, description = "Password changed"),
        (status = 400, description = "Wrong old password, mismatch, or weak password", body = crate::api::types::ErrorResponse)
    ),
    security(("bearer" = []))
)]
pub(crate) async fn change_password(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    headers: HeaderMap,
    Json(body): Json<PasswordChangeRequest>,
) -> Result<StatusCode, ApiError> {
    let account = match state.store.get_user_by_username(&principal.username).await {
        Ok(account) if account.user.id == principal.user_id => account,
        Ok(_) | Err(StoreError::NotFound(_)) => {
            return Err(api_unauthorized("account no longer exists"));
        }
        Err(err) => return Err(api_internal("failed to load user", &err)),
    };
    let matches = verify_password_blocking(body.old_password, account.password_hash)
        .await
        .map_err(|err| {
            tracing::error!(error = %err, "password verification task failed");
            api_internal_message("failed to verify credentials")
        })?;
    if !matches {
        return Err(api_validation_error("old password is incorrect"));
    }
    checked_new_password(&state, &body.new_password, &body.confirm_password)?;

    let ctx = sync_context(&state, &headers);
    state
        .sync
        .update_user(
            &ctx,
            principal.user_id,
            UserUpdateRequest {
                password: Some(body.new_password),
                ..UserUpdateRequest::default()
            },
        )
        .await
        .map_err(|err| api_sync_error("change password", err).with_request_id(ctx.trace_id()))?;
    tracing::info!(user_id = principal.user_id, "password changed");
    Ok(StatusCode::NO_CONTENT)
}

#[utoipa::path(
    get,
    path = "/api/v1/me/records/login",
    tag = "me",
    params(
        ("page" = Option<u32>, Query, description = "1-based page number"),
        ("size" = Option<u32>, Query, description = "Page size, at most 100"),
        ("order" = Option<String>, Query, description = "asc or desc by id"),
        ("success" = Option<bool>, Query, description = "Only successful or failed attempts")
    ),
    responses((status = 200, description = "Own login attempts", body = LoginRecordListResponse)),
    security(("bearer" = []))
)]
pub(crate) async fn my_login_records(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Query(params): Query<BTreeMap<String, String>>,
) -> Result<Json<LoginRecordListResponse>, ApiError> {
    let mut query = list_query(params)?;
    query
        .filters
        .insert("username".to_string(), principal.username);
    let page = state
        .store
        .list_login_records(&query)
        .await
        .map_err(|err| api_store_error("list login records", err))?;
    Ok(Json(page.into()))
}
