//! Button handlers. A button inherits everything its menu grants.
use crate::api::error::{ApiError, api_store_error, api_sync_error};
use crate::api::types::ButtonListResponse;
use crate::api::{list_query, sync_context};
use crate::app::AppState;
use crate::model::{Button, ButtonInput};
use axum::Json;
use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::IntoResponse;
use std::collections::BTreeMap;

#[utoipa::path(
    get,
    path = "/api/v1/customer/buttons",
    tag = "buttons",
    params(
        ("page" = Option<u32>, Query, description = "1-based page number"),
        ("size" = Option<u32>, Query, description = "Page size, at most 100"),
        ("order" = Option<String>, Query, description = "asc or desc by id"),
        ("name" = Option<String>, Query, description = "Exact name filter"),
        ("menu_id" = Option<u32>, Query, description = "Buttons of this menu")
    ),
    responses(
        (status = 200, description = "List buttons", body = ButtonListResponse),
        (status = 400, description = "Invalid query", body = crate::api::types::ErrorResponse)
    ),
    security(("bearer" = []))
)]
pub(crate) async fn list_buttons(
    State(state): State<AppState>,
    Query(params): Query<BTreeMap<String, String>>,
) -> Result<Json<ButtonListResponse>, ApiError> {
    let query = list_query(params)?;
    let page = state
        .store
        .list_buttons(&query)
        .await
        .map_err(|err| api_store_error("list buttons", err))?;
    Ok(Json(page.into()))
}

#[utoipa::path(
    post,
    path = "/api/v1/customer/buttons",
    tag = "buttons",
    request_body = ButtonInput,
    responses(
        (status = 201, description = "Button created", body = Button),
        (status = 400, description = "Missing name or menu", body = crate::api::types::ErrorResponse),
        (status = 409, description = "name already taken", body = crate::api::types::ErrorResponse)
    ),
    security(("bearer" = []))
)]
pub(crate) async fn create_button(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<ButtonInput>,
) -> Result<impl IntoResponse, ApiError> {
    let ctx = sync_context(&state, &headers);
    let button = state
        .sync
        .create_button(&ctx, body)
        .await
        .map_err(|err| api_sync_error("create button", err).with_request_id(ctx.trace_id()))?;
    Ok((StatusCode::CREATED, Json(button)))
}

#[utoipa::path(
    get,
    path = "/api/v1/customer/buttons/{id}",
    tag = "buttons",
    params(("id" = u32, Path, description = "Button id")),
    responses(
        (status = 200, description = "Button", body = Button),
        (status = 404, description = "Button not found", body = crate::api::types::ErrorResponse)
    ),
    security(("bearer" = []))
)]
pub(crate) async fn get_button(
    Path(id): Path<u32>,
    State(state): State<AppState>,
) -> Result<Json<Button>, ApiError> {
    let button = state
        .store
        .get_button(id)
        .await
        .map_err(|err| api_store_error("load button", err))?;
    Ok(Json(button))
}

#[utoipa::path(
    put,
    path = "/api/v1/customer/buttons/{id}",
    tag = "buttons",
    params(("id" = u32, Path, description = "Button id")),
    request_body = ButtonInput,
    responses(
        (status = 200, description = "Button updated", body = Button),
        (status = 404, description = "Button not found", body = crate::api::types::ErrorResponse)
    ),
    security(("bearer" = []))
)]
pub(crate) async fn update_button(
    Path(id): Path<u32>,
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<ButtonInput>,
) -> Result<Json<Button>, ApiError> {
    let ctx = sync_context(&state, &headers);
    let button = state
        .sync
        .update_button(&ctx, id, body)
        .await
        .map_err(|err| api_sync_error("update button", err).with_request_id(ctx.trace_id()))?;
    Ok(Json(button))
}

#[utoipa::path(
    delete,
    path = "/api/v1/customer/buttons/{id}",
    tag = "buttons",
    params(("id" = u32, Path, description = "Button id")),
    responses(
        (status = 204, description = "Button deleted and its grants withdrawn"),
        (status = 404, description = "Button not found", body = crate::api::types::ErrorResponse)
    ),
    security(("bearer" = []))
)]
pub(crate) async fn delete_button(
    Path(id): Path<u32>,
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<StatusCode, ApiError> {
    let ctx = sync_context(&state, &headers);
    state
        .sync
        .delete_button(&ctx, id)
        .await
        .map_err(|err| api_sync_error("delete button", err).with_request_id(ctx.trace_id()))?;
    Ok(StatusCode::NO_CONTENT)
}
