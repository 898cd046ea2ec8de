//! Menu handlers.
//!
//! Deleting a menu removes its whole subtree and the buttons under it; the
//! response lists every removed id.
use crate::api::error::{ApiError, api_store_error, api_sync_error};
use crate::api::types::{MenuDeleteResponse, MenuListResponse};
use crate::api::{list_query, sync_context};
use crate::app::AppState;
use crate::model::{Menu, MenuInput};
use axum::Json;
use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::IntoResponse;
use std::collections::BTreeMap;

#[utoipa::path(
    get,
    path = "/api/v1/customer/menus",
    tag = "menus",
    params(
        ("page" = Option<u32>, Query, description = "1-based page number"),
        ("size" = Option<u32>, Query, description = "Page size, at most 100"),
        ("order" = Option<String>, Query, description = "asc or desc by id"),
        ("name" = Option<String>, Query, description = "Exact name filter"),
        ("parent_id" = Option<u32>, Query, description = "Children of this menu"),
        ("is_active" = Option<bool>, Query, description = "Active flag filter")
    ),
    responses(
        (status = 200, description = "List menus", body = MenuListResponse),
        (status = 400, description = "Invalid query", body = crate::api::types::ErrorResponse)
    ),
    security(("bearer" = []))
)]
pub(crate) async fn list_menus(
    State(state): State<AppState>,
    Query(params): Query<BTreeMap<String, String>>,
) -> Result<Json<MenuListResponse>, ApiError> {
    let query = list_query(params)?;
    let page = state
        .store
        .list_menus(&query)
        .await
        .map_err(|err| api_store_error("list menus", err))?;
    Ok(Json(page.into()))
}

#[utoipa::path(
    post,
    path = "/api/v1/customer/menus",
    tag = "menus",
    request_body = MenuInput,
    responses(
        (status = 201, description = "Menu created", body = Menu),
        (status = 400, description = "Invalid parent or missing fields", body = crate::api::types::ErrorResponse),
        (status = 409, description = "path or name already taken", body = crate::api::types::ErrorResponse)
    ),
    security(("bearer" = []))
)]
pub(crate) async fn create_menu(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<MenuInput>,
) -> Result<impl IntoResponse, ApiError> {
    let ctx = sync_context(&state, &headers);
    let menu = state
        .sync
        .create_menu(&ctx, body)
        .await
        .map_err(|err| api_sync_error("create menu", err).with_request_id(ctx.trace_id()))?;
    Ok((StatusCode::CREATED, Json(menu)))
}

#[utoipa::path(
    get,
    path = "/api/v1/customer/menus/{id}",
    tag = "menus",
    params(("id" = u32, Path, description = "Menu id")),
    responses(
        (status = 200, description = "Menu", body = Menu),
        (status = 404, description = "Menu not found", body = crate::api::types::ErrorResponse)
    ),
    security(("bearer" = []))
)]
pub(crate) async fn get_menu(
    Path(id): Path<u32>,
    State(state): State<AppState>,
) -> Result<Json<Menu>, ApiError> {
    let menu = state
        .store
        .get_menu(id)
        .await
        .map_err(|err| api_store_error("load menu", err))?;
    Ok(Json(menu))
}

#[utoipa::path(
    put,
    path = "/api/v1/customer/menus/{id}",
    tag = "menus",
    params(("id" = u32, Path, description = "Menu id")),
    request_body = MenuInput,
    responses(
        (status = 200, description = "Menu updated", body = Menu),
        (status = 404, description = "Menu not found", body = crate::api::types::ErrorResponse)
    ),
    security(("bearer" = []))
)]
pub(crate) async fn update_menu(
    Path(id): Path<u32>,
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<MenuInput>,
) -> Result<Json<Menu>, ApiError> {
    let ctx = sync_context(&state, &headers);
    let menu = state
        .sync
        .update_menu(&ctx, id, body)
        .await
        .map_err(|err| api_sync_error("update menu", err).with_request_id(ctx.trace_id()))?;
    Ok(Json(menu))
}

#[utoipa::path(
    delete,
    path = "/api/v1/customer/menus/{id}",
    tag = "menus",
    params(("id" = u32, Path, description = "Menu id")),
    responses(
        (status = 200, description = "Menu subtree deleted", body = MenuDeleteResponse),
        (status = 404, description = "Menu not found", body = crate::api::types::ErrorResponse)
    ),
    security(("bearer" = []))
)]
pub(crate) async fn delete_menu(
    Path(id): Path<u32>,
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<MenuDeleteResponse>, ApiError> {
    let ctx = sync_context(&state, &headers);
    let removal = state
        .sync
        .delete_menu(&ctx, id)
        .await
        .map_err(|err| api_sync_error("delete menu", err).with_request_id(ctx.trace_id()))?;
    Ok(Json(removal.into()))
}
