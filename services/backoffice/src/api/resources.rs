//! Resource (protected endpoint) handlers.
//!
//! Every write goes through the sync coordinator so the `perm_<id>` rule
//! follows the row.
use crate::api::error::{ApiError, api_store_error, api_sync_error};
use crate::api::types::ResourceListResponse;
use crate::api::{list_query, sync_context};
use crate::app::AppState;
use crate::model::{Resource, ResourceInput};
use axum::Json;
use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::IntoResponse;
use std::collections::BTreeMap;

#[utoipa::path(
    get,
    path = "/api/v1/customer/resources",
    tag = "resources",
    params(
        ("page" = Option<u32>, Query, description = "1-based page number"),
        ("size" = Option<u32>, Query, description = "Page size, at most 100"),
        ("order" = Option<String>, Query, description = "asc or desc by id"),
        ("url" = Option<String>, Query, description = "Exact url filter"),
        ("method" = Option<String>, Query, description = "Exact method filter")
    ),
    responses(
        (status = 200, description = "List resources", body = ResourceListResponse),
        (status = 400, description = "Invalid query", body = crate::api::types::ErrorResponse)
    ),
    security(("bearer" = []))
)]
pub(crate) async fn list_resources(
    State(state): State<AppState>,
    Query(params): Query<BTreeMap<String, String>>,
) -> Result<Json<ResourceListResponse>, ApiError> {
    let query = list_query(params)?;
    let page = state
        .store
        .list_resources(&query)
        .await
        .map_err(|err| api_store_error("list resources", err))?;
    Ok(Json(page.into()))
}

#[utoipa::path(
    post,
    path = "/api/v1/customer/resources",
    tag = "resources",
    request_body = ResourceInput,
    responses(
        (status = 201, description = "Resource created", body = Resource),
        (status = 400, description = "Missing url or method", body = crate::api::types::ErrorResponse),
        (status = 409, description = "url and method already registered", body = crate::api::types::ErrorResponse)
    ),
    security(("bearer" = []))
)]
pub(crate) async fn create_resource(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<ResourceInput>,
) -> Result<impl IntoResponse, ApiError> {
    let ctx = sync_context(&state, &headers);
    let resource = state
        .sync
        .create_resource(&ctx, body)
        .await
        .map_err(|err| api_sync_error("create resource", err).with_request_id(ctx.trace_id()))?;
    Ok((StatusCode::CREATED, Json(resource)))
}

#[utoipa::path(
    get,
    path = "/api/v1/customer/resources/{id}",
    tag = "resources",
    params(("id" = u32, Path, description = "Resource id")),
    responses(
        (status = 200, description = "Resource", body = Resource),
        (status = 404, description = "Resource not found", body = crate::api::types::ErrorResponse)
    ),
    security(("bearer" = []))
)]
pub(crate) async fn get_resource(
    Path(id): Path<u32>,
    State(state): State<AppState>,
) -> Result<Json<Resource>, ApiError> {
    let resource = state
        .store
        .get_resource(id)
        .await
        .map_err(|err| api_store_error("load resource", err))?;
    Ok(Json(resource))
}

#[utoipa::path(
    put,
    path = "/api/v1/customer/resources/{id}",
    tag = "resources",
    params(("id" = u32, Path, description = "Resource id")),
    request_body = ResourceInput,
    responses(
        (status = 200, description = "Resource updated", body = Resource),
        (status = 404, description = "Resource not found", body = crate::api::types::ErrorResponse)
    ),
    security(("bearer" = []))
)]
pub(crate) async fn update_resource(
    Path(id): Path<u32>,
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<ResourceInput>,
) -> Result<Json<Resource>, ApiError> {
    let ctx = sync_context(&state, &headers);
    let resource = state
        .sync
        .update_resource(&ctx, id, body)
        .await
        .map_err(|err| api_sync_error("update resource", err).with_request_id(ctx.trace_id()))?;
    Ok(Json(resource))
}

#[utoipa::path(
    delete,
    path = "/api/v1/customer/resources/{id}",
    tag = "resources",
    params(("id" = u32, Path, description = "Resource id")),
    responses(
        (status = 204, description = "Resource deleted and its grants withdrawn"),
        (status = 404, description = "Resource not found", body = crate::api::types::ErrorResponse)
    ),
    security(("bearer" = []))
)]
pub(crate) async fn delete_resource(
    Path(id): Path<u32>,
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<StatusCode, ApiError> {
    let ctx = sync_context(&state, &headers);
    state
        .sync
        .delete_resource(&ctx, id)
        .await
        .map_err(|err| api_sync_error("delete resource", err).with_request_id(ctx.trace_id()))?;
    Ok(StatusCode::NO_CONTENT)
}
