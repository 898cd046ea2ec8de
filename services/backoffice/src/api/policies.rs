//! Policy graph inspection and repair.
use crate::api::error::{ApiError, api_sync_error};
use crate::api::sync_context;
use crate::api::types::{EdgeResponse, PolicyDumpResponse, RuleResponse};
use crate::app::AppState;
use crate::auth::rbac::bootstrap::ReconcileReport;
use axum::Json;
use axum::extract::State;
use axum::http::HeaderMap;

#[utoipa::path(
    get,
    path = "/api/v1/customer/policies",
    tag = "policies",
    responses((status = 200, description = "Every rule and edge in the graph", body = PolicyDumpResponse)),
    security(("bearer" = []))
)]
pub(crate) async fn list_policies(State(state): State<AppState>) -> Json<PolicyDumpResponse> {
    let rules = state.policies.rules().await;
    let edges = state.policies.edges().await;
    Json(PolicyDumpResponse {
        rules: rules.into_iter().map(RuleResponse::from).collect(),
        edges: edges.into_iter().map(EdgeResponse::from).collect(),
    })
}

#[utoipa::path(
    post,
    path = "/api/v1/customer/policies/reconcile",
    tag = "policies",
    responses(
        (status = 200, description = "Graph rebuilt from storage", body = ReconcileReport),
        (status = 504, description = "Deadline exceeded", body = crate::api::types::ErrorResponse)
    ),
    security(("bearer" = []))
)]
pub(crate) async fn reconcile_policies(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<ReconcileReport>, ApiError> {
    let ctx = sync_context(&state, &headers);
    state
        .reconciler
        .reconcile(&ctx)
        .await
        .map(Json)
        .map_err(|err| api_sync_error("reconcile policies", err).with_request_id(ctx.trace_id()))
}
