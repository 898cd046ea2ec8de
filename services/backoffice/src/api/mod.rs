//! Backoffice HTTP API module.
//!
//! # Purpose
//! Route handler modules plus the helpers every handler shares: building a
//! `SyncContext` from the request and parsing list query strings.
pub mod buttons;
pub mod error;
pub mod me;
pub mod menus;
pub mod openapi;
pub mod policies;
pub mod resources;
pub mod roles;
pub mod system;
pub mod types;
pub mod users;

use crate::api::error::{ApiError, api_validation_error};
use crate::app::AppState;
use crate::auth::rbac::sync::SyncContext;
use crate::observability;
use crate::store::{DEFAULT_PAGE_SIZE, ListQuery};
use axum::http::HeaderMap;
use opentelemetry::trace::TraceContextExt;
use std::collections::BTreeMap;

/// Deadline from config plus the inbound W3C trace id, when there is one.
pub(crate) fn sync_context(state: &AppState, headers: &HeaderMap) -> SyncContext {
    let ctx = SyncContext::with_timeout(state.request_timeout);
    let parent = observability::trace_context_from_headers(headers);
    let span = parent.span();
    let span_ctx = span.span_context();
    if span_ctx.is_valid() {
        ctx.with_trace_id(span_ctx.trace_id().to_string())
    } else {
        ctx
    }
}

/// `page`, `size` and `order` (`asc`|`desc`) are paging controls; every
/// other key is an exact-match filter checked by the store.
pub(crate) fn list_query(params: BTreeMap<String, String>) -> Result<ListQuery, ApiError> {
    let mut query = ListQuery::default();
    for (key, value) in params {
        match key.as_str() {
            "page" => query.page = parse_number(&key, &value)?,
            "size" => query.size = parse_number(&key, &value)?,
            "order" => {
                query.descending = match value.as_str() {
                    "asc" => false,
                    "desc" => true,
                    _ => return Err(api_validation_error("order must be asc or desc")),
                }
            }
            _ => {
                query.filters.insert(key, value);
            }
        }
    }
    if query.size == 0 {
        query.size = DEFAULT_PAGE_SIZE;
    }
    Ok(query)
}

fn parse_number(key: &str, value: &str) -> Result<u32, ApiError> {
    value
        .parse::<u32>()
        .map_err(|_| api_validation_error(&format!("{key} must be a non-negative integer")))
}
