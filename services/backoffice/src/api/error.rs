//! API error shape and the mapping from sync/store failures to HTTP.
//!
//! # Key invariants
//! - Every error body carries a stable `code` and a human-readable `message`.
//! - 5xx responses return a generic message; details are logged server-side.
use crate::api::types::ErrorResponse;
use crate::auth::rbac::sync::SyncError;
use crate::store::StoreError;
use axum::Json;
use axum::http::StatusCode;
use axum::response::IntoResponse;

/// Structured API error returned by handlers.
#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub body: ErrorResponse,
}

impl ApiError {
    fn new(status: StatusCode, code: &str, message: &str) -> Self {
        Self {
            status,
            body: ErrorResponse {
                code: code.to_string(),
                message: message.to_string(),
                request_id: None,
            },
        }
    }

    /// Echo the inbound trace id so a caller can quote it; empty ids are ignored.
    pub fn with_request_id(mut self, request_id: &str) -> Self {
        if !request_id.is_empty() {
            self.body.request_id = Some(request_id.to_string());
        }
        self
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        (self.status, Json(self.body)).into_response()
    }
}

pub fn api_not_found(message: &str) -> ApiError {
    ApiError::new(StatusCode::NOT_FOUND, "not_found", message)
}

pub fn api_conflict(code: &str, message: &str) -> ApiError {
    ApiError::new(StatusCode::CONFLICT, code, message)
}

pub fn api_validation_error(message: &str) -> ApiError {
    ApiError::new(StatusCode::BAD_REQUEST, "validation_error", message)
}

pub fn api_unauthorized(message: &str) -> ApiError {
    ApiError::new(StatusCode::UNAUTHORIZED, "unauthorized", message)
}

pub fn api_forbidden(message: &str) -> ApiError {
    ApiError::new(StatusCode::FORBIDDEN, "forbidden", message)
}

/// 423: the login key has no attempts left or the account is disabled.
pub fn api_locked(message: &str) -> ApiError {
    ApiError::new(StatusCode::LOCKED, "locked", message)
}

pub fn api_timeout(message: &str) -> ApiError {
    ApiError::new(StatusCode::GATEWAY_TIMEOUT, "timeout", message)
}

/// Log a store failure and return a generic 500.
pub fn api_internal(message: &str, err: &StoreError) -> ApiError {
    tracing::error!(error = ?err, "backoffice storage error");
    api_internal_message(message)
}

pub fn api_internal_message(message: &str) -> ApiError {
    ApiError::new(StatusCode::INTERNAL_SERVER_ERROR, "internal", message)
}

/// Translate a coordinator failure; `action` names what was attempted.
pub fn api_sync_error(action: &str, err: SyncError) -> ApiError {
    match err {
        SyncError::Validation(message) => api_validation_error(&message),
        SyncError::NotFound(message) => api_not_found(&message),
        SyncError::Conflict(message) => api_conflict("conflict", &message),
        SyncError::Cancelled => api_timeout(&format!("{action} timed out")),
        SyncError::Store(err) => api_internal(&format!("failed to {action}"), &err),
        err @ SyncError::Engine(_) => {
            tracing::error!(error = %err, action, "policy engine error");
            api_internal_message(&format!("failed to {action}"))
        }
        err @ SyncError::Inconsistent { .. } => {
            tracing::error!(error = %err, action, "policy graph left out of sync");
            ApiError::new(
                StatusCode::INTERNAL_SERVER_ERROR,
                "policy_out_of_sync",
                &format!("{action} was saved but permissions were not fully updated; reconcile policies"),
            )
        }
    }
}

/// Translate a direct store failure on read paths.
pub fn api_store_error(action: &str, err: StoreError) -> ApiError {
    match err {
        StoreError::NotFound(message) => api_not_found(&message),
        StoreError::Conflict(message) => api_conflict("conflict", &message),
        StoreError::Validation(message) => api_validation_error(&message),
        other => api_internal(&format!("failed to {action}"), &other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use artweb_authz::AuthzError;

    #[test]
    fn helpers_build_expected_codes() {
        let cases = [
            (api_not_found("x"), StatusCode::NOT_FOUND, "not_found"),
            (api_conflict("already_exists", "x"), StatusCode::CONFLICT, "already_exists"),
            (api_validation_error("x"), StatusCode::BAD_REQUEST, "validation_error"),
            (api_unauthorized("x"), StatusCode::UNAUTHORIZED, "unauthorized"),
            (api_forbidden("x"), StatusCode::FORBIDDEN, "forbidden"),
            (api_locked("x"), StatusCode::LOCKED, "locked"),
            (api_timeout("x"), StatusCode::GATEWAY_TIMEOUT, "timeout"),
            (api_internal_message("x"), StatusCode::INTERNAL_SERVER_ERROR, "internal"),
        ];
        for (err, status, code) in cases {
            assert_eq!(err.status, status);
            assert_eq!(err.body.code, code);
        }
    }

    #[test]
    fn sync_errors_map_to_statuses() {
        assert_eq!(
            api_sync_error("create menu", SyncError::Validation("bad".into())).status,
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            api_sync_error("create menu", SyncError::Cancelled).status,
            StatusCode::GATEWAY_TIMEOUT
        );
        let out_of_sync = api_sync_error(
            "update role",
            SyncError::Inconsistent {
                entity: "role 3".to_string(),
                source: AuthzError::InvalidEdge("x".to_string()),
            },
        );
        assert_eq!(out_of_sync.status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(out_of_sync.body.code, "policy_out_of_sync");
    }

    #[test]
    fn request_id_is_echoed_when_present() {
        assert_eq!(api_not_found("x").with_request_id("").body.request_id, None);
        assert_eq!(
            api_not_found("x").with_request_id("4bf92f35").body.request_id.as_deref(),
            Some("4bf92f35")
        );
    }

    #[test]
    fn internal_errors_hide_details() {
        let err = StoreError::Unexpected(anyhow::anyhow!("connection refused to 10.0.0.5"));
        let api = api_store_error("list menus", err);
        assert_eq!(api.status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(api.body.message, "failed to list menus");
    }
}
