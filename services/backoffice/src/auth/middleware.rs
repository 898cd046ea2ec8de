//! Request authorization against the policy graph.
//!
//! # Key invariants
//! - Only `/api` routes are guarded; `POST /api/v1/login` and
//!   `POST /api/v1/refresh` are open.
//! - `/api/v1/me/*` needs a valid token but no policy: every principal may
//!   manage its own account.
//! - The policy object is the matched route template (e.g.
//!   `/api/v1/customer/menus/:id`) and the action is the HTTP method, so a
//!   resource row's `url` must be stored as the template.
//! - Staff principals skip the policy check.
use crate::api::error::{api_forbidden, api_internal_message, api_unauthorized};
use crate::app::AppState;
use artweb_authz::SubjectCodec;
use axum::extract::{MatchedPath, Request, State};
use axum::http::{HeaderMap, Method, header};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};

pub const LOGIN_PATH: &str = "/api/v1/login";
pub const REFRESH_PATH: &str = "/api/v1/refresh";
pub const SELF_SERVICE_PREFIX: &str = "/api/v1/me/";

/// Authenticated caller, inserted into request extensions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Principal {
    pub user_id: u32,
    pub username: String,
    pub role_id: u32,
    pub is_staff: bool,
}

impl Principal {
    pub fn subject(&self) -> String {
        SubjectCodec::role(self.role_id)
    }
}

fn is_public(method: &Method, path: &str) -> bool {
    !path.starts_with("/api/")
        || (method == Method::POST && (path == LOGIN_PATH || path == REFRESH_PATH))
}

fn is_self_service(path: &str) -> bool {
    path.starts_with(SELF_SERVICE_PREFIX)
}

fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|token| !token.is_empty())
}

pub async fn authorize(State(state): State<AppState>, mut request: Request, next: Next) -> Response {
    let method = request.method().clone();
    let path = request.uri().path().to_string();
    if is_public(&method, &path) {
        return next.run(request).await;
    }

    let Some(token) = bearer_token(request.headers()) else {
        return api_unauthorized("missing bearer token").into_response();
    };
    let claims = match state.tokens.verify(token) {
        Ok(claims) => claims,
        Err(err) => {
            tracing::debug!(error = %err, "rejecting access token");
            return api_unauthorized("invalid or expired token").into_response();
        }
    };
    let principal = Principal {
        user_id: claims.uid,
        username: claims.username,
        role_id: claims.role_id,
        is_staff: claims.is_staff,
    };

    if is_self_service(&path) {
        metrics::counter!("artweb_authz_decisions_total", "decision" => "self").increment(1);
    } else if !principal.is_staff {
        let object = request
            .extensions()
            .get::<MatchedPath>()
            .map(|matched| matched.as_str().to_string())
            .unwrap_or_else(|| path.clone());
        let subject = principal.subject();
        let allowed = match state
            .policies
            .evaluate(&subject, &object, method.as_str())
            .await
        {
            Ok(allowed) => allowed,
            Err(err) => {
                tracing::error!(error = %err, subject = %subject, "policy evaluation failed");
                return api_internal_message("authorization failed").into_response();
            }
        };
        let decision = if allowed { "allow" } else { "deny" };
        metrics::counter!("artweb_authz_decisions_total", "decision" => decision).increment(1);
        if !allowed {
            tracing::info!(subject = %subject, object = %object, action = %method, "request denied");
            return api_forbidden("not permitted").into_response();
        }
    } else {
        metrics::counter!("artweb_authz_decisions_total", "decision" => "staff").increment(1);
    }

    request.extensions_mut().insert(principal);
    next.run(request).await
}
