//! `POST /api/v1/login` and `POST /api/v1/refresh`.
//!
//! # Key invariants
//! - The throttle key is the client IP. `x-forwarded-for` is read only when
//!   the connecting peer is a configured trusted proxy, and then the client is
//!   the rightmost hop that is not itself a trusted proxy.
//! - A key with zero attempts left is refused with 423 before any lookup.
//! - Unknown users and wrong passwords cost one attempt; success clears the
//!   record.
//! - Every attempt that reaches the throttle leaves a login record. A failed
//!   audit write is logged and never changes the response.
use crate::api::error::{
    ApiError, api_internal, api_internal_message, api_locked, api_unauthorized,
    api_validation_error,
};
use crate::api::types::{LoginFailureResponse, LoginRequest, LoginResponse, RefreshRequest};
use crate::app::AppState;
use crate::auth::password::verify_password_blocking;
use crate::auth::token::{TokenError, now_epoch_seconds};
use crate::model::{NewLoginRecord, User};
use crate::store::StoreError;
use axum::Json;
use axum::extract::{ConnectInfo, State};
use axum::http::{HeaderMap, StatusCode, header};
use axum::response::{IntoResponse, Response};
use std::net::{IpAddr, SocketAddr};

pub(crate) const UNKNOWN_CLIENT: &str = "unknown";
const MAX_USER_AGENT_LEN: usize = 512;

pub(crate) enum LoginRejection {
    Api(ApiError),
    BadCredentials { remaining: u32 },
}

impl From<ApiError> for LoginRejection {
    fn from(err: ApiError) -> Self {
        LoginRejection::Api(err)
    }
}

impl IntoResponse for LoginRejection {
    fn into_response(self) -> Response {
        match self {
            LoginRejection::Api(err) => err.into_response(),
            LoginRejection::BadCredentials { remaining } => (
                StatusCode::UNAUTHORIZED,
                Json(LoginFailureResponse {
                    code: "invalid_credentials".to_string(),
                    message: "invalid username or password".to_string(),
                    remaining_attempts: remaining,
                }),
            )
                .into_response(),
        }
    }
}

pub(crate) fn client_ip(peer: Option<SocketAddr>, headers: &HeaderMap, trusted: &[IpAddr]) -> String {
    let Some(peer) = peer.map(|addr| addr.ip()) else {
        return UNKNOWN_CLIENT.to_string();
    };
    if !trusted.contains(&peer) {
        return peer.to_string();
    }
    let hops: Vec<&str> = headers
        .get_all("x-forwarded-for")
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(','))
        .map(str::trim)
        .filter(|hop| !hop.is_empty())
        .collect();
    hops.into_iter()
        .rev()
        .find(|hop| {
            hop.parse::<IpAddr>()
                .map(|ip| !trusted.contains(&ip))
                .unwrap_or(true)
        })
        .map(str::to_string)
        .unwrap_or_else(|| peer.to_string())
}

fn user_agent(headers: &HeaderMap) -> String {
    headers
        .get(header::USER_AGENT)
        .and_then(|value| value.to_str().ok())
        .map(|agent| agent.chars().take(MAX_USER_AGENT_LEN).collect())
        .unwrap_or_default()
}

struct Attempt {
    username: String,
    ip_address: String,
    user_agent: String,
}

impl Attempt {
    async fn finish(&self, state: &AppState, outcome: &'static str) {
        metrics::counter!("artweb_login_total", "outcome" => outcome).increment(1);
        let record = NewLoginRecord {
            username: self.username.clone(),
            ip_address: self.ip_address.clone(),
            user_agent: self.user_agent.clone(),
            success: outcome == "ok",
            outcome: outcome.to_string(),
            login_at: u64::try_from(now_epoch_seconds()).unwrap_or_default(),
        };
        if let Err(err) = state.store.record_login(&record).await {
            tracing::warn!(error = %err, username = %self.username, "failed to write login record");
        }
    }
}

fn issue_pair(state: &AppState, user: User) -> Result<LoginResponse, ApiError> {
    let mint_failed = |err: TokenError| {
        tracing::error!(error = %err, "failed to mint token");
        api_internal_message("failed to issue token")
    };
    let access_token = state.tokens.mint(&user).map_err(mint_failed)?;
    let refresh_token = state.tokens.mint_refresh(&user).map_err(mint_failed)?;
    Ok(LoginResponse {
        access_token,
        token_type: "Bearer".to_string(),
        expires_in: state.tokens.ttl().as_secs(),
        refresh_token,
        refresh_expires_in: state.tokens.refresh_ttl().as_secs(),
        user,
    })
}

#[utoipa::path(
    post,
    path = "/api/v1/login",
    tag = "auth",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Access and refresh tokens issued", body = LoginResponse),
        (status = 401, description = "Bad credentials", body = LoginFailureResponse),
        (status = 423, description = "Too many failures or account disabled", body = crate::api::types::ErrorResponse)
    )
)]
pub(crate) async fn login(
    State(state): State<AppState>,
    peer: Option<ConnectInfo<SocketAddr>>,
    headers: HeaderMap,
    Json(body): Json<LoginRequest>,
) -> Result<Json<LoginResponse>, LoginRejection> {
    let key = client_ip(
        peer.map(|ConnectInfo(addr)| addr),
        &headers,
        &state.security.trusted_proxies,
    );
    let username = body.username.trim().to_string();
    if username.is_empty() || body.password.is_empty() {
        return Err(api_validation_error("username and password are required").into());
    }
    let attempt = Attempt {
        username: username.clone(),
        ip_address: key.clone(),
        user_agent: user_agent(&headers),
    };

    let max_attempts = state.security.max_failed_attempts;
    let remaining = state
        .throttle
        .failure_count(&key)
        .await
        .unwrap_or(max_attempts);
    if remaining == 0 {
        attempt.finish(&state, "locked").await;
        tracing::warn!(client = %key, "login refused: attempts exhausted");
        return Err(api_locked("too many failed attempts; try again later").into());
    }

    let account = match state.store.get_user_by_username(&username).await {
        Ok(account) => Some(account),
        Err(StoreError::NotFound(_)) => None,
        Err(err) => return Err(api_internal("failed to load user", &err).into()),
    };
    let verified = match &account {
        Some(account) => {
            verify_password_blocking(body.password, account.password_hash.clone())
                .await
                .map_err(|err| {
                    tracing::error!(error = %err, "password verification task failed");
                    api_internal_message("failed to verify credentials")
                })?
        }
        None => false,
    };
    let Some(account) = account.filter(|_| verified) else {
        let left = remaining.saturating_sub(1);
        state
            .throttle
            .set_failure_count(&key, left, state.security.lock_duration())
            .await;
        attempt.finish(&state, "invalid_credentials").await;
        tracing::info!(client = %key, username = %username, remaining = left, "login failed");
        return Err(LoginRejection::BadCredentials { remaining: left });
    };

    if !account.user.is_active {
        attempt.finish(&state, "inactive").await;
        return Err(api_locked("account is disabled").into());
    }

    state.throttle.reset(&key).await;
    let user_id = account.user.id;
    let response = issue_pair(&state, account.user)?;
    attempt.finish(&state, "ok").await;
    tracing::info!(user_id, username = %username, "login succeeded");
    Ok(Json(response))
}

/// Exchange a refresh token for a new pair. Claims are rebuilt from the
/// stored user, so a role change or deactivation takes effect here.
#[utoipa::path(
    post,
    path = "/api/v1/refresh",
    tag = "auth",
    request_body = RefreshRequest,
    responses(
        (status = 200, description = "New access and refresh tokens", body = LoginResponse),
        (status = 401, description = "Invalid or expired refresh token", body = crate::api::types::ErrorResponse),
        (status = 423, description = "Account disabled", body = crate::api::types::ErrorResponse)
    )
)]
pub(crate) async fn refresh(
    State(state): State<AppState>,
    Json(body): Json<RefreshRequest>,
) -> Result<Json<LoginResponse>, ApiError> {
    let claims = state
        .tokens
        .verify_refresh(body.refresh_token.trim())
        .map_err(|err| {
            tracing::debug!(error = %err, "rejecting refresh token");
            api_unauthorized("invalid or expired refresh token")
        })?;
    let user = match state.store.get_user(claims.uid).await {
        Ok(user) => user,
        Err(StoreError::NotFound(_)) => {
            return Err(api_unauthorized("invalid or expired refresh token"));
        }
        Err(err) => return Err(api_internal("failed to load user", &err)),
    };
    if !user.is_active {
        return Err(api_locked("account is disabled"));
    }
    metrics::counter!("artweb_token_refresh_total").increment(1);
    tracing::info!(user_id = user.id, "refresh token exchanged");
    issue_pair(&state, user).map(Json)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;

    fn peer(last: u8) -> Option<SocketAddr> {
        Some(SocketAddr::from((Ipv4Addr::new(10, 0, 0, last), 40_000)))
    }

    fn forwarded(value: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert("x-forwarded-for", value.parse().unwrap());
        headers
    }

    #[test]
    fn untrusted_peers_are_keyed_by_their_own_address() {
        let headers = forwarded("203.0.113.7");
        assert_eq!(client_ip(peer(9), &headers, &[]), "10.0.0.9");
    }

    #[test]
    fn trusted_proxies_contribute_the_rightmost_untrusted_hop() {
        let proxy = IpAddr::from(Ipv4Addr::new(10, 0, 0, 1));
        let headers = forwarded("198.51.100.1, 203.0.113.7, 10.0.0.1");
        assert_eq!(client_ip(peer(1), &headers, &[proxy]), "203.0.113.7");
        assert_eq!(client_ip(peer(1), &HeaderMap::new(), &[proxy]), "10.0.0.1");
    }

    #[test]
    fn missing_peer_is_unknown() {
        assert_eq!(client_ip(None, &forwarded("203.0.113.7"), &[]), UNKNOWN_CLIENT);
    }
}
