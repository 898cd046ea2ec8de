//! Backoffice access and refresh tokens.
//!
//! # Purpose
//! Mint and verify the HS256 JWTs handed out by `POST /api/v1/login` and
//! `POST /api/v1/refresh`. Access tokens are required on every other `/api`
//! route.
//!
//! # Key invariants
//! - Only HS256 is accepted; the issuer claim must match configuration.
//! - The `typ` claim separates the two kinds. A refresh token never passes
//!   access verification and the reverse.
//! - `role_id` is the authorization input: the middleware maps it to the
//!   `role_<id>` policy subject.
//!
//! # Security notes
//! The shared secret never leaves this module and never appears in errors.
use crate::config::SecurityConfig;
use crate::model::User;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use thiserror::Error;

const VERIFY_LEEWAY_SECS: u64 = 30;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenKind {
    #[default]
    Access,
    Refresh,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessClaims {
    pub iss: String,
    /// Username, kept in `sub` for log correlation.
    pub sub: String,
    pub uid: u32,
    pub username: String,
    pub role_id: u32,
    #[serde(default)]
    pub is_staff: bool,
    #[serde(default)]
    pub typ: TokenKind,
    pub iat: i64,
    pub exp: i64,
}

#[derive(Debug, Error)]
pub enum TokenError {
    #[error("jwt error: {0}")]
    Jwt(#[from] jsonwebtoken::errors::Error),
    #[error("token configuration error: {0}")]
    Config(String),
    #[error("expected a {expected:?} token")]
    WrongKind { expected: TokenKind },
}

#[derive(Clone)]
pub struct TokenIssuer {
    issuer: String,
    ttl: Duration,
    refresh_ttl: Duration,
    encoding: EncodingKey,
    decoding: DecodingKey,
}

impl std::fmt::Debug for TokenIssuer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenIssuer")
            .field("issuer", &self.issuer)
            .field("ttl", &self.ttl)
            .field("refresh_ttl", &self.refresh_ttl)
            .finish_non_exhaustive()
    }
}

impl TokenIssuer {
    pub fn new(secret: &[u8], issuer: impl Into<String>, ttl: Duration) -> Result<Self, TokenError> {
        if secret.is_empty() {
            return Err(TokenError::Config("jwt secret is empty".to_string()));
        }
        Ok(Self {
            issuer: issuer.into(),
            ttl,
            refresh_ttl: ttl,
            encoding: EncodingKey::from_secret(secret),
            decoding: DecodingKey::from_secret(secret),
        })
    }

    pub fn with_refresh_ttl(mut self, refresh_ttl: Duration) -> Self {
        self.refresh_ttl = refresh_ttl;
        self
    }

    pub fn from_config(security: &SecurityConfig) -> Result<Self, TokenError> {
        Ok(Self::new(
            security.jwt_secret.as_bytes(),
            security.jwt_issuer.clone(),
            security.access_token_ttl(),
        )?
        .with_refresh_ttl(security.refresh_token_ttl()))
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn refresh_ttl(&self) -> Duration {
        self.refresh_ttl
    }

    pub fn mint(&self, user: &User) -> Result<String, TokenError> {
        self.mint_kind(user, TokenKind::Access, self.ttl)
    }

    pub fn mint_refresh(&self, user: &User) -> Result<String, TokenError> {
        self.mint_kind(user, TokenKind::Refresh, self.refresh_ttl)
    }

    pub fn verify(&self, token: &str) -> Result<AccessClaims, TokenError> {
        self.verify_kind(token, TokenKind::Access)
    }

    pub fn verify_refresh(&self, token: &str) -> Result<AccessClaims, TokenError> {
        self.verify_kind(token, TokenKind::Refresh)
    }

    fn mint_kind(&self, user: &User, typ: TokenKind, ttl: Duration) -> Result<String, TokenError> {
        let now = now_epoch_seconds();
        let claims = AccessClaims {
            iss: self.issuer.clone(),
            sub: user.username.clone(),
            uid: user.id,
            username: user.username.clone(),
            role_id: user.role_id,
            is_staff: user.is_staff,
            typ,
            iat: now,
            exp: now.saturating_add(i64::try_from(ttl.as_secs()).unwrap_or(i64::MAX)),
        };
        Ok(jsonwebtoken::encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &self.encoding,
        )?)
    }

    fn verify_kind(&self, token: &str, expected: TokenKind) -> Result<AccessClaims, TokenError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_issuer(&[self.issuer.as_str()]);
        validation.set_required_spec_claims(&["exp", "iss", "sub"]);
        validation.leeway = VERIFY_LEEWAY_SECS;
        let data = jsonwebtoken::decode::<AccessClaims>(token, &self.decoding, &validation)?;
        if data.claims.typ != expected {
            return Err(TokenError::WrongKind { expected });
        }
        Ok(data.claims)
    }
}

pub(crate) fn now_epoch_seconds() -> i64 {
    // A clock before the epoch clamps to zero.
    let secs = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_else(|_| Duration::from_secs(0))
        .as_secs();
    i64::try_from(secs).unwrap_or(i64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user() -> User {
        User {
            id: 7,
            username: "alice".to_string(),
            is_active: true,
            is_staff: false,
            role_id: 3,
        }
    }

    fn issuer(secret: &str) -> TokenIssuer {
        TokenIssuer::new(secret.as_bytes(), "artweb-test", Duration::from_secs(600))
            .expect("issuer")
    }

    #[test]
    fn mint_then_verify_roundtrips_claims() {
        let tokens = issuer("0123456789abcdef0123");
        let token = tokens.mint(&user()).expect("mint");
        let claims = tokens.verify(&token).expect("verify");
        assert_eq!(claims.uid, 7);
        assert_eq!(claims.role_id, 3);
        assert_eq!(claims.sub, "alice");
        assert!(!claims.is_staff);
        assert!(claims.exp > claims.iat);
    }

    #[test]
    fn wrong_secret_is_rejected() {
        let token = issuer("0123456789abcdef0123").mint(&user()).expect("mint");
        assert!(issuer("another-secret-entirely").verify(&token).is_err());
    }

    #[test]
    fn wrong_issuer_is_rejected() {
        let token = issuer("0123456789abcdef0123").mint(&user()).expect("mint");
        let other = TokenIssuer::new(
            b"0123456789abcdef0123",
            "someone-else",
            Duration::from_secs(600),
        )
        .expect("issuer");
        assert!(other.verify(&token).is_err());
    }

    #[test]
    fn expired_token_is_rejected() {
        let tokens = issuer("0123456789abcdef0123");
        let now = now_epoch_seconds();
        let claims = AccessClaims {
            iss: "artweb-test".to_string(),
            sub: "alice".to_string(),
            uid: 7,
            username: "alice".to_string(),
            role_id: 3,
            is_staff: false,
            typ: TokenKind::Access,
            iat: now - 7200,
            exp: now - 3600,
        };
        let token = jsonwebtoken::encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &EncodingKey::from_secret(b"0123456789abcdef0123"),
        )
        .expect("encode");
        assert!(tokens.verify(&token).is_err());
    }

    #[test]
    fn empty_secret_is_a_config_error() {
        assert!(matches!(
            TokenIssuer::new(b"", "x", Duration::from_secs(1)),
            Err(TokenError::Config(_))
        ));
    }

    #[test]
    fn refresh_tokens_only_verify_as_refresh() {
        let tokens = issuer("0123456789abcdef0123").with_refresh_ttl(Duration::from_secs(3600));
        let refresh = tokens.mint_refresh(&user()).expect("mint");
        let claims = tokens.verify_refresh(&refresh).expect("verify");
        assert_eq!(claims.typ, TokenKind::Refresh);
        assert!(claims.exp - claims.iat >= 3600);
        assert!(matches!(
            tokens.verify(&refresh),
            Err(TokenError::WrongKind {
                expected: TokenKind::Access
            })
        ));

        let access = tokens.mint(&user()).expect("mint");
        assert!(matches!(
            tokens.verify_refresh(&access),
            Err(TokenError::WrongKind {
                expected: TokenKind::Refresh
            })
        ));
    }
}
