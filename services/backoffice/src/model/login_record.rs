//! Audit rows written for every login attempt.
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

#[derive(Debug, Serialize, Deserialize, ToSchema, Clone, PartialEq, Eq)]
pub struct LoginRecord {
    pub id: u64,
    pub username: String,
    pub ip_address: String,
    pub user_agent: String,
    pub success: bool,
    /// Why the attempt ended the way it did: `ok`, `invalid_credentials`,
    /// `locked` or `inactive`.
    pub outcome: String,
    /// Seconds since the Unix epoch.
    pub login_at: u64,
}

#[derive(Debug, Clone)]
pub struct NewLoginRecord {
    pub username: String,
    pub ip_address: String,
    pub user_agent: String,
    pub success: bool,
    pub outcome: String,
    pub login_at: u64,
}
