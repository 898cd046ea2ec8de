//! Principal records. Users are lookup keys for a role subject, not graph nodes.
use crate::model::menu::default_active;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

#[derive(Debug, Serialize, Deserialize, ToSchema, Clone, PartialEq, Eq)]
pub struct User {
    pub id: u32,
    pub username: String,
    pub is_active: bool,
    pub is_staff: bool,
    pub role_id: u32,
}

/// A user together with its stored password hash; never serialized.
#[derive(Debug, Clone)]
pub struct UserAccount {
    pub user: User,
    pub password_hash: String,
}

#[derive(Debug, Deserialize, ToSchema, Clone)]
pub struct UserCreateRequest {
    pub username: String,
    pub password: String,
    #[serde(default = "default_active")]
    pub is_active: bool,
    #[serde(default)]
    pub is_staff: bool,
    pub role_id: u32,
}

#[derive(Debug, Deserialize, ToSchema, Clone, Default)]
pub struct UserUpdateRequest {
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default)]
    pub is_active: Option<bool>,
    #[serde(default)]
    pub is_staff: Option<bool>,
    #[serde(default)]
    pub role_id: Option<u32>,
}

#[derive(Debug, Clone)]
pub struct NewUser {
    pub username: String,
    pub password_hash: String,
    pub is_active: bool,
    pub is_staff: bool,
    pub role_id: u32,
}

#[derive(Debug, Clone, Default)]
pub struct UserPatch {
    pub password_hash: Option<String>,
    pub is_active: Option<bool>,
    pub is_staff: Option<bool>,
    pub role_id: Option<u32>,
}
