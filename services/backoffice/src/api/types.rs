//! HTTP request/response payloads for the backoffice API.
use crate::model::{Button, LoginRecord, Menu, Resource, Role, User};
use crate::store::{MenuRemoval, Page};
use artweb_authz::{Edge, Rule};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

#[derive(Debug, Serialize, Deserialize, ToSchema, Clone)]
pub struct FeatureFlags {
    pub durable_storage: bool,
    /// The policy graph is rebuilt from storage at boot; it is never persisted.
    pub persistent_policies: bool,
    pub login_throttle: bool,
}

#[derive(Debug, Serialize, Deserialize, ToSchema, Clone)]
pub struct SystemInfo {
    pub service: String,
    pub api_version: String,
    pub storage_backend: String,
    pub features: FeatureFlags,
}

#[derive(Debug, Serialize, Deserialize, ToSchema, Clone)]
pub struct HealthStatus {
    pub status: String,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ErrorResponse {
    pub code: String,
    pub message: String,
    pub request_id: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ResourceListResponse {
    pub items: Vec<Resource>,
    pub total: u64,
    pub page: u32,
    pub size: u32,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct MenuListResponse {
    pub items: Vec<Menu>,
    pub total: u64,
    pub page: u32,
    pub size: u32,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ButtonListResponse {
    pub items: Vec<Button>,
    pub total: u64,
    pub page: u32,
    pub size: u32,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct RoleListResponse {
    pub items: Vec<Role>,
    pub total: u64,
    pub page: u32,
    pub size: u32,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct UserListResponse {
    pub items: Vec<User>,
    pub total: u64,
    pub page: u32,
    pub size: u32,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct LoginRecordListResponse {
    pub items: Vec<LoginRecord>,
    pub total: u64,
    pub page: u32,
    pub size: u32,
}

macro_rules! list_response_from_page {
    ($response:ident, $item:ty) => {
        impl From<Page<$item>> for $response {
            fn from(page: Page<$item>) -> Self {
                Self {
                    items: page.items,
                    total: page.total,
                    page: page.page,
                    size: page.size,
                }
            }
        }
    };
}

list_response_from_page!(ResourceListResponse, Resource);
list_response_from_page!(MenuListResponse, Menu);
list_response_from_page!(ButtonListResponse, Button);
list_response_from_page!(RoleListResponse, Role);
list_response_from_page!(UserListResponse, User);
list_response_from_page!(LoginRecordListResponse, LoginRecord);

/// Ids removed by a cascading menu delete.
#[derive(Debug, Serialize, Deserialize, ToSchema, Clone)]
pub struct MenuDeleteResponse {
    pub menu_ids: Vec<u32>,
    pub button_ids: Vec<u32>,
}

impl From<MenuRemoval> for MenuDeleteResponse {
    fn from(removal: MenuRemoval) -> Self {
        Self {
            menu_ids: removal.menu_ids,
            button_ids: removal.button_ids,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, ToSchema, Clone, PartialEq, Eq)]
pub struct RuleResponse {
    pub subject: String,
    pub object: String,
    pub action: String,
}

impl From<Rule> for RuleResponse {
    fn from(rule: Rule) -> Self {
        Self {
            subject: rule.subject,
            object: rule.object,
            action: rule.action,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, ToSchema, Clone, PartialEq, Eq)]
pub struct EdgeResponse {
    pub child: String,
    pub parent: String,
}

impl From<Edge> for EdgeResponse {
    fn from(edge: Edge) -> Self {
        Self {
            child: edge.child,
            parent: edge.parent,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct PolicyDumpResponse {
    pub rules: Vec<RuleResponse>,
    pub edges: Vec<EdgeResponse>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema, Clone)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct LoginResponse {
    pub access_token: String,
    pub token_type: String,
    /// Seconds until the token expires.
    pub expires_in: u64,
    pub refresh_token: String,
    pub refresh_expires_in: u64,
    pub user: User,
}

#[derive(Debug, Serialize, Deserialize, ToSchema, Clone)]
pub struct RefreshRequest {
    pub refresh_token: String,
}

/// Administrator reset of another account's password.
#[derive(Debug, Serialize, Deserialize, ToSchema, Clone)]
pub struct PasswordResetRequest {
    pub new_password: String,
    pub confirm_password: String,
}

#[derive(Debug, Serialize, Deserialize, ToSchema, Clone)]
pub struct PasswordChangeRequest {
    pub old_password: String,
    pub new_password: String,
    pub confirm_password: String,
}

/// Body of a 401 from login: how many attempts the caller has left.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct LoginFailureResponse {
    pub code: String,
    pub message: String,
    pub remaining_attempts: u32,
}
