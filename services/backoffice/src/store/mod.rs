//! Relational store collaborator.
//!
//! # Purpose
//! Defines the `AdminStore` trait used by the sync coordinator and handlers,
//! the shared paging/filter types, and the store error taxonomy. Each mutating
//! call is atomic on its own: one SQL transaction (Postgres) or one critical
//! section (memory).
use crate::auth::rbac::placement::PlacementError;
use crate::model::{
    Button, ButtonInput, LoginRecord, Menu, MenuInput, NewLoginRecord, NewUser, Resource,
    ResourceInput, Role, RoleInput, User, UserAccount, UserPatch,
};
use artweb_authz::{ButtonBinding, MenuBinding, ResourceRule, RoleBinding};
use async_trait::async_trait;
use std::collections::{BTreeMap, BTreeSet};
use thiserror::Error;

pub mod memory;
pub mod postgres;

pub const DEFAULT_PAGE_SIZE: u32 = 20;
pub const MAX_PAGE_SIZE: u32 = 100;

pub const RESOURCE_FILTERS: &[&str] = &["url", "method", "label"];
pub const MENU_FILTERS: &[&str] = &["name", "parent_id", "is_active"];
pub const BUTTON_FILTERS: &[&str] = &["name", "menu_id"];
pub const ROLE_FILTERS: &[&str] = &["name"];
pub const USER_FILTERS: &[&str] = &["username", "role_id", "is_active"];
pub const LOGIN_RECORD_FILTERS: &[&str] = &["username", "ip_address", "success"];

/// Pagination, ordering and exact-match filters for `list_*` calls.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListQuery {
    /// 1-based page number.
    pub page: u32,
    pub size: u32,
    /// Order by id descending instead of ascending.
    pub descending: bool,
    pub filters: BTreeMap<String, String>,
}

impl Default for ListQuery {
    fn default() -> Self {
        Self {
            page: 1,
            size: DEFAULT_PAGE_SIZE,
            descending: false,
            filters: BTreeMap::new(),
        }
    }
}

impl ListQuery {
    pub fn with_filter(mut self, key: &str, value: impl Into<String>) -> Self {
        self.filters.insert(key.to_string(), value.into());
        self
    }

    /// Clamp paging to sane bounds and reject filters outside `allowed`.
    pub fn checked(&self, allowed: &[&str]) -> StoreResult<ListQuery> {
        if let Some(key) = self
            .filters
            .keys()
            .find(|key| !allowed.contains(&key.as_str()))
        {
            return Err(StoreError::Validation(format!(
                "unsupported filter: {key}"
            )));
        }
        Ok(ListQuery {
            page: self.page.max(1),
            size: self.size.clamp(1, MAX_PAGE_SIZE),
            descending: self.descending,
            filters: self.filters.clone(),
        })
    }

    pub fn offset(&self) -> u64 {
        u64::from(self.page.saturating_sub(1)) * u64::from(self.size)
    }
}

#[derive(Debug, Clone)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub total: u64,
    pub page: u32,
    pub size: u32,
}

/// Menus and buttons removed by a cascading menu delete.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MenuRemoval {
    pub menu_ids: Vec<u32>,
    pub button_ids: Vec<u32>,
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("not found: {0}")]
    NotFound(String),
    #[error("conflict: {0}")]
    Conflict(String),
    #[error("invalid request: {0}")]
    Validation(String),
    #[error(transparent)]
    Unexpected(#[from] anyhow::Error),
}

impl From<PlacementError> for StoreError {
    fn from(err: PlacementError) -> Self {
        match err {
            PlacementError::UnknownParent(_) => StoreError::NotFound(err.to_string()),
            PlacementError::Invalid(message) => StoreError::Validation(message),
        }
    }
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Sorted, de-duplicated association list.
pub(crate) fn id_set(ids: &[u32]) -> Vec<u32> {
    ids.iter()
        .copied()
        .collect::<BTreeSet<u32>>()
        .into_iter()
        .collect()
}

#[async_trait]
pub trait AdminStore: Send + Sync {
    async fn create_resource(&self, input: &ResourceInput) -> StoreResult<Resource>;
    async fn update_resource(&self, id: u32, input: &ResourceInput) -> StoreResult<Resource>;
    async fn delete_resource(&self, id: u32) -> StoreResult<()>;
    async fn get_resource(&self, id: u32) -> StoreResult<Resource>;
    async fn list_resources(&self, query: &ListQuery) -> StoreResult<Page<Resource>>;
    async fn find_resources(&self, ids: &[u32]) -> StoreResult<Vec<Resource>>;
    async fn resource_rules(&self) -> StoreResult<Vec<ResourceRule>>;

    async fn create_menu(&self, input: &MenuInput) -> StoreResult<Menu>;
    async fn update_menu(&self, id: u32, input: &MenuInput) -> StoreResult<Menu>;
    /// Deletes the menu, its descendant menus and every button under them.
    async fn delete_menu(&self, id: u32) -> StoreResult<MenuRemoval>;
    async fn get_menu(&self, id: u32) -> StoreResult<Menu>;
    async fn list_menus(&self, query: &ListQuery) -> StoreResult<Page<Menu>>;
    async fn find_menus(&self, ids: &[u32]) -> StoreResult<Vec<Menu>>;
    async fn menu_bindings(&self) -> StoreResult<Vec<MenuBinding>>;

    async fn create_button(&self, input: &ButtonInput) -> StoreResult<Button>;
    async fn update_button(&self, id: u32, input: &ButtonInput) -> StoreResult<Button>;
    async fn delete_button(&self, id: u32) -> StoreResult<()>;
    async fn get_button(&self, id: u32) -> StoreResult<Button>;
    async fn list_buttons(&self, query: &ListQuery) -> StoreResult<Page<Button>>;
    async fn find_buttons(&self, ids: &[u32]) -> StoreResult<Vec<Button>>;
    async fn button_bindings(&self) -> StoreResult<Vec<ButtonBinding>>;

    async fn create_role(&self, input: &RoleInput) -> StoreResult<Role>;
    async fn update_role(&self, id: u32, input: &RoleInput) -> StoreResult<Role>;
    /// Fails with `Conflict` while any user still references the role.
    async fn delete_role(&self, id: u32) -> StoreResult<()>;
    async fn get_role(&self, id: u32) -> StoreResult<Role>;
    async fn list_roles(&self, query: &ListQuery) -> StoreResult<Page<Role>>;
    async fn find_roles(&self, ids: &[u32]) -> StoreResult<Vec<Role>>;
    async fn role_bindings(&self) -> StoreResult<Vec<RoleBinding>>;

    async fn create_user(&self, user: &NewUser) -> StoreResult<User>;
    async fn update_user(&self, id: u32, patch: &UserPatch) -> StoreResult<User>;
    async fn delete_user(&self, id: u32) -> StoreResult<()>;
    async fn get_user(&self, id: u32) -> StoreResult<User>;
    async fn list_users(&self, query: &ListQuery) -> StoreResult<Page<User>>;
    async fn get_user_by_username(&self, username: &str) -> StoreResult<UserAccount>;

    /// Login audit rows take ids from their own sequence, not the entity one.
    async fn record_login(&self, record: &NewLoginRecord) -> StoreResult<LoginRecord>;
    async fn list_login_records(&self, query: &ListQuery) -> StoreResult<Page<LoginRecord>>;

    async fn health_check(&self) -> StoreResult<()>;
    fn is_durable(&self) -> bool;
    fn backend_name(&self) -> &'static str;
}
