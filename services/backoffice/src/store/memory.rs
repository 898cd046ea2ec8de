//! In-memory implementation of the admin store.
//!
//! # Purpose
//! Implements `AdminStore` with ordered maps behind one `tokio::sync::RwLock`.
//! Used for local development, tests, and deployments that do not need
//! durability.
//!
//! # Durability and consistency
//! - **Not durable**: all rows are lost on restart.
//! - Every mutation runs inside a single write-lock critical section, so
//!   uniqueness checks, reference checks, menu placement and association
//!   edits are atomic.
//! - Ids come from one counter shared by every table and are never reused,
//!   matching the Postgres sequence.
//!
//! # Cascades
//! Deleting a resource, menu, button or role removes it from every
//! association list that referenced it. Deleting a menu removes its descendant
//! menus and all their buttons.
use super::{
    AdminStore, BUTTON_FILTERS, LOGIN_RECORD_FILTERS, ListQuery, MENU_FILTERS, MenuRemoval, Page,
    RESOURCE_FILTERS, ROLE_FILTERS, StoreError, StoreResult, USER_FILTERS, id_set,
};
use crate::auth::rbac::placement::check_placement;
use crate::model::{
    Button, ButtonInput, LoginRecord, Menu, MenuInput, NewLoginRecord, NewUser, Resource,
    ResourceInput, Role, RoleInput, User, UserAccount, UserPatch,
};
use artweb_authz::{ButtonBinding, MenuBinding, ResourceRule, RoleBinding};
use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use std::sync::Arc;
use tokio::sync::RwLock;

/// Oldest login records are dropped past this many.
const MAX_LOGIN_RECORDS: usize = 10_000;

#[derive(Debug, Default)]
struct State {
    last_id: u32,
    last_record_id: u64,
    resources: BTreeMap<u32, Resource>,
    menus: BTreeMap<u32, Menu>,
    buttons: BTreeMap<u32, Button>,
    roles: BTreeMap<u32, Role>,
    users: BTreeMap<u32, UserAccount>,
    login_records: BTreeMap<u64, LoginRecord>,
}

impl State {
    fn next_id(&mut self) -> StoreResult<u32> {
        self.last_id = self
            .last_id
            .checked_add(1)
            .ok_or_else(|| StoreError::Unexpected(anyhow::anyhow!("id space exhausted")))?;
        Ok(self.last_id)
    }

    fn ensure_resources(&self, ids: &[u32]) -> StoreResult<()> {
        let missing: Vec<u32> = ids
            .iter()
            .copied()
            .filter(|id| !self.resources.contains_key(id))
            .collect();
        missing_ids("resource", &missing)
    }

    fn ensure_menus(&self, ids: &[u32]) -> StoreResult<()> {
        let missing: Vec<u32> = ids
            .iter()
            .copied()
            .filter(|id| !self.menus.contains_key(id))
            .collect();
        missing_ids("menu", &missing)
    }

    fn ensure_buttons(&self, ids: &[u32]) -> StoreResult<()> {
        let missing: Vec<u32> = ids
            .iter()
            .copied()
            .filter(|id| !self.buttons.contains_key(id))
            .collect();
        missing_ids("button", &missing)
    }

    fn ensure_role(&self, id: u32) -> StoreResult<()> {
        if self.roles.contains_key(&id) {
            Ok(())
        } else {
            Err(StoreError::NotFound(format!("role {id}")))
        }
    }

    fn check_resource_unique(&self, input: &ResourceInput, own_id: Option<u32>) -> StoreResult<()> {
        let taken = self.resources.values().any(|existing| {
            Some(existing.id) != own_id
                && existing.url == input.url
                && existing.method == input.method
        });
        if taken {
            return Err(StoreError::Conflict(format!(
                "resource {} {} exists",
                input.method, input.url
            )));
        }
        Ok(())
    }

    fn check_menu_unique(&self, input: &MenuInput, own_id: Option<u32>) -> StoreResult<()> {
        for existing in self.menus.values() {
            if Some(existing.id) == own_id {
                continue;
            }
            if existing.path == input.path {
                return Err(StoreError::Conflict(format!("menu path {} exists", input.path)));
            }
            if existing.name == input.name {
                return Err(StoreError::Conflict(format!("menu name {} exists", input.name)));
            }
        }
        Ok(())
    }

    fn check_button_unique(&self, name: &str, own_id: Option<u32>) -> StoreResult<()> {
        if self
            .buttons
            .values()
            .any(|existing| Some(existing.id) != own_id && existing.name == name)
        {
            return Err(StoreError::Conflict(format!("button {name} exists")));
        }
        Ok(())
    }

    fn check_role_unique(&self, name: &str, own_id: Option<u32>) -> StoreResult<()> {
        if self
            .roles
            .values()
            .any(|existing| Some(existing.id) != own_id && existing.name == name)
        {
            return Err(StoreError::Conflict(format!("role {name} exists")));
        }
        Ok(())
    }

    fn detach_resource(&mut self, id: u32) {
        for menu in self.menus.values_mut() {
            menu.resource_ids.retain(|linked| *linked != id);
        }
        for button in self.buttons.values_mut() {
            button.resource_ids.retain(|linked| *linked != id);
        }
        for role in self.roles.values_mut() {
            role.resource_ids.retain(|linked| *linked != id);
        }
    }

    fn menu_parents(&self) -> HashMap<u32, Option<u32>> {
        self.menus
            .values()
            .map(|menu| (menu.id, menu.parent_id))
            .collect()
    }

    fn menu_subtree(&self, root: u32) -> Vec<u32> {
        let mut children: BTreeMap<u32, Vec<u32>> = BTreeMap::new();
        for menu in self.menus.values() {
            if let Some(parent_id) = menu.parent_id {
                children.entry(parent_id).or_default().push(menu.id);
            }
        }
        let mut visited = HashSet::new();
        let mut order = Vec::new();
        let mut queue = VecDeque::from([root]);
        while let Some(id) = queue.pop_front() {
            if !visited.insert(id) {
                continue;
            }
            order.push(id);
            if let Some(kids) = children.get(&id) {
                queue.extend(kids.iter().copied());
            }
        }
        order
    }
}

fn missing_ids(kind: &str, missing: &[u32]) -> StoreResult<()> {
    if missing.is_empty() {
        return Ok(());
    }
    let rendered: Vec<String> = missing.iter().map(u32::to_string).collect();
    Err(StoreError::NotFound(format!(
        "{kind} ids {}",
        rendered.join(", ")
    )))
}

trait Filterable {
    fn field(&self, key: &str) -> Option<String>;
}

impl Filterable for Resource {
    fn field(&self, key: &str) -> Option<String> {
        match key {
            "url" => Some(self.url.clone()),
            "method" => Some(self.method.clone()),
            "label" => Some(self.label.clone()),
            _ => None,
        }
    }
}

impl Filterable for Menu {
    fn field(&self, key: &str) -> Option<String> {
        match key {
            "name" => Some(self.name.clone()),
            "parent_id" => self.parent_id.map(|id| id.to_string()),
            "is_active" => Some(self.is_active.to_string()),
            _ => None,
        }
    }
}

impl Filterable for Button {
    fn field(&self, key: &str) -> Option<String> {
        match key {
            "name" => Some(self.name.clone()),
            "menu_id" => Some(self.menu_id.to_string()),
            _ => None,
        }
    }
}

impl Filterable for Role {
    fn field(&self, key: &str) -> Option<String> {
        match key {
            "name" => Some(self.name.clone()),
            _ => None,
        }
    }
}

impl Filterable for User {
    fn field(&self, key: &str) -> Option<String> {
        match key {
            "username" => Some(self.username.clone()),
            "role_id" => Some(self.role_id.to_string()),
            "is_active" => Some(self.is_active.to_string()),
            _ => None,
        }
    }
}

impl Filterable for LoginRecord {
    fn field(&self, key: &str) -> Option<String> {
        match key {
            "username" => Some(self.username.clone()),
            "ip_address" => Some(self.ip_address.clone()),
            "success" => Some(self.success.to_string()),
            _ => None,
        }
    }
}

fn paginate<'a, T, I>(items: I, query: &ListQuery, allowed: &[&str]) -> StoreResult<Page<T>>
where
    T: Filterable + Clone + 'a,
    I: DoubleEndedIterator<Item = &'a T>,
{
    let query = query.checked(allowed)?;
    let matches = |item: &&T| {
        query
            .filters
            .iter()
            .all(|(key, value)| item.field(key).as_deref() == Some(value.as_str()))
    };
    let filtered: Vec<&T> = if query.descending {
        items.rev().filter(matches).collect()
    } else {
        items.filter(matches).collect()
    };
    let total = filtered.len() as u64;
    let offset = usize::try_from(query.offset()).unwrap_or(usize::MAX);
    let items = filtered
        .into_iter()
        .skip(offset)
        .take(query.size as usize)
        .cloned()
        .collect();
    Ok(Page {
        items,
        total,
        page: query.page,
        size: query.size,
    })
}

#[derive(Clone, Default)]
pub struct InMemoryStore {
    state: Arc<RwLock<State>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl AdminStore for InMemoryStore {
    async fn create_resource(&self, input: &ResourceInput) -> StoreResult<Resource> {
        let mut state = self.state.write().await;
        state.check_resource_unique(input, None)?;
        let id = state.next_id()?;
        let resource = Resource {
            id,
            url: input.url.clone(),
            method: input.method.clone(),
            label: input.label.clone(),
            descr: input.descr.clone(),
        };
        state.resources.insert(id, resource.clone());
        metrics::gauge!("artweb_resources_total").set(state.resources.len() as f64);
        Ok(resource)
    }

    async fn update_resource(&self, id: u32, input: &ResourceInput) -> StoreResult<Resource> {
        let mut state = self.state.write().await;
        if !state.resources.contains_key(&id) {
            return Err(StoreError::NotFound(format!("resource {id}")));
        }
        state.check_resource_unique(input, Some(id))?;
        let resource = Resource {
            id,
            url: input.url.clone(),
            method: input.method.clone(),
            label: input.label.clone(),
            descr: input.descr.clone(),
        };
        state.resources.insert(id, resource.clone());
        Ok(resource)
    }

    async fn delete_resource(&self, id: u32) -> StoreResult<()> {
        let mut state = self.state.write().await;
        if state.resources.remove(&id).is_none() {
            return Err(StoreError::NotFound(format!("resource {id}")));
        }
        state.detach_resource(id);
        metrics::gauge!("artweb_resources_total").set(state.resources.len() as f64);
        Ok(())
    }

    async fn get_resource(&self, id: u32) -> StoreResult<Resource> {
        let state = self.state.read().await;
        state
            .resources
            .get(&id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(format!("resource {id}")))
    }

    async fn list_resources(&self, query: &ListQuery) -> StoreResult<Page<Resource>> {
        let state = self.state.read().await;
        paginate(state.resources.values(), query, RESOURCE_FILTERS)
    }

    async fn find_resources(&self, ids: &[u32]) -> StoreResult<Vec<Resource>> {
        let state = self.state.read().await;
        Ok(id_set(ids)
            .into_iter()
            .filter_map(|id| state.resources.get(&id).cloned())
            .collect())
    }

    async fn resource_rules(&self) -> StoreResult<Vec<ResourceRule>> {
        let state = self.state.read().await;
        Ok(state.resources.values().map(Resource::rule).collect())
    }

    async fn create_menu(&self, input: &MenuInput) -> StoreResult<Menu> {
        let mut state = self.state.write().await;
        state.check_menu_unique(input, None)?;
        check_placement(&state.menu_parents(), None, input.parent_id)?;
        let resource_ids = id_set(input.resource_ids.as_deref().unwrap_or_default());
        state.ensure_resources(&resource_ids)?;
        let id = state.next_id()?;
        let menu = Menu {
            id,
            path: input.path.clone(),
            component: input.component.clone(),
            name: input.name.clone(),
            meta: input.meta.clone(),
            sort: input.sort,
            is_active: input.is_active,
            descr: input.descr.clone(),
            parent_id: input.parent_id,
            resource_ids,
        };
        state.menus.insert(id, menu.clone());
        metrics::gauge!("artweb_menus_total").set(state.menus.len() as f64);
        Ok(menu)
    }

    async fn update_menu(&self, id: u32, input: &MenuInput) -> StoreResult<Menu> {
        let mut state = self.state.write().await;
        let current = state
            .menus
            .get(&id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(format!("menu {id}")))?;
        state.check_menu_unique(input, Some(id))?;
        check_placement(&state.menu_parents(), Some(id), input.parent_id)?;
        let resource_ids = match &input.resource_ids {
            Some(ids) => id_set(ids),
            None => current.resource_ids.clone(),
        };
        state.ensure_resources(&resource_ids)?;
        let menu = Menu {
            id,
            path: input.path.clone(),
            component: input.component.clone(),
            name: input.name.clone(),
            meta: input.meta.clone(),
            sort: input.sort,
            is_active: input.is_active,
            descr: input.descr.clone(),
            parent_id: input.parent_id,
            resource_ids,
        };
        state.menus.insert(id, menu.clone());
        Ok(menu)
    }

    async fn delete_menu(&self, id: u32) -> StoreResult<MenuRemoval> {
        let mut state = self.state.write().await;
        if !state.menus.contains_key(&id) {
            return Err(StoreError::NotFound(format!("menu {id}")));
        }
        let menu_ids = state.menu_subtree(id);
        let removed_menus: HashSet<u32> = menu_ids.iter().copied().collect();
        let button_ids: Vec<u32> = state
            .buttons
            .values()
            .filter(|button| removed_menus.contains(&button.menu_id))
            .map(|button| button.id)
            .collect();
        let removed_buttons: HashSet<u32> = button_ids.iter().copied().collect();

        for menu_id in &menu_ids {
            state.menus.remove(menu_id);
        }
        for button_id in &button_ids {
            state.buttons.remove(button_id);
        }
        for role in state.roles.values_mut() {
            role.menu_ids.retain(|linked| !removed_menus.contains(linked));
            role.button_ids.retain(|linked| !removed_buttons.contains(linked));
        }
        metrics::gauge!("artweb_menus_total").set(state.menus.len() as f64);
        metrics::gauge!("artweb_buttons_total").set(state.buttons.len() as f64);
        Ok(MenuRemoval {
            menu_ids,
            button_ids,
        })
    }

    async fn get_menu(&self, id: u32) -> StoreResult<Menu> {
        let state = self.state.read().await;
        state
            .menus
            .get(&id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(format!("menu {id}")))
    }

    async fn list_menus(&self, query: &ListQuery) -> StoreResult<Page<Menu>> {
        let state = self.state.read().await;
        paginate(state.menus.values(), query, MENU_FILTERS)
    }

    async fn find_menus(&self, ids: &[u32]) -> StoreResult<Vec<Menu>> {
        let state = self.state.read().await;
        Ok(id_set(ids)
            .into_iter()
            .filter_map(|id| state.menus.get(&id).cloned())
            .collect())
    }

    async fn menu_bindings(&self) -> StoreResult<Vec<MenuBinding>> {
        let state = self.state.read().await;
        Ok(state.menus.values().map(Menu::binding).collect())
    }

    async fn create_button(&self, input: &ButtonInput) -> StoreResult<Button> {
        let mut state = self.state.write().await;
        state.check_button_unique(&input.name, None)?;
        state.ensure_menus(&[input.menu_id])?;
        let resource_ids = id_set(input.resource_ids.as_deref().unwrap_or_default());
        state.ensure_resources(&resource_ids)?;
        let id = state.next_id()?;
        let button = Button {
            id,
            name: input.name.clone(),
            sort: input.sort,
            is_active: input.is_active,
            descr: input.descr.clone(),
            menu_id: input.menu_id,
            resource_ids,
        };
        state.buttons.insert(id, button.clone());
        metrics::gauge!("artweb_buttons_total").set(state.buttons.len() as f64);
        Ok(button)
    }

    async fn update_button(&self, id: u32, input: &ButtonInput) -> StoreResult<Button> {
        let mut state = self.state.write().await;
        let current = state
            .buttons
            .get(&id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(format!("button {id}")))?;
        state.check_button_unique(&input.name, Some(id))?;
        state.ensure_menus(&[input.menu_id])?;
        let resource_ids = match &input.resource_ids {
            Some(ids) => id_set(ids),
            None => current.resource_ids.clone(),
        };
        state.ensure_resources(&resource_ids)?;
        let button = Button {
            id,
            name: input.name.clone(),
            sort: input.sort,
            is_active: input.is_active,
            descr: input.descr.clone(),
            menu_id: input.menu_id,
            resource_ids,
        };
        state.buttons.insert(id, button.clone());
        Ok(button)
    }

    async fn delete_button(&self, id: u32) -> StoreResult<()> {
        let mut state = self.state.write().await;
        if state.buttons.remove(&id).is_none() {
            return Err(StoreError::NotFound(format!("button {id}")));
        }
        for role in state.roles.values_mut() {
            role.button_ids.retain(|linked| *linked != id);
        }
        metrics::gauge!("artweb_buttons_total").set(state.buttons.len() as f64);
        Ok(())
    }

    async fn get_button(&self, id: u32) -> StoreResult<Button> {
        let state = self.state.read().await;
        state
            .buttons
            .get(&id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(format!("button {id}")))
    }

    async fn list_buttons(&self, query: &ListQuery) -> StoreResult<Page<Button>> {
        let state = self.state.read().await;
        paginate(state.buttons.values(), query, BUTTON_FILTERS)
    }

    async fn find_buttons(&self, ids: &[u32]) -> StoreResult<Vec<Button>> {
        let state = self.state.read().await;
        Ok(id_set(ids)
            .into_iter()
            .filter_map(|id| state.buttons.get(&id).cloned())
            .collect())
    }

    async fn button_bindings(&self) -> StoreResult<Vec<ButtonBinding>> {
        let state = self.state.read().await;
        Ok(state.buttons.values().map(Button::binding).collect())
    }

    async fn create_role(&self, input: &RoleInput) -> StoreResult<Role> {
        let mut state = self.state.write().await;
        state.check_role_unique(&input.name, None)?;
        let resource_ids = id_set(input.resource_ids.as_deref().unwrap_or_default());
        let menu_ids = id_set(input.menu_ids.as_deref().unwrap_or_default());
        let button_ids = id_set(input.button_ids.as_deref().unwrap_or_default());
        state.ensure_resources(&resource_ids)?;
        state.ensure_menus(&menu_ids)?;
        state.ensure_buttons(&button_ids)?;
        let id = state.next_id()?;
        let role = Role {
            id,
            name: input.name.clone(),
            descr: input.descr.clone(),
            resource_ids,
            menu_ids,
            button_ids,
        };
        state.roles.insert(id, role.clone());
        metrics::gauge!("artweb_roles_total").set(state.roles.len() as f64);
        Ok(role)
    }

    async fn update_role(&self, id: u32, input: &RoleInput) -> StoreResult<Role> {
        let mut state = self.state.write().await;
        let current = state
            .roles
            .get(&id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(format!("role {id}")))?;
        state.check_role_unique(&input.name, Some(id))?;
        let resource_ids = input
            .resource_ids
            .as_deref()
            .map(id_set)
            .unwrap_or(current.resource_ids);
        let menu_ids = input
            .menu_ids
            .as_deref()
            .map(id_set)
            .unwrap_or(current.menu_ids);
        let button_ids = input
            .button_ids
            .as_deref()
            .map(id_set)
            .unwrap_or(current.button_ids);
        state.ensure_resources(&resource_ids)?;
        state.ensure_menus(&menu_ids)?;
        state.ensure_buttons(&button_ids)?;
        let role = Role {
            id,
            name: input.name.clone(),
            descr: input.descr.clone(),
            resource_ids,
            menu_ids,
            button_ids,
        };
        state.roles.insert(id, role.clone());
        Ok(role)
    }

    async fn delete_role(&self, id: u32) -> StoreResult<()> {
        let mut state = self.state.write().await;
        if !state.roles.contains_key(&id) {
            return Err(StoreError::NotFound(format!("role {id}")));
        }
        if state
            .users
            .values()
            .any(|account| account.user.role_id == id)
        {
            return Err(StoreError::Conflict(format!(
                "role {id} is assigned to users"
            )));
        }
        state.roles.remove(&id);
        metrics::gauge!("artweb_roles_total").set(state.roles.len() as f64);
        Ok(())
    }

    async fn get_role(&self, id: u32) -> StoreResult<Role> {
        let state = self.state.read().await;
        state
            .roles
            .get(&id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(format!("role {id}")))
    }

    async fn list_roles(&self, query: &ListQuery) -> StoreResult<Page<Role>> {
        let state = self.state.read().await;
        paginate(state.roles.values(), query, ROLE_FILTERS)
    }

    async fn find_roles(&self, ids: &[u32]) -> StoreResult<Vec<Role>> {
        let state = self.state.read().await;
        Ok(id_set(ids)
            .into_iter()
            .filter_map(|id| state.roles.get(&id).cloned())
            .collect())
    }

    async fn role_bindings(&self) -> StoreResult<Vec<RoleBinding>> {
        let state = self.state.read().await;
        Ok(state.roles.values().map(Role::binding).collect())
    }

    async fn create_user(&self, user: &NewUser) -> StoreResult<User> {
        let mut state = self.state.write().await;
        if state
            .users
            .values()
            .any(|account| account.user.username == user.username)
        {
            return Err(StoreError::Conflict(format!(
                "user {} exists",
                user.username
            )));
        }
        state.ensure_role(user.role_id)?;
        let id = state.next_id()?;
        let created = User {
            id,
            username: user.username.clone(),
            is_active: user.is_active,
            is_staff: user.is_staff,
            role_id: user.role_id,
        };
        state.users.insert(
            id,
            UserAccount {
                user: created.clone(),
                password_hash: user.password_hash.clone(),
            },
        );
        Ok(created)
    }

    async fn update_user(&self, id: u32, patch: &UserPatch) -> StoreResult<User> {
        let mut state = self.state.write().await;
        if let Some(role_id) = patch.role_id {
            state.ensure_role(role_id)?;
        }
        let account = state
            .users
            .get_mut(&id)
            .ok_or_else(|| StoreError::NotFound(format!("user {id}")))?;
        if let Some(hash) = &patch.password_hash {
            account.password_hash = hash.clone();
        }
        if let Some(is_active) = patch.is_active {
            account.user.is_active = is_active;
        }
        if let Some(is_staff) = patch.is_staff {
            account.user.is_staff = is_staff;
        }
        if let Some(role_id) = patch.role_id {
            account.user.role_id = role_id;
        }
        Ok(account.user.clone())
    }

    async fn delete_user(&self, id: u32) -> StoreResult<()> {
        let mut state = self.state.write().await;
        state
            .users
            .remove(&id)
            .map(|_| ())
            .ok_or_else(|| StoreError::NotFound(format!("user {id}")))
    }

    async fn get_user(&self, id: u32) -> StoreResult<User> {
        let state = self.state.read().await;
        state
            .users
            .get(&id)
            .map(|account| account.user.clone())
            .ok_or_else(|| StoreError::NotFound(format!("user {id}")))
    }

    async fn list_users(&self, query: &ListQuery) -> StoreResult<Page<User>> {
        let state = self.state.read().await;
        let users: Vec<User> = state
            .users
            .values()
            .map(|account| account.user.clone())
            .collect();
        paginate(users.iter(), query, USER_FILTERS)
    }

    async fn get_user_by_username(&self, username: &str) -> StoreResult<UserAccount> {
        let state = self.state.read().await;
        state
            .users
            .values()
            .find(|account| account.user.username == username)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(format!("user {username}")))
    }

    async fn record_login(&self, record: &NewLoginRecord) -> StoreResult<LoginRecord> {
        let mut state = self.state.write().await;
        state.last_record_id += 1;
        let stored = LoginRecord {
            id: state.last_record_id,
            username: record.username.clone(),
            ip_address: record.ip_address.clone(),
            user_agent: record.user_agent.clone(),
            success: record.success,
            outcome: record.outcome.clone(),
            login_at: record.login_at,
        };
        state.login_records.insert(stored.id, stored.clone());
        while state.login_records.len() > MAX_LOGIN_RECORDS {
            state.login_records.pop_first();
        }
        Ok(stored)
    }

    async fn list_login_records(&self, query: &ListQuery) -> StoreResult<Page<LoginRecord>> {
        let state = self.state.read().await;
        paginate(state.login_records.values(), query, LOGIN_RECORD_FILTERS)
    }

    async fn health_check(&self) -> StoreResult<()> {
        Ok(())
    }

    fn is_durable(&self) -> bool {
        false
    }

    fn backend_name(&self) -> &'static str {
        "memory"
    }
}
