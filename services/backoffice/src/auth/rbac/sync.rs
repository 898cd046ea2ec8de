//! Relational-write-then-policy-edit coordinator.
//!
//! # Purpose and responsibility
//! Every admin mutation goes through [`SyncCoordinator`]: it validates the
//! request, resolves referenced ids, commits the row through `AdminStore`,
//! and then mirrors the change into [`PolicyStore`].
//!
//! # Key invariants
//! - The relational commit always completes before any policy edit starts.
//! - A committed row is never rolled back; if the following policy edit fails
//!   the caller gets `SyncError::Inconsistent` naming the affected entity.
//! - Updates rebind outgoing edges under one policy lock hold
//!   (`Cleanup::Supersede`); deletes also purge inbound edges
//!   (`Cleanup::Retire`).
//! - The deadline is checked at entry and again before the relational write.
//!   Once the write has committed, the policy edit runs to completion.
//! - Graph mutations and reconciles hold one sync gate from their first read
//!   until the policy edit ends. A reconcile never observes a committed row
//!   whose policy edit is still pending, and two writes to the same entity
//!   cannot apply their policy edits out of commit order.
use crate::auth::password::{PasswordError, hash_password_blocking};
use crate::auth::rbac::placement::{PlacementError, check_placement};
use crate::model::{
    Button, ButtonInput, Menu, MenuInput, NewUser, Resource, ResourceInput, Role, RoleInput, User,
    UserCreateRequest, UserPatch, UserUpdateRequest,
};
use crate::store::{AdminStore, MenuRemoval, StoreError};
use artweb_authz::{
    AuthzError, Bindable, Cleanup, EdgePosition, EntityKind, HierarchyBinder, MenuBinding,
    PolicyStore, PolicyWriter, ResourceRule, SubjectCodec,
};
use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::sync::{Mutex, OwnedMutexGuard};

/// Per-request deadline and correlation id threaded through every operation.
#[derive(Debug, Clone, Default)]
pub struct SyncContext {
    deadline: Option<Instant>,
    trace_id: Option<String>,
}

impl SyncContext {
    /// No deadline; used by boot-time work.
    pub fn background() -> Self {
        Self::default()
    }

    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            deadline: Instant::now().checked_add(timeout),
            trace_id: None,
        }
    }

    pub fn with_deadline(deadline: Instant) -> Self {
        Self {
            deadline: Some(deadline),
            trace_id: None,
        }
    }

    pub fn with_trace_id(mut self, trace_id: impl Into<String>) -> Self {
        self.trace_id = Some(trace_id.into());
        self
    }

    pub fn trace_id(&self) -> &str {
        self.trace_id.as_deref().unwrap_or("")
    }

    pub fn check(&self) -> SyncResult<()> {
        match self.deadline {
            Some(deadline) if Instant::now() >= deadline => Err(SyncError::Cancelled),
            _ => Ok(()),
        }
    }
}

#[derive(Debug, Error)]
pub enum SyncError {
    #[error("invalid request: {0}")]
    Validation(String),
    #[error("operation deadline exceeded")]
    Cancelled,
    #[error("not found: {0}")]
    NotFound(String),
    #[error("conflict: {0}")]
    Conflict(String),
    #[error("store failure: {0}")]
    Store(#[source] StoreError),
    #[error(transparent)]
    Engine(AuthzError),
    #[error("{entity} was saved but its policy edit failed: {source}")]
    Inconsistent {
        entity: String,
        #[source]
        source: AuthzError,
    },
}

impl SyncError {
    /// Metric label for the outcome of an operation that produced this error.
    pub fn outcome(&self) -> &'static str {
        match self {
            SyncError::Validation(_) => "invalid",
            SyncError::Cancelled => "cancelled",
            SyncError::NotFound(_) => "not_found",
            SyncError::Conflict(_) => "conflict",
            SyncError::Store(_) => "store_error",
            SyncError::Engine(_) => "engine_error",
            SyncError::Inconsistent { .. } => "inconsistent",
        }
    }
}

impl From<StoreError> for SyncError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(what) => SyncError::NotFound(what),
            StoreError::Conflict(what) => SyncError::Conflict(what),
            StoreError::Validation(what) => SyncError::Validation(what),
            other @ StoreError::Unexpected(_) => SyncError::Store(other),
        }
    }
}

impl From<AuthzError> for SyncError {
    fn from(err: AuthzError) -> Self {
        if err.is_validation() {
            SyncError::Validation(err.to_string())
        } else {
            SyncError::Engine(err)
        }
    }
}

impl From<PlacementError> for SyncError {
    fn from(err: PlacementError) -> Self {
        match err {
            PlacementError::UnknownParent(_) => SyncError::NotFound(err.to_string()),
            PlacementError::Invalid(message) => SyncError::Validation(message),
        }
    }
}

impl From<PasswordError> for SyncError {
    fn from(err: PasswordError) -> Self {
        match err {
            PasswordError::TooShort | PasswordError::TooWeak { .. } => {
                SyncError::Validation(err.to_string())
            }
            other => SyncError::Store(StoreError::Unexpected(other.into())),
        }
    }
}

pub type SyncResult<T> = Result<T, SyncError>;

fn inconsistent(entity: String) -> impl FnOnce(AuthzError) -> SyncError {
    move |source| SyncError::Inconsistent { entity, source }
}

#[derive(Clone)]
pub struct SyncCoordinator {
    store: Arc<dyn AdminStore>,
    policies: PolicyStore,
    writer: Arc<dyn PolicyWriter>,
    gate: Arc<Mutex<()>>,
}

impl SyncCoordinator {
    pub fn new(store: Arc<dyn AdminStore>, policies: PolicyStore) -> Self {
        let writer: Arc<dyn PolicyWriter> = Arc::new(policies.clone());
        Self::with_writer(store, policies, writer)
    }

    /// Route every policy edit through `writer`; `policies` still serves reads.
    pub fn with_writer(
        store: Arc<dyn AdminStore>,
        policies: PolicyStore,
        writer: Arc<dyn PolicyWriter>,
    ) -> Self {
        Self {
            store,
            policies,
            writer,
            gate: Arc::new(Mutex::new(())),
        }
    }

    pub fn writer(&self) -> &Arc<dyn PolicyWriter> {
        &self.writer
    }

    /// Wait for the in-flight graph mutation to finish and block new ones
    /// until the guard drops.
    pub async fn lock_graph(&self) -> OwnedMutexGuard<()> {
        self.gate.clone().lock_owned().await
    }

    pub fn store(&self) -> &Arc<dyn AdminStore> {
        &self.store
    }

    pub fn policies(&self) -> &PolicyStore {
        &self.policies
    }

    // -----------------------------
    // Graph primitives
    // -----------------------------

    /// Grant `(perm_<id>, url, method)`. Adding a present rule succeeds.
    pub async fn add_rule(&self, ctx: &SyncContext, resource: &ResourceRule) -> SyncResult<()> {
        ctx.check()?;
        let _gate = self.gate.lock().await;
        let rule = HierarchyBinder::rule(resource)?;
        self.writer.add_rule(&rule).await?;
        Ok(())
    }

    /// Drop a resource's own rule; `Retire` also purges every inbound edge.
    pub async fn remove_rule(
        &self,
        ctx: &SyncContext,
        resource: &ResourceRule,
        cleanup: Cleanup,
    ) -> SyncResult<()> {
        ctx.check()?;
        let _gate = self.gate.lock().await;
        HierarchyBinder::rule(resource)?;
        self.retire_rule(resource, cleanup).await?;
        Ok(())
    }

    /// Add the outgoing edges of a menu, button or role. Zero-id links are
    /// logged and skipped. Returns how many edges were new.
    pub async fn add_edges(&self, ctx: &SyncContext, entity: &impl Bindable) -> SyncResult<usize> {
        ctx.check()?;
        let _gate = self.gate.lock().await;
        let bound = HierarchyBinder::edges(entity)?;
        log_skipped(&bound.subject, &bound.skipped);
        Ok(self.writer.apply_edges(&bound.edges).await?)
    }

    /// Drop the outgoing edges of `kind`/`id`; `Retire` also drops inbound ones.
    pub async fn remove_edges(
        &self,
        ctx: &SyncContext,
        kind: EntityKind,
        id: u32,
        cleanup: Cleanup,
    ) -> SyncResult<()> {
        ctx.check()?;
        let _gate = self.gate.lock().await;
        if id == 0 {
            return Err(AuthzError::InvalidId { kind }.into());
        }
        self.clear_edges(kind, id, cleanup).await?;
        Ok(())
    }

    async fn retire_rule(&self, resource: &ResourceRule, cleanup: Cleanup) -> Result<(), AuthzError> {
        let rule = HierarchyBinder::rule(resource)?;
        self.writer.remove_rule(&rule).await?;
        if cleanup == Cleanup::Retire {
            self.writer
                .remove_edges(EdgePosition::Parent, &rule.subject)
                .await?;
        }
        tracing::debug!(subject = %rule.subject, ?cleanup, "resource rule removed");
        Ok(())
    }

    async fn clear_edges(&self, kind: EntityKind, id: u32, cleanup: Cleanup) -> Result<(), AuthzError> {
        let subject = SubjectCodec::to_subject(kind, id);
        self.writer
            .remove_edges(EdgePosition::Child, &subject)
            .await?;
        if cleanup == Cleanup::Retire {
            self.writer
                .remove_edges(EdgePosition::Parent, &subject)
                .await?;
        }
        tracing::debug!(subject = %subject, ?cleanup, "edges removed");
        Ok(())
    }

    async fn bind(&self, entity: &impl Bindable) -> Result<usize, AuthzError> {
        let bound = HierarchyBinder::edges(entity)?;
        log_skipped(&bound.subject, &bound.skipped);
        self.writer.apply_edges(&bound.edges).await
    }

    /// Replace an entity's outgoing edges in one lock hold.
    async fn rebind(&self, entity: &impl Bindable) -> Result<usize, AuthzError> {
        let bound = HierarchyBinder::edges(entity)?;
        log_skipped(&bound.subject, &bound.skipped);
        self.writer.rebind(&bound.subject, &bound.edges).await
    }

    // -----------------------------
    // Resources
    // -----------------------------

    pub async fn create_resource(
        &self,
        ctx: &SyncContext,
        input: ResourceInput,
    ) -> SyncResult<Resource> {
        let result = async {
            let _gate = self.gate.lock().await;
            ctx.check()?;
            let input = input.normalized();
            validate_resource(&input)?;
            ctx.check()?;
            let resource = self.store.create_resource(&input).await?;
            let rule = resource.rule();
            let rule = HierarchyBinder::rule(&rule)
                .map_err(inconsistent(entity_name(EntityKind::Resource, resource.id)))?;
            self.writer
                .add_rule(&rule)
                .await
                .map_err(inconsistent(entity_name(EntityKind::Resource, resource.id)))?;
            Ok::<_, SyncError>(resource)
        }
        .await;
        observe(ctx, "resource", "create", result)
    }

    /// Swap the resource's rule in place. Inbound edges keep pointing at the
    /// same subject, so dependents see the new url/method immediately.
    pub async fn update_resource(
        &self,
        ctx: &SyncContext,
        id: u32,
        input: ResourceInput,
    ) -> SyncResult<Resource> {
        let result = async {
            let _gate = self.gate.lock().await;
            ctx.check()?;
            require_id(EntityKind::Resource, id)?;
            let input = input.normalized();
            validate_resource(&input)?;
            let previous = self.store.get_resource(id).await?;
            ctx.check()?;
            let resource = self.store.update_resource(id, &input).await?;
            let entity = entity_name(EntityKind::Resource, id);
            let old_rule = HierarchyBinder::rule(&previous.rule()).map_err(inconsistent(entity.clone()))?;
            let new_rule = HierarchyBinder::rule(&resource.rule()).map_err(inconsistent(entity.clone()))?;
            self.writer
                .replace_rule(&old_rule, &new_rule)
                .await
                .map_err(inconsistent(entity))?;
            Ok::<_, SyncError>(resource)
        }
        .await;
        observe(ctx, "resource", "update", result)
    }

    pub async fn delete_resource(&self, ctx: &SyncContext, id: u32) -> SyncResult<Resource> {
        let result = async {
            let _gate = self.gate.lock().await;
            ctx.check()?;
            require_id(EntityKind::Resource, id)?;
            let existing = self.store.get_resource(id).await?;
            ctx.check()?;
            self.store.delete_resource(id).await?;
            self.retire_rule(&existing.rule(), Cleanup::Retire)
                .await
                .map_err(inconsistent(entity_name(EntityKind::Resource, id)))?;
            Ok::<_, SyncError>(existing)
        }
        .await;
        observe(ctx, "resource", "delete", result)
    }

    // -----------------------------
    // Menus
    // -----------------------------

    pub async fn create_menu(&self, ctx: &SyncContext, input: MenuInput) -> SyncResult<Menu> {
        let result = async {
            let _gate = self.gate.lock().await;
            ctx.check()?;
            let mut input = input.normalized();
            validate_menu(&input)?;
            let resource_ids = drop_zero_ids("menu", "resource", input.resource_ids.take());
            if let Some(ids) = &resource_ids {
                self.resolve_resources(ids).await?;
            }
            input.resource_ids = resource_ids;
            let menus = self.store.menu_bindings().await?;
            check_menu_placement(&menus, None, input.parent_id)?;
            ctx.check()?;
            let menu = self.store.create_menu(&input).await?;
            self.bind(&menu.binding())
                .await
                .map_err(inconsistent(entity_name(EntityKind::Menu, menu.id)))?;
            Ok::<_, SyncError>(menu)
        }
        .await;
        observe(ctx, "menu", "create", result)
    }

    pub async fn update_menu(
        &self,
        ctx: &SyncContext,
        id: u32,
        input: MenuInput,
    ) -> SyncResult<Menu> {
        let result = async {
            let _gate = self.gate.lock().await;
            ctx.check()?;
            require_id(EntityKind::Menu, id)?;
            let mut input = input.normalized();
            validate_menu(&input)?;
            self.store.get_menu(id).await?;
            let resource_ids = drop_zero_ids("menu", "resource", input.resource_ids.take());
            if let Some(ids) = &resource_ids {
                self.resolve_resources(ids).await?;
            }
            input.resource_ids = resource_ids;
            let menus = self.store.menu_bindings().await?;
            check_menu_placement(&menus, Some(id), input.parent_id)?;
            ctx.check()?;
            let menu = self.store.update_menu(id, &input).await?;
            self.rebind(&menu.binding())
                .await
                .map_err(inconsistent(entity_name(EntityKind::Menu, id)))?;
            Ok::<_, SyncError>(menu)
        }
        .await;
        observe(ctx, "menu", "update", result)
    }

    /// Deletes the menu subtree and its buttons, retiring every removed subject.
    pub async fn delete_menu(&self, ctx: &SyncContext, id: u32) -> SyncResult<MenuRemoval> {
        let result = async {
            let _gate = self.gate.lock().await;
            ctx.check()?;
            require_id(EntityKind::Menu, id)?;
            self.store.get_menu(id).await?;
            ctx.check()?;
            let removal = self.store.delete_menu(id).await?;
            for button_id in &removal.button_ids {
                self.clear_edges(EntityKind::Button, *button_id, Cleanup::Retire)
                    .await
                    .map_err(inconsistent(entity_name(EntityKind::Button, *button_id)))?;
            }
            for menu_id in &removal.menu_ids {
                self.clear_edges(EntityKind::Menu, *menu_id, Cleanup::Retire)
                    .await
                    .map_err(inconsistent(entity_name(EntityKind::Menu, *menu_id)))?;
            }
            tracing::info!(
                menu_id = id,
                menus = removal.menu_ids.len(),
                buttons = removal.button_ids.len(),
                "menu subtree deleted"
            );
            Ok::<_, SyncError>(removal)
        }
        .await;
        observe(ctx, "menu", "delete", result)
    }

    // -----------------------------
    // Buttons
    // -----------------------------

    pub async fn create_button(&self, ctx: &SyncContext, input: ButtonInput) -> SyncResult<Button> {
        let result = async {
            let _gate = self.gate.lock().await;
            ctx.check()?;
            let mut input = input;
            validate_button(&mut input)?;
            self.store.get_menu(input.menu_id).await?;
            let resource_ids = drop_zero_ids("button", "resource", input.resource_ids.take());
            if let Some(ids) = &resource_ids {
                self.resolve_resources(ids).await?;
            }
            input.resource_ids = resource_ids;
            ctx.check()?;
            let button = self.store.create_button(&input).await?;
            self.bind(&button.binding())
                .await
                .map_err(inconsistent(entity_name(EntityKind::Button, button.id)))?;
            Ok::<_, SyncError>(button)
        }
        .await;
        observe(ctx, "button", "create", result)
    }

    pub async fn update_button(
        &self,
        ctx: &SyncContext,
        id: u32,
        input: ButtonInput,
    ) -> SyncResult<Button> {
        let result = async {
            let _gate = self.gate.lock().await;
            ctx.check()?;
            require_id(EntityKind::Button, id)?;
            let mut input = input;
            validate_button(&mut input)?;
            self.store.get_button(id).await?;
            self.store.get_menu(input.menu_id).await?;
            let resource_ids = drop_zero_ids("button", "resource", input.resource_ids.take());
            if let Some(ids) = &resource_ids {
                self.resolve_resources(ids).await?;
            }
            input.resource_ids = resource_ids;
            ctx.check()?;
            let button = self.store.update_button(id, &input).await?;
            self.rebind(&button.binding())
                .await
                .map_err(inconsistent(entity_name(EntityKind::Button, id)))?;
            Ok::<_, SyncError>(button)
        }
        .await;
        observe(ctx, "button", "update", result)
    }

    pub async fn delete_button(&self, ctx: &SyncContext, id: u32) -> SyncResult<Button> {
        let result = async {
            let _gate = self.gate.lock().await;
            ctx.check()?;
            require_id(EntityKind::Button, id)?;
            let existing = self.store.get_button(id).await?;
            ctx.check()?;
            self.store.delete_button(id).await?;
            self.clear_edges(EntityKind::Button, id, Cleanup::Retire)
                .await
                .map_err(inconsistent(entity_name(EntityKind::Button, id)))?;
            Ok::<_, SyncError>(existing)
        }
        .await;
        observe(ctx, "button", "delete", result)
    }

    // -----------------------------
    // Roles
    // -----------------------------

    pub async fn create_role(&self, ctx: &SyncContext, input: RoleInput) -> SyncResult<Role> {
        let result = async {
            let _gate = self.gate.lock().await;
            ctx.check()?;
            let input = self.prepare_role(input).await?;
            ctx.check()?;
            let role = self.store.create_role(&input).await?;
            self.bind(&role.binding())
                .await
                .map_err(inconsistent(entity_name(EntityKind::Role, role.id)))?;
            Ok::<_, SyncError>(role)
        }
        .await;
        observe(ctx, "role", "create", result)
    }

    pub async fn update_role(
        &self,
        ctx: &SyncContext,
        id: u32,
        input: RoleInput,
    ) -> SyncResult<Role> {
        let result = async {
            let _gate = self.gate.lock().await;
            ctx.check()?;
            require_id(EntityKind::Role, id)?;
            self.store.get_role(id).await?;
            let input = self.prepare_role(input).await?;
            ctx.check()?;
            let role = self.store.update_role(id, &input).await?;
            self.rebind(&role.binding())
                .await
                .map_err(inconsistent(entity_name(EntityKind::Role, id)))?;
            Ok::<_, SyncError>(role)
        }
        .await;
        observe(ctx, "role", "update", result)
    }

    /// Refused with `Conflict` while any user still holds the role.
    pub async fn delete_role(&self, ctx: &SyncContext, id: u32) -> SyncResult<Role> {
        let result = async {
            let _gate = self.gate.lock().await;
            ctx.check()?;
            require_id(EntityKind::Role, id)?;
            let existing = self.store.get_role(id).await?;
            ctx.check()?;
            self.store.delete_role(id).await?;
            self.clear_edges(EntityKind::Role, id, Cleanup::Retire)
                .await
                .map_err(inconsistent(entity_name(EntityKind::Role, id)))?;
            Ok::<_, SyncError>(existing)
        }
        .await;
        observe(ctx, "role", "delete", result)
    }

    async fn prepare_role(&self, mut input: RoleInput) -> SyncResult<RoleInput> {
        input.name = input.name.trim().to_string();
        if input.name.is_empty() {
            return Err(SyncError::Validation("role name is required".to_string()));
        }
        input.resource_ids = drop_zero_ids("role", "resource", input.resource_ids.take());
        input.menu_ids = drop_zero_ids("role", "menu", input.menu_ids.take());
        input.button_ids = drop_zero_ids("role", "button", input.button_ids.take());
        if let Some(ids) = &input.resource_ids {
            self.resolve_resources(ids).await?;
        }
        if let Some(ids) = &input.menu_ids {
            let found = self.store.find_menus(ids).await?;
            require_all(EntityKind::Menu, ids, found.iter().map(|menu| menu.id))?;
        }
        if let Some(ids) = &input.button_ids {
            let found = self.store.find_buttons(ids).await?;
            require_all(EntityKind::Button, ids, found.iter().map(|button| button.id))?;
        }
        Ok(input)
    }

    async fn resolve_resources(&self, ids: &[u32]) -> SyncResult<()> {
        let found = self.store.find_resources(ids).await?;
        require_all(
            EntityKind::Resource,
            ids,
            found.iter().map(|resource| resource.id),
        )
    }

    // -----------------------------
    // Users (lookup keys for a role, not graph nodes)
    // -----------------------------

    pub async fn create_user(&self, ctx: &SyncContext, request: UserCreateRequest) -> SyncResult<User> {
        let result = async {
            ctx.check()?;
            let username = request.username.trim().to_string();
            if username.is_empty() {
                return Err(SyncError::Validation("username is required".to_string()));
            }
            require_id(EntityKind::Role, request.role_id)?;
            self.store.get_role(request.role_id).await?;
            let password_hash = hash_password_blocking(request.password).await?;
            ctx.check()?;
            let user = self
                .store
                .create_user(&NewUser {
                    username,
                    password_hash,
                    is_active: request.is_active,
                    is_staff: request.is_staff,
                    role_id: request.role_id,
                })
                .await?;
            Ok::<_, SyncError>(user)
        }
        .await;
        observe(ctx, "user", "create", result)
    }

    pub async fn update_user(
        &self,
        ctx: &SyncContext,
        id: u32,
        request: UserUpdateRequest,
    ) -> SyncResult<User> {
        let result = async {
            ctx.check()?;
            if id == 0 {
                return Err(SyncError::Validation("user id must be non-zero".to_string()));
            }
            self.store.get_user(id).await?;
            if let Some(role_id) = request.role_id {
                require_id(EntityKind::Role, role_id)?;
                self.store.get_role(role_id).await?;
            }
            let password_hash = match request.password {
                Some(password) => Some(hash_password_blocking(password).await?),
                None => None,
            };
            ctx.check()?;
            let user = self
                .store
                .update_user(
                    id,
                    &UserPatch {
                        password_hash,
                        is_active: request.is_active,
                        is_staff: request.is_staff,
                        role_id: request.role_id,
                    },
                )
                .await?;
            Ok::<_, SyncError>(user)
        }
        .await;
        observe(ctx, "user", "update", result)
    }

    pub async fn delete_user(&self, ctx: &SyncContext, id: u32) -> SyncResult<User> {
        let result = async {
            ctx.check()?;
            let existing = self.store.get_user(id).await?;
            ctx.check()?;
            self.store.delete_user(id).await?;
            Ok::<_, SyncError>(existing)
        }
        .await;
        observe(ctx, "user", "delete", result)
    }
}

fn observe<T>(
    ctx: &SyncContext,
    kind: &'static str,
    op: &'static str,
    result: SyncResult<T>,
) -> SyncResult<T> {
    let outcome = match &result {
        Ok(_) => "ok",
        Err(err) => err.outcome(),
    };
    metrics::counter!(
        "artweb_policy_sync_total",
        "kind" => kind,
        "op" => op,
        "outcome" => outcome
    )
    .increment(1);
    match &result {
        Ok(_) => tracing::info!(kind, op, trace_id = ctx.trace_id(), "admin write synced"),
        Err(err @ SyncError::Inconsistent { .. }) => tracing::error!(
            kind,
            op,
            trace_id = ctx.trace_id(),
            error = %err,
            "policy graph out of sync; run a reconcile to repair"
        ),
        Err(err @ (SyncError::Store(_) | SyncError::Engine(_))) => {
            tracing::error!(kind, op, trace_id = ctx.trace_id(), error = %err, "admin write failed")
        }
        Err(err) => tracing::info!(kind, op, trace_id = ctx.trace_id(), error = %err, "admin write rejected"),
    }
    result
}

fn entity_name(kind: EntityKind, id: u32) -> String {
    format!("{kind} {id}")
}

fn log_skipped(subject: &str, skipped: &[EntityKind]) {
    for kind in skipped {
        tracing::warn!(subject, linked_kind = %kind, "skipping link with zero id");
    }
}

fn require_id(kind: EntityKind, id: u32) -> SyncResult<()> {
    if id == 0 {
        return Err(AuthzError::InvalidId { kind }.into());
    }
    Ok(())
}

/// Zero ids mean "no link" in association lists and are dropped before any
/// lookup.
fn drop_zero_ids(owner: &str, target: &str, ids: Option<Vec<u32>>) -> Option<Vec<u32>> {
    ids.map(|ids| {
        let before = ids.len();
        let kept: Vec<u32> = ids.into_iter().filter(|id| *id != 0).collect();
        if kept.len() != before {
            tracing::warn!(owner, target, dropped = before - kept.len(), "ignoring zero ids");
        }
        kept
    })
}

fn require_all(
    kind: EntityKind,
    requested: &[u32],
    found: impl Iterator<Item = u32>,
) -> SyncResult<()> {
    let found: HashSet<u32> = found.collect();
    let missing: BTreeSet<u32> = requested
        .iter()
        .copied()
        .filter(|id| !found.contains(id))
        .collect();
    if missing.is_empty() {
        return Ok(());
    }
    let ids: Vec<String> = missing.iter().map(u32::to_string).collect();
    Err(SyncError::NotFound(format!("{kind} ids {}", ids.join(", "))))
}

fn validate_resource(input: &ResourceInput) -> SyncResult<()> {
    if input.url.is_empty() {
        return Err(SyncError::Validation("resource url is required".to_string()));
    }
    if input.method.is_empty() {
        return Err(SyncError::Validation(
            "resource method is required".to_string(),
        ));
    }
    Ok(())
}

fn validate_menu(input: &MenuInput) -> SyncResult<()> {
    if input.path.is_empty() {
        return Err(SyncError::Validation("menu path is required".to_string()));
    }
    if input.name.is_empty() {
        return Err(SyncError::Validation("menu name is required".to_string()));
    }
    Ok(())
}

fn validate_button(input: &mut ButtonInput) -> SyncResult<()> {
    input.name = input.name.trim().to_string();
    if input.name.is_empty() {
        return Err(SyncError::Validation("button name is required".to_string()));
    }
    require_id(EntityKind::Menu, input.menu_id)
}

/// Snapshot form of [`check_placement`] run before the relational write.
fn check_menu_placement(
    menus: &[MenuBinding],
    menu_id: Option<u32>,
    parent_id: Option<u32>,
) -> SyncResult<()> {
    let parents: HashMap<u32, Option<u32>> =
        menus.iter().map(|menu| (menu.id, menu.parent_id)).collect();
    Ok(check_placement(&parents, menu_id, parent_id)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{MenuMeta, RoleInput};
    use crate::store::memory::InMemoryStore;
    use artweb_authz::{AuthzResult, Edge, ReconcileOutcome, Rule};
    use async_trait::async_trait;

    async fn coordinator() -> SyncCoordinator {
        let store: Arc<dyn AdminStore> = Arc::new(InMemoryStore::new());
        let policies = PolicyStore::new().await.expect("policy store");
        SyncCoordinator::new(store, policies)
    }

    fn resource(url: &str, method: &str) -> ResourceInput {
        ResourceInput {
            url: url.to_string(),
            method: method.to_string(),
            label: String::new(),
            descr: String::new(),
        }
    }

    fn menu(name: &str, parent_id: Option<u32>, resource_ids: Vec<u32>) -> MenuInput {
        MenuInput {
            path: format!("/{name}"),
            component: "Layout".to_string(),
            name: name.to_string(),
            meta: MenuMeta::default(),
            sort: 0,
            is_active: true,
            descr: String::new(),
            parent_id,
            resource_ids: Some(resource_ids),
        }
    }

    fn binding(id: u32, parent_id: Option<u32>) -> MenuBinding {
        MenuBinding {
            id,
            parent_id,
            resource_ids: Vec::new(),
        }
    }

    async fn allowed(sync: &SyncCoordinator, subject: &str, url: &str, method: &str) -> bool {
        sync.policies()
            .evaluate(subject, url, method)
            .await
            .expect("evaluate")
    }

    #[tokio::test]
    async fn add_rule_rejects_invalid_input_without_touching_engine() {
        let sync = coordinator().await;
        let ctx = SyncContext::background();
        let zero = ResourceRule {
            id: 0,
            url: "/x".to_string(),
            method: "GET".to_string(),
        };
        assert!(matches!(
            sync.add_rule(&ctx, &zero).await,
            Err(SyncError::Validation(_))
        ));
        let empty = ResourceRule {
            id: 1,
            url: "/x".to_string(),
            method: String::new(),
        };
        assert!(matches!(
            sync.add_rule(&ctx, &empty).await,
            Err(SyncError::Validation(_))
        ));
        assert!(sync.policies().rules().await.is_empty());
    }

    #[tokio::test]
    async fn expired_context_is_rejected_before_any_write() {
        let sync = coordinator().await;
        let ctx = SyncContext::with_deadline(Instant::now());
        let err = sync
            .create_resource(&ctx, resource("/x", "GET"))
            .await
            .expect_err("cancelled");
        assert!(matches!(err, SyncError::Cancelled));
        let page = sync
            .store()
            .list_resources(&Default::default())
            .await
            .expect("list");
        assert_eq!(page.total, 0);
    }

    #[tokio::test]
    async fn supersede_keeps_inbound_edges_and_retire_drops_them() {
        let sync = coordinator().await;
        let ctx = SyncContext::background();
        let res = sync
            .create_resource(&ctx, resource("/x", "GET"))
            .await
            .expect("resource");
        let m = sync
            .create_menu(&ctx, menu("m", None, vec![res.id]))
            .await
            .expect("menu");
        let menu_subject = SubjectCodec::menu(m.id);

        sync.remove_rule(&ctx, &res.rule(), Cleanup::Supersede)
            .await
            .expect("supersede");
        sync.add_rule(&ctx, &res.rule()).await.expect("re-add");
        assert!(allowed(&sync, &menu_subject, "/x", "GET").await);

        sync.remove_rule(&ctx, &res.rule(), Cleanup::Retire)
            .await
            .expect("retire");
        sync.add_rule(&ctx, &res.rule()).await.expect("re-add");
        assert!(!allowed(&sync, &menu_subject, "/x", "GET").await);
    }

    #[tokio::test]
    async fn add_edges_skips_zero_links() {
        let sync = coordinator().await;
        let ctx = SyncContext::background();
        let added = sync
            .add_edges(
                &ctx,
                &MenuBinding {
                    id: 5,
                    parent_id: Some(0),
                    resource_ids: vec![0, 7],
                },
            )
            .await
            .expect("edges");
        assert_eq!(added, 1);
        let edges = sync.policies().edges().await;
        assert_eq!(edges.len(), 1);
        assert_eq!(edges[0].parent, "perm_7");
    }

    #[tokio::test]
    async fn create_menu_with_unknown_resource_writes_nothing() {
        let sync = coordinator().await;
        let ctx = SyncContext::background();
        let err = sync
            .create_menu(&ctx, menu("m", None, vec![42]))
            .await
            .expect_err("missing resource");
        assert!(matches!(err, SyncError::NotFound(message) if message.contains("42")));
        assert!(sync.store().menu_bindings().await.expect("menus").is_empty());
        assert!(sync.policies().edges().await.is_empty());
    }

    #[tokio::test]
    async fn update_resource_moves_grant_for_dependents() {
        let sync = coordinator().await;
        let ctx = SyncContext::background();
        let res = sync
            .create_resource(&ctx, resource("/old", "get"))
            .await
            .expect("resource");
        let m = sync
            .create_menu(&ctx, menu("m", None, vec![res.id]))
            .await
            .expect("menu");
        sync.update_resource(&ctx, res.id, resource("/new", "POST"))
            .await
            .expect("update");
        let subject = SubjectCodec::menu(m.id);
        assert!(!allowed(&sync, &subject, "/old", "GET").await);
        assert!(allowed(&sync, &subject, "/new", "POST").await);
    }

    #[tokio::test]
    async fn update_button_moves_it_between_menus() {
        let sync = coordinator().await;
        let ctx = SyncContext::background();
        let a = sync
            .create_resource(&ctx, resource("/a", "GET"))
            .await
            .expect("a");
        let b = sync
            .create_resource(&ctx, resource("/b", "GET"))
            .await
            .expect("b");
        let menu_a = sync
            .create_menu(&ctx, menu("ma", None, vec![a.id]))
            .await
            .expect("menu a");
        let menu_b = sync
            .create_menu(&ctx, menu("mb", None, vec![b.id]))
            .await
            .expect("menu b");
        let mut input = ButtonInput {
            name: "save".to_string(),
            sort: 0,
            is_active: true,
            descr: String::new(),
            menu_id: menu_a.id,
            resource_ids: None,
        };
        let button = sync
            .create_button(&ctx, input.clone())
            .await
            .expect("button");
        let subject = SubjectCodec::button(button.id);
        assert!(allowed(&sync, &subject, "/a", "GET").await);

        input.menu_id = menu_b.id;
        sync.update_button(&ctx, button.id, input)
            .await
            .expect("move");
        assert!(!allowed(&sync, &subject, "/a", "GET").await);
        assert!(allowed(&sync, &subject, "/b", "GET").await);
    }

    #[tokio::test]
    async fn delete_menu_retires_subtree_and_buttons() {
        let sync = coordinator().await;
        let ctx = SyncContext::background();
        let res = sync
            .create_resource(&ctx, resource("/x", "GET"))
            .await
            .expect("resource");
        let root = sync
            .create_menu(&ctx, menu("root", None, vec![res.id]))
            .await
            .expect("root");
        let child = sync
            .create_menu(&ctx, menu("child", Some(root.id), vec![]))
            .await
            .expect("child");
        let button = sync
            .create_button(
                &ctx,
                ButtonInput {
                    name: "edit".to_string(),
                    sort: 0,
                    is_active: true,
                    descr: String::new(),
                    menu_id: child.id,
                    resource_ids: None,
                },
            )
            .await
            .expect("button");
        let role = sync
            .create_role(
                &ctx,
                RoleInput {
                    name: "ops".to_string(),
                    descr: String::new(),
                    resource_ids: None,
                    menu_ids: None,
                    button_ids: Some(vec![button.id]),
                },
            )
            .await
            .expect("role");
        let role_subject = SubjectCodec::role(role.id);
        assert!(allowed(&sync, &role_subject, "/x", "GET").await);

        let removal = sync.delete_menu(&ctx, root.id).await.expect("delete");
        assert_eq!(removal.menu_ids, vec![root.id, child.id]);
        assert_eq!(removal.button_ids, vec![button.id]);
        assert!(!allowed(&sync, &role_subject, "/x", "GET").await);
        assert!(
            sync.policies()
                .edges()
                .await
                .iter()
                .all(|edge| !edge.parent.starts_with("menu_") && !edge.parent.starts_with("button_"))
        );
    }

    #[tokio::test]
    async fn delete_role_in_use_is_a_conflict_and_keeps_edges() {
        let sync = coordinator().await;
        let ctx = SyncContext::background();
        let res = sync
            .create_resource(&ctx, resource("/x", "GET"))
            .await
            .expect("resource");
        let role = sync
            .create_role(
                &ctx,
                RoleInput {
                    name: "viewer".to_string(),
                    descr: String::new(),
                    resource_ids: Some(vec![res.id]),
                    menu_ids: None,
                    button_ids: None,
                },
            )
            .await
            .expect("role");
        sync.create_user(
            &ctx,
            UserCreateRequest {
                username: "alice".to_string(),
                password: "alice-password".to_string(),
                is_active: true,
                is_staff: false,
                role_id: role.id,
            },
        )
        .await
        .expect("user");

        let err = sync.delete_role(&ctx, role.id).await.expect_err("in use");
        assert!(matches!(err, SyncError::Conflict(_)));
        assert!(allowed(&sync, &SubjectCodec::role(role.id), "/x", "GET").await);
    }

    #[tokio::test]
    async fn create_user_requires_existing_role_and_long_password() {
        let sync = coordinator().await;
        let ctx = SyncContext::background();
        let err = sync
            .create_user(
                &ctx,
                UserCreateRequest {
                    username: "bob".to_string(),
                    password: "bob-password".to_string(),
                    is_active: true,
                    is_staff: false,
                    role_id: 99,
                },
            )
            .await
            .expect_err("missing role");
        assert!(matches!(err, SyncError::NotFound(_)));

        let role = sync
            .create_role(
                &ctx,
                RoleInput {
                    name: "r".to_string(),
                    descr: String::new(),
                    resource_ids: None,
                    menu_ids: None,
                    button_ids: None,
                },
            )
            .await
            .expect("role");
        let err = sync
            .create_user(
                &ctx,
                UserCreateRequest {
                    username: "bob".to_string(),
                    password: "short".to_string(),
                    is_active: true,
                    is_staff: false,
                    role_id: role.id,
                },
            )
            .await
            .expect_err("short password");
        assert!(matches!(err, SyncError::Validation(_)));
    }

    #[test]
    fn placement_rejects_self_parent_and_cycles() {
        let menus = vec![binding(1, None), binding(2, Some(1)), binding(3, Some(2))];
        assert!(matches!(
            check_menu_placement(&menus, Some(1), Some(1)),
            Err(SyncError::Validation(_))
        ));
        assert!(matches!(
            check_menu_placement(&menus, Some(1), Some(3)),
            Err(SyncError::Validation(_))
        ));
        assert!(check_menu_placement(&menus, Some(3), Some(1)).is_ok());
        assert!(matches!(
            check_menu_placement(&menus, None, Some(9)),
            Err(SyncError::NotFound(_))
        ));
    }

    #[test]
    fn placement_caps_depth_including_moved_subtree() {
        let mut menus = vec![binding(1, None)];
        for id in 2..=6 {
            menus.push(binding(id, Some(id - 1)));
        }
        // 1 -> ... -> 6 is already six levels deep.
        assert!(check_menu_placement(&menus, None, Some(5)).is_ok());
        assert!(check_menu_placement(&menus, None, Some(6)).is_err());

        menus.push(binding(10, None));
        menus.push(binding(11, Some(10)));
        // Moving the two-level subtree rooted at 10 under 5 would reach seven.
        assert!(check_menu_placement(&menus, Some(10), Some(4)).is_ok());
        assert!(check_menu_placement(&menus, Some(10), Some(5)).is_err());
    }

    #[test]
    fn placement_survives_stored_cycles() {
        let menus = vec![binding(1, Some(2)), binding(2, Some(1))];
        assert!(check_menu_placement(&menus, None, Some(1)).is_err());
        assert!(check_menu_placement(&menus, Some(1), None).is_ok());
    }

    #[test]
    fn store_errors_map_to_sync_variants() {
        assert!(matches!(
            SyncError::from(StoreError::NotFound("menu 1".to_string())),
            SyncError::NotFound(_)
        ));
        assert!(matches!(
            SyncError::from(StoreError::Conflict("name".to_string())),
            SyncError::Conflict(_)
        ));
        assert!(matches!(
            SyncError::from(StoreError::Unexpected(anyhow::anyhow!("boom"))),
            SyncError::Store(_)
        ));
        assert_eq!(SyncError::Cancelled.outcome(), "cancelled");
    }

    #[test]
    fn context_without_deadline_never_expires() {
        let ctx = SyncContext::background().with_trace_id("abc");
        assert!(ctx.check().is_ok());
        assert_eq!(ctx.trace_id(), "abc");
        assert!(SyncContext::with_timeout(Duration::from_secs(60)).check().is_ok());
    }

    /// Policy backend whose every edit fails, as when the engine is wedged.
    struct BrokenWriter;

    fn broken() -> AuthzError {
        AuthzError::backend("apply edit", "policy backend unavailable")
    }

    #[async_trait]
    impl PolicyWriter for BrokenWriter {
        async fn add_rule(&self, _rule: &Rule) -> AuthzResult<bool> {
            Err(broken())
        }
        async fn remove_rule(&self, _rule: &Rule) -> AuthzResult<bool> {
            Err(broken())
        }
        async fn replace_rule(&self, _old: &Rule, _new: &Rule) -> AuthzResult<()> {
            Err(broken())
        }
        async fn apply_edges(&self, _edges: &[Edge]) -> AuthzResult<usize> {
            Err(broken())
        }
        async fn remove_edges(&self, _position: EdgePosition, _subject: &str) -> AuthzResult<bool> {
            Err(broken())
        }
        async fn rebind(&self, _subject: &str, _edges: &[Edge]) -> AuthzResult<usize> {
            Err(broken())
        }
        async fn reconcile(&self, _rules: &[Rule], _edges: &[Edge]) -> AuthzResult<ReconcileOutcome> {
            Err(broken())
        }
    }

    /// A healthy coordinator and one sharing its store whose edits all fail.
    async fn healthy_and_broken() -> (SyncCoordinator, SyncCoordinator) {
        let healthy = coordinator().await;
        let broken = SyncCoordinator::with_writer(
            healthy.store().clone(),
            healthy.policies().clone(),
            Arc::new(BrokenWriter),
        );
        (healthy, broken)
    }

    #[tokio::test]
    async fn failed_policy_edit_after_create_keeps_the_row() {
        let (healthy, broken) = healthy_and_broken().await;
        let ctx = SyncContext::background();
        let err = broken
            .create_resource(&ctx, resource("/orphan", "GET"))
            .await
            .expect_err("inconsistent");
        match err {
            SyncError::Inconsistent { entity, .. } => assert!(entity.starts_with("resource ")),
            other => panic!("expected inconsistent, got {other:?}"),
        }
        let rows = healthy
            .store()
            .list_resources(&crate::store::ListQuery::default())
            .await
            .expect("list");
        assert_eq!(rows.total, 1);
        assert_eq!(rows.items[0].url, "/orphan");
        assert!(healthy.policies().rules().await.is_empty());
    }

    #[tokio::test]
    async fn failed_policy_edit_after_update_keeps_the_new_row() {
        let (healthy, broken) = healthy_and_broken().await;
        let ctx = SyncContext::background();
        let first = healthy.create_resource(&ctx, resource("/a", "GET")).await.expect("a");
        let second = healthy.create_resource(&ctx, resource("/b", "GET")).await.expect("b");
        let nav = healthy
            .create_menu(&ctx, menu("nav", None, vec![first.id]))
            .await
            .expect("menu");

        let err = broken
            .update_menu(&ctx, nav.id, menu("nav", None, vec![second.id]))
            .await
            .expect_err("inconsistent");
        assert!(matches!(
            err,
            SyncError::Inconsistent { ref entity, .. } if *entity == format!("menu {}", nav.id)
        ));
        let stored = healthy.store().get_menu(nav.id).await.expect("menu");
        assert_eq!(stored.resource_ids, vec![second.id]);
        // the graph still holds the pre-update edge until a reconcile
        assert!(allowed(&healthy, &SubjectCodec::menu(nav.id), "/a", "GET").await);
    }

    #[tokio::test]
    async fn failed_policy_edit_after_delete_keeps_the_deletion() {
        let (healthy, broken) = healthy_and_broken().await;
        let ctx = SyncContext::background();
        let api = healthy.create_resource(&ctx, resource("/r", "GET")).await.expect("resource");
        let role = healthy
            .create_role(
                &ctx,
                RoleInput {
                    name: "viewer".to_string(),
                    descr: String::new(),
                    resource_ids: Some(vec![api.id]),
                    menu_ids: None,
                    button_ids: None,
                },
            )
            .await
            .expect("role");

        let err = broken.delete_role(&ctx, role.id).await.expect_err("inconsistent");
        assert!(matches!(err, SyncError::Inconsistent { .. }));
        assert_eq!(err.outcome(), "inconsistent");
        assert!(matches!(
            healthy.store().get_role(role.id).await,
            Err(StoreError::NotFound(_))
        ));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_rebinds_leave_one_writer_in_row_and_graph() {
        let sync = coordinator().await;
        let ctx = SyncContext::background();
        let mut resource_ids = Vec::new();
        for index in 0..6 {
            let created = sync
                .create_resource(&ctx, resource(&format!("/r{index}"), "GET"))
                .await
                .expect("resource");
            resource_ids.push(created.id);
        }
        let nav = sync.create_menu(&ctx, menu("nav", None, vec![])).await.expect("menu");

        let inputs: Vec<Vec<u32>> = resource_ids.chunks(2).map(<[u32]>::to_vec).collect();
        let mut tasks = Vec::new();
        for ids in inputs.clone() {
            let sync = sync.clone();
            let nav_id = nav.id;
            tasks.push(tokio::spawn(async move {
                sync.update_menu(&SyncContext::background(), nav_id, menu("nav", None, ids))
                    .await
            }));
        }
        for task in tasks {
            task.await.expect("join").expect("update");
        }

        let subject = SubjectCodec::menu(nav.id);
        let mut parents: Vec<u32> = sync
            .policies()
            .edges()
            .await
            .into_iter()
            .filter(|edge| edge.child == subject)
            .map(|edge| {
                edge.parent
                    .trim_start_matches("perm_")
                    .parse()
                    .expect("resource subject")
            })
            .collect();
        parents.sort_unstable();
        assert!(inputs.contains(&parents), "edges {parents:?} match no single input");
        let stored = sync.store().get_menu(nav.id).await.expect("menu");
        assert_eq!(stored.resource_ids, parents);
    }
}
