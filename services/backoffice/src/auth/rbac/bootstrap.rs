//! Rebuild the policy graph from relational state.
//!
//! The reconciler reads every binding in the fixed order
//! resource -> menu -> button -> role, derives rules and edges with the same
//! `HierarchyBinder` used on create, and makes the graph hold exactly that
//! set. Items in the graph with no relational counterpart are pruned.
//!
//! The pass holds the coordinator's sync gate, so no mutation can commit a
//! row between the reads and the prune.
use crate::auth::rbac::sync::{SyncContext, SyncCoordinator, SyncError, SyncResult};
use crate::config::AdminSeedConfig;
use crate::model::{RoleInput, User, UserCreateRequest};
use crate::store::{ListQuery, StoreError};
use artweb_authz::{Bindable, Edge, HierarchyBinder, Rule};
use serde::{Deserialize, Serialize};
use std::time::Instant;
use utoipa::ToSchema;

pub const ADMIN_ROLE_NAME: &str = "administrator";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct ReconcileReport {
    /// Rules the graph holds after the pass.
    pub rules: usize,
    /// Edges the graph holds after the pass.
    pub edges: usize,
    pub rules_added: usize,
    pub edges_added: usize,
    pub rules_pruned: usize,
    pub edges_pruned: usize,
    /// Zero-id links dropped while deriving edges.
    pub skipped_links: usize,
    /// Stored resources with no usable rule (zero id, empty url or method).
    #[serde(default)]
    pub skipped_rules: usize,
}

#[derive(Clone)]
pub struct BootstrapReconciler {
    sync: SyncCoordinator,
}

impl BootstrapReconciler {
    pub fn new(sync: SyncCoordinator) -> Self {
        Self { sync }
    }

    pub async fn reconcile(&self, ctx: &SyncContext) -> SyncResult<ReconcileReport> {
        ctx.check()?;
        let _gate = self.sync.lock_graph().await;
        let started = Instant::now();
        let store = self.sync.store();
        let mut rules: Vec<Rule> = Vec::new();
        let mut edges: Vec<Edge> = Vec::new();
        let mut skipped_links = 0;
        let mut skipped_rules = 0;

        let resources = store.resource_rules().await?;
        for resource in &resources {
            match HierarchyBinder::rule(resource) {
                Ok(rule) => rules.push(rule),
                Err(err) => {
                    tracing::warn!(resource_id = resource.id, error = %err, "skipping resource without a usable rule");
                    skipped_rules += 1;
                }
            }
        }
        tracing::info!(count = resources.len(), "reconcile: resources loaded");

        let menus = store.menu_bindings().await?;
        skipped_links += collect_edges(&menus, &mut edges)?;
        tracing::info!(count = menus.len(), "reconcile: menus loaded");

        let buttons = store.button_bindings().await?;
        skipped_links += collect_edges(&buttons, &mut edges)?;
        tracing::info!(count = buttons.len(), "reconcile: buttons loaded");

        let roles = store.role_bindings().await?;
        skipped_links += collect_edges(&roles, &mut edges)?;
        tracing::info!(count = roles.len(), "reconcile: roles loaded");

        ctx.check()?;
        let outcome = self.sync.writer().reconcile(&rules, &edges).await?;
        let report = ReconcileReport {
            rules: rules.len(),
            edges: edges.len(),
            rules_added: outcome.rules_added,
            edges_added: outcome.edges_added,
            rules_pruned: outcome.rules_pruned,
            edges_pruned: outcome.edges_pruned,
            skipped_links,
            skipped_rules,
        };
        metrics::gauge!("artweb_policy_rules").set(report.rules as f64);
        tracing::info!(
            rules = report.rules,
            edges = report.edges,
            rules_pruned = report.rules_pruned,
            edges_pruned = report.edges_pruned,
            skipped_links,
            skipped_rules,
            elapsed_ms = started.elapsed().as_millis() as u64,
            trace_id = ctx.trace_id(),
            "policy graph reconciled"
        );
        Ok(report)
    }
}

fn collect_edges<B: Bindable>(entities: &[B], edges: &mut Vec<Edge>) -> SyncResult<usize> {
    let mut skipped = 0;
    for entity in entities {
        let bound = HierarchyBinder::edges(entity)?;
        for kind in &bound.skipped {
            tracing::warn!(subject = %bound.subject, linked_kind = %kind, "skipping link with zero id");
        }
        skipped += bound.skipped.len();
        edges.extend(bound.edges);
    }
    Ok(skipped)
}

/// Ensure the configured administrator exists as a staff user.
///
/// Returns the created user, or `None` when the username is already taken.
pub async fn seed_admin(
    ctx: &SyncContext,
    sync: &SyncCoordinator,
    seed: &AdminSeedConfig,
) -> SyncResult<Option<User>> {
    match sync.store().get_user_by_username(&seed.username).await {
        Ok(_) => return Ok(None),
        Err(StoreError::NotFound(_)) => {}
        Err(err) => return Err(err.into()),
    }

    let existing = sync
        .store()
        .list_roles(&ListQuery::default().with_filter("name", ADMIN_ROLE_NAME))
        .await?;
    let role = match existing.items.into_iter().next() {
        Some(role) => role,
        None => {
            sync.create_role(
                ctx,
                RoleInput {
                    name: ADMIN_ROLE_NAME.to_string(),
                    descr: "Seeded administrator role".to_string(),
                    resource_ids: None,
                    menu_ids: None,
                    button_ids: None,
                },
            )
            .await?
        }
    };

    let user = sync
        .create_user(
            ctx,
            UserCreateRequest {
                username: seed.username.clone(),
                password: seed.password.clone(),
                is_active: true,
                is_staff: true,
                role_id: role.id,
            },
        )
        .await
        .map_err(|err| match err {
            SyncError::Validation(message) => {
                SyncError::Validation(format!("admin seed rejected: {message}"))
            }
            other => other,
        })?;
    tracing::info!(username = %user.username, role_id = role.id, "administrator seeded");
    Ok(Some(user))
}
