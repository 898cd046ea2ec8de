//! Process-wide policy graph owned behind one read/write lock.
//!
//! # Purpose and responsibility
//! Wraps a casbin `Enforcer` (embedded model, memory adapter, never persisted)
//! and exposes the rule/edge primitives the sync layer composes.
//!
//! # Key invariants and assumptions
//! - Every mutation holds the write lock for its whole duration, including the
//!   composite operations (`apply_edges`, `rebind`, `replace_rule`,
//!   `reconcile`). Concurrent logical operations never interleave.
//! - Evaluation and listing take the read lock.
//! - Adding a present item or removing an absent one is not an error.
use crate::casbin_model::casbin_model;
use crate::errors::{AuthzError, AuthzResult};
use crate::types::{Edge, EdgePosition, ReconcileOutcome, Rule};
use casbin::{CoreApi, Enforcer, MemoryAdapter, MgmtApi};
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::RwLock;

#[derive(Clone)]
pub struct PolicyStore {
    enforcer: Arc<RwLock<Enforcer>>,
}

impl PolicyStore {
    /// Build an empty graph from the embedded model.
    ///
    /// # Errors
    /// - Returns `AuthzError::Engine` if the model or enforcer cannot be built.
    pub async fn new() -> AuthzResult<Self> {
        let model = casbin_model().await?;
        let adapter = MemoryAdapter::default();
        let enforcer = Enforcer::new(model, adapter)
            .await
            .map_err(AuthzError::engine("build enforcer"))?;
        Ok(Self {
            enforcer: Arc::new(RwLock::new(enforcer)),
        })
    }

    pub async fn add_rule(&self, rule: &Rule) -> AuthzResult<bool> {
        validate_rule(rule)?;
        let mut enforcer = self.enforcer.write().await;
        add_rule_locked(&mut enforcer, rule).await
    }

    pub async fn remove_rule(&self, rule: &Rule) -> AuthzResult<bool> {
        validate_rule(rule)?;
        let mut enforcer = self.enforcer.write().await;
        remove_rule_locked(&mut enforcer, rule).await
    }

    /// Swap one rule for another under a single lock hold.
    pub async fn replace_rule(&self, old: &Rule, new: &Rule) -> AuthzResult<()> {
        validate_rule(old)?;
        validate_rule(new)?;
        let mut enforcer = self.enforcer.write().await;
        remove_rule_locked(&mut enforcer, old).await?;
        add_rule_locked(&mut enforcer, new).await?;
        Ok(())
    }

    pub async fn add_edge(&self, edge: &Edge) -> AuthzResult<bool> {
        validate_edge(edge)?;
        let mut enforcer = self.enforcer.write().await;
        add_edge_locked(&mut enforcer, edge).await
    }

    /// Add every edge of one logical operation; returns how many were new.
    pub async fn apply_edges(&self, edges: &[Edge]) -> AuthzResult<usize> {
        for edge in edges {
            validate_edge(edge)?;
        }
        let mut enforcer = self.enforcer.write().await;
        let mut added = 0;
        for edge in edges {
            if add_edge_locked(&mut enforcer, edge).await? {
                added += 1;
            }
        }
        Ok(added)
    }

    pub async fn remove_edge(&self, edge: &Edge) -> AuthzResult<bool> {
        validate_edge(edge)?;
        let mut enforcer = self.enforcer.write().await;
        let removed = enforcer
            .remove_grouping_policy(edge.to_params())
            .await
            .map_err(AuthzError::engine(format!(
                "remove edge {} -> {}",
                edge.child, edge.parent
            )))?;
        if removed {
            rebuild_links(&mut enforcer)?;
        }
        Ok(removed)
    }

    /// Remove every edge whose `position` column equals `subject`.
    pub async fn remove_edges(&self, position: EdgePosition, subject: &str) -> AuthzResult<bool> {
        if subject.is_empty() {
            return Err(AuthzError::InvalidEdge("empty subject".to_string()));
        }
        let mut enforcer = self.enforcer.write().await;
        remove_edges_locked(&mut enforcer, position, subject).await
    }

    /// Replace a subject's outgoing edges: drop its child-side edges, then add
    /// `edges`. Inbound edges are untouched.
    pub async fn rebind(&self, subject: &str, edges: &[Edge]) -> AuthzResult<usize> {
        if subject.is_empty() {
            return Err(AuthzError::InvalidEdge("empty subject".to_string()));
        }
        for edge in edges {
            validate_edge(edge)?;
            if edge.child != subject {
                return Err(AuthzError::InvalidEdge(format!(
                    "edge child {} does not match {subject}",
                    edge.child
                )));
            }
        }
        let mut enforcer = self.enforcer.write().await;
        remove_edges_locked(&mut enforcer, EdgePosition::Child, subject).await?;
        let mut added = 0;
        for edge in edges {
            if add_edge_locked(&mut enforcer, edge).await? {
                added += 1;
            }
        }
        Ok(added)
    }

    /// Make the graph hold exactly `rules` and `edges`.
    ///
    /// Desired items are added first, then anything else present is pruned.
    pub async fn reconcile(&self, rules: &[Rule], edges: &[Edge]) -> AuthzResult<ReconcileOutcome> {
        for rule in rules {
            validate_rule(rule)?;
        }
        for edge in edges {
            validate_edge(edge)?;
        }
        let mut enforcer = self.enforcer.write().await;
        let mut outcome = ReconcileOutcome::default();

        for rule in rules {
            if add_rule_locked(&mut enforcer, rule).await? {
                outcome.rules_added += 1;
            }
        }
        for edge in edges {
            if add_edge_locked(&mut enforcer, edge).await? {
                outcome.edges_added += 1;
            }
        }

        let desired_rules: HashSet<Vec<String>> = rules.iter().map(Rule::to_params).collect();
        let stale_rules: Vec<Vec<String>> = enforcer
            .get_policy()
            .into_iter()
            .filter(|params| !desired_rules.contains(params))
            .collect();
        for params in stale_rules {
            let removed = enforcer
                .remove_policy(params.clone())
                .await
                .map_err(AuthzError::engine(format!("prune rule {}", params.join(", "))))?;
            if removed {
                outcome.rules_pruned += 1;
            }
        }

        let desired_edges: HashSet<Vec<String>> = edges.iter().map(Edge::to_params).collect();
        let stale_edges: Vec<Vec<String>> = enforcer
            .get_grouping_policy()
            .into_iter()
            .filter(|params| !desired_edges.contains(params))
            .collect();
        for params in stale_edges {
            let removed = enforcer
                .remove_grouping_policy(params.clone())
                .await
                .map_err(AuthzError::engine(format!("prune edge {}", params.join(" -> "))))?;
            if removed {
                outcome.edges_pruned += 1;
            }
        }
        if outcome.edges_pruned > 0 {
            rebuild_links(&mut enforcer)?;
        }
        Ok(outcome)
    }

    /// True iff some rule `(p, object, action)` exists with `p` reachable
    /// from `subject` in zero or more edge hops.
    pub async fn evaluate(&self, subject: &str, object: &str, action: &str) -> AuthzResult<bool> {
        let enforcer = self.enforcer.read().await;
        enforcer
            .enforce((subject, object, action))
            .map_err(AuthzError::engine(format!(
                "evaluate {subject}, {object}, {action}"
            )))
    }

    pub async fn rules(&self) -> Vec<Rule> {
        let enforcer = self.enforcer.read().await;
        let mut rules: Vec<Rule> = enforcer
            .get_policy()
            .into_iter()
            .filter_map(|params| match params.as_slice() {
                [subject, object, action, ..] => {
                    Some(Rule::new(subject.clone(), object.clone(), action.clone()))
                }
                _ => None,
            })
            .collect();
        rules.sort();
        rules
    }

    pub async fn edges(&self) -> Vec<Edge> {
        let enforcer = self.enforcer.read().await;
        let mut edges: Vec<Edge> = enforcer
            .get_grouping_policy()
            .into_iter()
            .filter_map(|params| match params.as_slice() {
                [child, parent, ..] => Some(Edge::new(child.clone(), parent.clone())),
                _ => None,
            })
            .collect();
        edges.sort();
        edges
    }
}

fn validate_rule(rule: &Rule) -> AuthzResult<()> {
    if rule.subject.is_empty() || rule.object.is_empty() || rule.action.is_empty() {
        return Err(AuthzError::InvalidRule(format!(
            "({}, {}, {}) has an empty field",
            rule.subject, rule.object, rule.action
        )));
    }
    Ok(())
}

fn validate_edge(edge: &Edge) -> AuthzResult<()> {
    if edge.child.is_empty() || edge.parent.is_empty() {
        return Err(AuthzError::InvalidEdge(format!(
            "{} -> {} has an empty side",
            edge.child, edge.parent
        )));
    }
    Ok(())
}

async fn add_rule_locked(enforcer: &mut Enforcer, rule: &Rule) -> AuthzResult<bool> {
    let added = enforcer
        .add_policy(rule.to_params())
        .await
        .map_err(AuthzError::engine(format!(
            "add rule {}, {}, {}",
            rule.subject, rule.object, rule.action
        )))?;
    tracing::debug!(
        subject = %rule.subject,
        object = %rule.object,
        action = %rule.action,
        added,
        "policy rule added"
    );
    Ok(added)
}

async fn remove_rule_locked(enforcer: &mut Enforcer, rule: &Rule) -> AuthzResult<bool> {
    let removed = enforcer
        .remove_policy(rule.to_params())
        .await
        .map_err(AuthzError::engine(format!(
            "remove rule {}, {}, {}",
            rule.subject, rule.object, rule.action
        )))?;
    tracing::debug!(
        subject = %rule.subject,
        object = %rule.object,
        action = %rule.action,
        removed,
        "policy rule removed"
    );
    Ok(removed)
}

async fn add_edge_locked(enforcer: &mut Enforcer, edge: &Edge) -> AuthzResult<bool> {
    let added = enforcer
        .add_grouping_policy(edge.to_params())
        .await
        .map_err(AuthzError::engine(format!(
            "add edge {} -> {}",
            edge.child, edge.parent
        )))?;
    tracing::debug!(child = %edge.child, parent = %edge.parent, added, "policy edge added");
    Ok(added)
}

async fn remove_edges_locked(
    enforcer: &mut Enforcer,
    position: EdgePosition,
    subject: &str,
) -> AuthzResult<bool> {
    let removed = enforcer
        .remove_filtered_grouping_policy(position.field_index(), vec![subject.to_string()])
        .await
        .map_err(AuthzError::engine(format!(
            "remove edges at {position:?} = {subject}"
        )))?;
    if removed {
        rebuild_links(enforcer)?;
    }
    tracing::debug!(subject, ?position, removed, "policy edges removed");
    Ok(removed)
}

// Role links are recomputed from the grouping table after removals.
fn rebuild_links(enforcer: &mut Enforcer) -> AuthzResult<()> {
    enforcer
        .build_role_links()
        .map_err(AuthzError::engine("rebuild role links"))
}
