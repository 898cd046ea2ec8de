//! Mutation seam between the sync layer and the policy graph.
//!
//! [`PolicyStore`] is the only production implementation. The trait exists so
//! callers can hold `Arc<dyn PolicyWriter>` and substitute a backend whose
//! edits fail, which is how post-commit divergence is exercised.
use crate::errors::AuthzResult;
use crate::policy_store::PolicyStore;
use crate::types::{Edge, EdgePosition, ReconcileOutcome, Rule};
use async_trait::async_trait;

#[async_trait]
pub trait PolicyWriter: Send + Sync {
    async fn add_rule(&self, rule: &Rule) -> AuthzResult<bool>;
    async fn remove_rule(&self, rule: &Rule) -> AuthzResult<bool>;
    async fn replace_rule(&self, old: &Rule, new: &Rule) -> AuthzResult<()>;
    async fn apply_edges(&self, edges: &[Edge]) -> AuthzResult<usize>;
    async fn remove_edges(&self, position: EdgePosition, subject: &str) -> AuthzResult<bool>;
    async fn rebind(&self, subject: &str, edges: &[Edge]) -> AuthzResult<usize>;
    async fn reconcile(&self, rules: &[Rule], edges: &[Edge]) -> AuthzResult<ReconcileOutcome>;
}

#[async_trait]
impl PolicyWriter for PolicyStore {
    async fn add_rule(&self, rule: &Rule) -> AuthzResult<bool> {
        PolicyStore::add_rule(self, rule).await
    }

    async fn remove_rule(&self, rule: &Rule) -> AuthzResult<bool> {
        PolicyStore::remove_rule(self, rule).await
    }

    async fn replace_rule(&self, old: &Rule, new: &Rule) -> AuthzResult<()> {
        PolicyStore::replace_rule(self, old, new).await
    }

    async fn apply_edges(&self, edges: &[Edge]) -> AuthzResult<usize> {
        PolicyStore::apply_edges(self, edges).await
    }

    async fn remove_edges(&self, position: EdgePosition, subject: &str) -> AuthzResult<bool> {
        PolicyStore::remove_edges(self, position, subject).await
    }

    async fn rebind(&self, subject: &str, edges: &[Edge]) -> AuthzResult<usize> {
        PolicyStore::rebind(self, subject, edges).await
    }

    async fn reconcile(&self, rules: &[Rule], edges: &[Edge]) -> AuthzResult<ReconcileOutcome> {
        PolicyStore::reconcile(self, rules, edges).await
    }
}
