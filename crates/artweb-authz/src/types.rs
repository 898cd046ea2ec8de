use serde::{Deserialize, Serialize};

/// Direct grant `(subject, object, action)`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Rule {
    pub subject: String,
    pub object: String,
    pub action: String,
}

impl Rule {
    pub fn new(
        subject: impl Into<String>,
        object: impl Into<String>,
        action: impl Into<String>,
    ) -> Self {
        Self {
            subject: subject.into(),
            object: object.into(),
            action: action.into(),
        }
    }

    pub(crate) fn to_params(&self) -> Vec<String> {
        vec![
            self.subject.clone(),
            self.object.clone(),
            self.action.clone(),
        ]
    }
}

/// Inheritance relation: `child` inherits every rule reachable from `parent`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Edge {
    pub child: String,
    pub parent: String,
}

impl Edge {
    pub fn new(child: impl Into<String>, parent: impl Into<String>) -> Self {
        Self {
            child: child.into(),
            parent: parent.into(),
        }
    }

    pub(crate) fn to_params(&self) -> Vec<String> {
        vec![self.child.clone(), self.parent.clone()]
    }
}

/// Column of the grouping table a filtered removal matches on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EdgePosition {
    /// Edges where the subject is the inheriting side (its own outgoing links).
    Child,
    /// Edges where the subject is inherited from (other nodes depending on it).
    Parent,
}

impl EdgePosition {
    pub(crate) fn field_index(self) -> usize {
        match self {
            EdgePosition::Child => 0,
            EdgePosition::Parent => 1,
        }
    }
}

/// How much of a subject's neighbourhood is removed alongside it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cleanup {
    /// The subject is about to be re-asserted under the same id; inbound edges stay.
    Supersede,
    /// The subject is gone for good; inbound edges are purged too.
    Retire,
}

/// Minimal projection of a resource row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceRule {
    pub id: u32,
    pub url: String,
    pub method: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct MenuBinding {
    pub id: u32,
    pub parent_id: Option<u32>,
    pub resource_ids: Vec<u32>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ButtonBinding {
    pub id: u32,
    pub menu_id: u32,
    pub resource_ids: Vec<u32>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RoleBinding {
    pub id: u32,
    pub resource_ids: Vec<u32>,
    pub menu_ids: Vec<u32>,
    pub button_ids: Vec<u32>,
}

/// Counts produced by a full reconcile pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconcileOutcome {
    pub rules_added: usize,
    pub edges_added: usize,
    pub rules_pruned: usize,
    pub edges_pruned: usize,
}
