//! Pure edge derivation for menus, buttons and roles.
//!
//! # Purpose
//! Turns an entity's parent link and association lists into the exact set of
//! grouping edges (and, for resources, the single rule) the policy graph must
//! hold for it. Nothing here touches the engine.
//!
//! # Key invariants
//! - The owning entity id must be non-zero.
//! - Linked ids equal to zero are dropped and reported back in `skipped`.
//! - Output order follows input order; duplicates are collapsed.
use crate::errors::{AuthzError, AuthzResult};
use crate::subject::{EntityKind, SubjectCodec};
use crate::types::{ButtonBinding, Edge, MenuBinding, ResourceRule, RoleBinding, Rule};
use std::collections::HashSet;

/// An entity that owns outgoing inheritance edges.
pub trait Bindable {
    fn kind(&self) -> EntityKind;
    fn id(&self) -> u32;
    /// Every `(kind, id)` this entity inherits from, in declaration order.
    fn links(&self) -> Vec<(EntityKind, u32)>;

    fn subject(&self) -> String {
        SubjectCodec::to_subject(self.kind(), self.id())
    }
}

impl Bindable for MenuBinding {
    fn kind(&self) -> EntityKind {
        EntityKind::Menu
    }

    fn id(&self) -> u32 {
        self.id
    }

    fn links(&self) -> Vec<(EntityKind, u32)> {
        let mut links = Vec::with_capacity(self.resource_ids.len() + 1);
        if let Some(parent_id) = self.parent_id {
            links.push((EntityKind::Menu, parent_id));
        }
        links.extend(
            self.resource_ids
                .iter()
                .map(|id| (EntityKind::Resource, *id)),
        );
        links
    }
}

impl Bindable for ButtonBinding {
    fn kind(&self) -> EntityKind {
        EntityKind::Button
    }

    fn id(&self) -> u32 {
        self.id
    }

    fn links(&self) -> Vec<(EntityKind, u32)> {
        let mut links = Vec::with_capacity(self.resource_ids.len() + 1);
        links.push((EntityKind::Menu, self.menu_id));
        links.extend(
            self.resource_ids
                .iter()
                .map(|id| (EntityKind::Resource, *id)),
        );
        links
    }
}

impl Bindable for RoleBinding {
    fn kind(&self) -> EntityKind {
        EntityKind::Role
    }

    fn id(&self) -> u32 {
        self.id
    }

    fn links(&self) -> Vec<(EntityKind, u32)> {
        self.resource_ids
            .iter()
            .map(|id| (EntityKind::Resource, *id))
            .chain(self.menu_ids.iter().map(|id| (EntityKind::Menu, *id)))
            .chain(self.button_ids.iter().map(|id| (EntityKind::Button, *id)))
            .collect()
    }
}

/// Edges derived for one entity, plus the zero-id links that were dropped.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BoundEdges {
    pub subject: String,
    pub edges: Vec<Edge>,
    pub skipped: Vec<EntityKind>,
}

pub struct HierarchyBinder;

impl HierarchyBinder {
    /// Build the direct rule for a resource.
    ///
    /// # Errors
    /// - `InvalidId` when `id == 0`.
    /// - `InvalidRule` when the url or method is empty.
    pub fn rule(resource: &ResourceRule) -> AuthzResult<Rule> {
        if resource.id == 0 {
            return Err(AuthzError::InvalidId {
                kind: EntityKind::Resource,
            });
        }
        if resource.url.trim().is_empty() {
            return Err(AuthzError::InvalidRule(format!(
                "resource {} has an empty url",
                resource.id
            )));
        }
        if resource.method.trim().is_empty() {
            return Err(AuthzError::InvalidRule(format!(
                "resource {} has an empty method",
                resource.id
            )));
        }
        Ok(Rule::new(
            SubjectCodec::resource(resource.id),
            resource.url.clone(),
            resource.method.clone(),
        ))
    }

    /// Build the outgoing edge set for a menu, button or role.
    ///
    /// # Errors
    /// - `InvalidId` when the owning entity id is zero.
    pub fn edges(entity: &impl Bindable) -> AuthzResult<BoundEdges> {
        if entity.id() == 0 {
            return Err(AuthzError::InvalidId {
                kind: entity.kind(),
            });
        }
        let subject = entity.subject();
        let mut seen = HashSet::new();
        let mut edges = Vec::new();
        let mut skipped = Vec::new();
        for (kind, id) in entity.links() {
            if id == 0 {
                skipped.push(kind);
                continue;
            }
            let parent = SubjectCodec::to_subject(kind, id);
            if seen.insert(parent.clone()) {
                edges.push(Edge::new(subject.clone(), parent));
            }
        }
        Ok(BoundEdges {
            subject,
            edges,
            skipped,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parents(bound: &BoundEdges) -> Vec<&str> {
        bound.edges.iter().map(|edge| edge.parent.as_str()).collect()
    }

    #[test]
    fn resource_rule_uses_url_and_method() {
        let rule = HierarchyBinder::rule(&ResourceRule {
            id: 1,
            url: "/x".to_string(),
            method: "GET".to_string(),
        })
        .expect("rule");
        assert_eq!(rule, Rule::new("perm_1", "/x", "GET"));
    }

    #[test]
    fn resource_rule_rejects_zero_id_and_empty_fields() {
        let zero = HierarchyBinder::rule(&ResourceRule {
            id: 0,
            url: "/x".to_string(),
            method: "GET".to_string(),
        });
        assert!(matches!(zero, Err(AuthzError::InvalidId { .. })));

        let empty_url = HierarchyBinder::rule(&ResourceRule {
            id: 1,
            url: String::new(),
            method: "GET".to_string(),
        });
        assert!(matches!(empty_url, Err(AuthzError::InvalidRule(_))));

        let empty_method = HierarchyBinder::rule(&ResourceRule {
            id: 1,
            url: "/x".to_string(),
            method: " ".to_string(),
        });
        assert!(matches!(empty_method, Err(AuthzError::InvalidRule(_))));
    }

    #[test]
    fn menu_edges_include_parent_then_resources() {
        let bound = HierarchyBinder::edges(&MenuBinding {
            id: 4,
            parent_id: Some(2),
            resource_ids: vec![1, 3],
        })
        .expect("edges");
        assert_eq!(bound.subject, "menu_4");
        assert_eq!(parents(&bound), vec!["menu_2", "perm_1", "perm_3"]);
        assert!(bound.edges.iter().all(|edge| edge.child == "menu_4"));
    }

    #[test]
    fn root_menu_has_only_resource_edges() {
        let bound = HierarchyBinder::edges(&MenuBinding {
            id: 2,
            parent_id: None,
            resource_ids: vec![1],
        })
        .expect("edges");
        assert_eq!(parents(&bound), vec!["perm_1"]);
    }

    #[test]
    fn button_edges_point_at_menu_and_resources() {
        let bound = HierarchyBinder::edges(&ButtonBinding {
            id: 5,
            menu_id: 2,
            resource_ids: vec![7],
        })
        .expect("edges");
        assert_eq!(parents(&bound), vec!["menu_2", "perm_7"]);
    }

    #[test]
    fn role_edges_cover_every_association() {
        let bound = HierarchyBinder::edges(&RoleBinding {
            id: 3,
            resource_ids: vec![1],
            menu_ids: vec![2],
            button_ids: vec![5],
        })
        .expect("edges");
        assert_eq!(parents(&bound), vec!["perm_1", "menu_2", "button_5"]);
    }

    #[test]
    fn zero_links_are_skipped_and_reported() {
        let bound = HierarchyBinder::edges(&RoleBinding {
            id: 3,
            resource_ids: vec![0, 1],
            menu_ids: vec![0],
            button_ids: vec![],
        })
        .expect("edges");
        assert_eq!(parents(&bound), vec!["perm_1"]);
        assert_eq!(bound.skipped, vec![EntityKind::Resource, EntityKind::Menu]);
    }

    #[test]
    fn duplicate_links_collapse() {
        let bound = HierarchyBinder::edges(&MenuBinding {
            id: 2,
            parent_id: None,
            resource_ids: vec![1, 1, 1],
        })
        .expect("edges");
        assert_eq!(bound.edges.len(), 1);
    }

    #[test]
    fn zero_owner_is_rejected() {
        let err = HierarchyBinder::edges(&ButtonBinding {
            id: 0,
            menu_id: 1,
            resource_ids: vec![],
        })
        .expect_err("zero id");
        assert!(matches!(
            err,
            AuthzError::InvalidId {
                kind: EntityKind::Button
            }
        ));
    }
}
