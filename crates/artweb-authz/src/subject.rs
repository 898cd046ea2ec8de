//! Graph-node naming for admin entities.
//!
//! Every resource, menu, button and role maps to exactly one subject string of
//! the form `<prefix>_<id>`. The prefixes are part of the persisted grouping
//! data format and must not change.
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Resource,
    Menu,
    Button,
    Role,
}

impl EntityKind {
    pub fn prefix(self) -> &'static str {
        match self {
            EntityKind::Resource => "perm",
            EntityKind::Menu => "menu",
            EntityKind::Button => "button",
            EntityKind::Role => "role",
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            EntityKind::Resource => "resource",
            EntityKind::Menu => "menu",
            EntityKind::Button => "button",
            EntityKind::Role => "role",
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Deterministic `(kind, id)` to subject mapping.
///
/// No decode direction exists; subjects are only ever produced, compared and
/// handed to the policy engine. Callers reject `id == 0` before encoding.
pub struct SubjectCodec;

impl SubjectCodec {
    pub fn to_subject(kind: EntityKind, id: u32) -> String {
        format!("{}_{}", kind.prefix(), id)
    }

    pub fn resource(id: u32) -> String {
        Self::to_subject(EntityKind::Resource, id)
    }

    pub fn menu(id: u32) -> String {
        Self::to_subject(EntityKind::Menu, id)
    }

    pub fn button(id: u32) -> String {
        Self::to_subject(EntityKind::Button, id)
    }

    pub fn role(id: u32) -> String {
        Self::to_subject(EntityKind::Role, id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn subjects_match_wire_format() {
        assert_eq!(SubjectCodec::resource(1), "perm_1");
        assert_eq!(SubjectCodec::menu(22), "menu_22");
        assert_eq!(SubjectCodec::button(7), "button_7");
        assert_eq!(SubjectCodec::role(3), "role_3");
    }

    #[test]
    fn kinds_never_collide_for_same_id() {
        let kinds = [
            EntityKind::Resource,
            EntityKind::Menu,
            EntityKind::Button,
            EntityKind::Role,
        ];
        let subjects: HashSet<String> = kinds
            .iter()
            .map(|kind| SubjectCodec::to_subject(*kind, 42))
            .collect();
        assert_eq!(subjects.len(), kinds.len());
    }

    #[test]
    fn encoding_is_deterministic() {
        assert_eq!(
            SubjectCodec::to_subject(EntityKind::Menu, 9),
            SubjectCodec::to_subject(EntityKind::Menu, 9)
        );
    }
}
