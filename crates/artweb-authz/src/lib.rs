//! Policy graph primitives for the artweb admin backend.
//!
//! # Purpose
//! Owns the authorization graph that mirrors the relational hierarchy
//! `resource -> menu -> button -> role`: subject naming, pure edge derivation
//! and the locked casbin-backed store those edges are applied to.
//!
//! # How it fits
//! The backoffice service persists rows first, then asks [`HierarchyBinder`]
//! for the rule/edge set of the written entity and applies it through
//! [`PolicyStore`]. At boot the same binder output is reconciled wholesale.
//!
//! # Key invariants
//! - Subjects are `perm_<id>`, `menu_<id>`, `button_<id>` and `role_<id>`.
//! - One rule per resource: `(perm_<id>, url, method)`.
//! - Edge direction is child -> parent; a child inherits all rules reachable
//!   from its parents.
//!
//! # Examples
//! ```rust
//! use artweb_authz::{EntityKind, SubjectCodec};
//!
//! assert_eq!(SubjectCodec::to_subject(EntityKind::Role, 3), "role_3");
//! ```

mod binder;
mod casbin_model;
mod errors;
mod policy_store;
mod subject;
mod types;
mod writer;

pub use binder::{Bindable, BoundEdges, HierarchyBinder};
pub use casbin_model::{casbin_model, casbin_model_string};
pub use errors::{AuthzError, AuthzResult};
pub use policy_store::PolicyStore;
pub use subject::{EntityKind, SubjectCodec};
pub use types::{
    ButtonBinding, Cleanup, Edge, EdgePosition, MenuBinding, ReconcileOutcome, ResourceRule,
    RoleBinding, Rule,
};
pub use writer::PolicyWriter;
