//! Policy graph synchronization for admin entities.
//!
//! # Purpose
//! `sync` keeps the casbin graph in step with every relational write;
//! `bootstrap` rebuilds it from the store at boot and on operator request.
pub mod bootstrap;
pub mod placement;
pub mod sync;

/// Longest allowed menu chain, root included. Keeps every
/// role -> button -> menu* -> resource path under casbin's default
/// role hierarchy limit of 10 hops.
pub const MAX_MENU_DEPTH: usize = 6;
