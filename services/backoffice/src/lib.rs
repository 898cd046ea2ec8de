//! artweb backoffice service library crate.
//!
//! # Purpose
//! Exposes the admin API, the policy sync engine, configuration, and storage
//! backends for use by the binary and integration tests.
pub mod api;
pub mod app;
pub mod auth;
pub mod config;
pub mod model;
pub mod observability;
pub mod store;
