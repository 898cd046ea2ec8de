//! Authentication and authorization for the backoffice.
//!
//! # Purpose
//! Groups password hashing, access tokens, the login flow and its throttle,
//! the request authorization middleware, and the policy sync engine.
pub mod login;
pub mod middleware;
pub mod password;
pub mod rbac;
pub mod throttle;
pub mod token;
