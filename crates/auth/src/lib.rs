//! `opsgate-auth` — authentication and role-based access control.
//!
//! This crate is intentionally decoupled from HTTP: it speaks in principals,
//! roles, and actions. The API layer turns its decisions into responses.

pub mod access;
pub mod authenticator;
pub mod principal;
pub mod roles;

pub use access::AccessControl;
pub use authenticator::{AuthError, Authenticator};
pub use principal::Principal;
pub use roles::Role;
