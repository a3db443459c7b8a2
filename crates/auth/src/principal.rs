//! Authenticated identity.

use serde::{Deserialize, Serialize};

use opsgate_core::UserId;

use crate::roles::Role;

/// An authenticated identity restored from the session.
///
/// This is the shape persisted under the authenticator's session key, so it
/// stays serializable and free of transport concerns.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Principal {
    pub identifier: UserId,
    pub name: String,
    pub roles: Vec<Role>,
}

impl Principal {
    pub fn new(identifier: UserId, name: impl Into<String>, roles: Vec<Role>) -> Self {
        Self {
            identifier,
            name: name.into(),
            roles,
        }
    }

    pub fn has_role(&self, role: &str) -> bool {
        self.roles.iter().any(|r| r.as_str() == role)
    }
}
