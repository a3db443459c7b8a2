//! Session-backed authentication.
//!
//! The authenticator does not implement login strategies; it persists and
//! restores an already-established identity through the session, the way the
//! session middleware hands it out.

use thiserror::Error;

use opsgate_sessions::Session;

use crate::principal::Principal;

const SESSION_USER_KEY: &str = "auth.user";

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("identity payload: {0}")]
    Codec(#[from] serde_json::Error),
}

/// Persistent-login glue between principals and sessions.
pub struct Authenticator {
    _private: (),
}

impl Authenticator {
    pub fn new() -> Self {
        Self { _private: () }
    }

    /// Persist an identity into the session (persistent login).
    pub fn sign_in(&self, session: &Session, principal: &Principal) -> Result<(), AuthError> {
        session.insert(SESSION_USER_KEY, serde_json::to_value(principal)?);
        Ok(())
    }

    /// Restore the identity for this request, if one was established.
    ///
    /// A payload that fails to decode is treated as no identity; a stale
    /// shape from an older deployment must not break request handling.
    pub fn restore(&self, session: &Session) -> Option<Principal> {
        let value = session.get(SESSION_USER_KEY)?;
        match serde_json::from_value(value) {
            Ok(principal) => Some(principal),
            Err(err) => {
                tracing::warn!("discarding undecodable session identity: {err}");
                None
            }
        }
    }

    pub fn sign_out(&self, session: &Session) {
        session.remove(SESSION_USER_KEY);
    }
}

impl Default for Authenticator {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::roles::Role;
    use opsgate_core::UserId;
    use serde_json::json;

    #[test]
    fn sign_in_restore_round_trip() {
        let auth = Authenticator::new();
        let session = Session::fresh();
        let principal = Principal::new(UserId::new(), "amara", vec![Role::new("admin")]);

        auth.sign_in(&session, &principal).unwrap();
        assert_eq!(auth.restore(&session), Some(principal));
        assert!(session.is_dirty());
    }

    #[test]
    fn sign_out_clears_identity() {
        let auth = Authenticator::new();
        let session = Session::fresh();
        auth.sign_in(
            &session,
            &Principal::new(UserId::new(), "amara", vec![]),
        )
        .unwrap();

        auth.sign_out(&session);
        assert_eq!(auth.restore(&session), None);
    }

    #[test]
    fn corrupt_identity_payload_is_ignored() {
        let auth = Authenticator::new();
        let session = Session::fresh();
        session.insert("auth.user", json!("not-a-principal"));
        assert_eq!(auth.restore(&session), None);
    }
}
