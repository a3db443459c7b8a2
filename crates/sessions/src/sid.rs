//! Session identifiers and the signed cookie encoding.
//!
//! The cookie value is `<uuid>.<base64url(hmac-sha256(uuid, secret))>`. A
//! value whose signature does not verify is treated as no cookie at all, so a
//! tampered client silently starts a fresh session.

use core::str::FromStr;

use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use uuid::Uuid;

type HmacSha256 = Hmac<Sha256>;

/// Identifier of one session.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(Uuid);

impl SessionId {
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl core::fmt::Display for SessionId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

impl FromStr for SessionId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(Uuid::from_str(s)?))
    }
}

/// HMAC key derived from the configured session secret.
#[derive(Clone)]
pub struct SessionKey(Vec<u8>);

impl SessionKey {
    pub fn new(secret: &str) -> Self {
        Self(secret.as_bytes().to_vec())
    }

    /// Encode a session id as a signed cookie value.
    pub fn sign(&self, id: &SessionId) -> String {
        let id = id.to_string();
        let mut mac =
            HmacSha256::new_from_slice(&self.0).expect("HMAC can take key of any size");
        mac.update(id.as_bytes());
        let tag = URL_SAFE_NO_PAD.encode(mac.finalize().into_bytes());
        format!("{id}.{tag}")
    }

    /// Decode and verify a cookie value. Returns `None` for malformed values
    /// and for signature mismatches alike.
    pub fn verify(&self, value: &str) -> Option<SessionId> {
        let (id, tag) = value.split_once('.')?;
        let parsed: SessionId = id.parse().ok()?;
        let tag = URL_SAFE_NO_PAD.decode(tag).ok()?;

        let mut mac =
            HmacSha256::new_from_slice(&self.0).expect("HMAC can take key of any size");
        mac.update(id.as_bytes());
        mac.verify_slice(&tag).ok()?;
        Some(parsed)
    }
}
