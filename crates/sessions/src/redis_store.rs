//! Redis-backed sessions.
//!
//! Client construction is synchronous and performs no network I/O;
//! connections are obtained lazily per operation, so a dead Redis surfaces
//! as per-request session errors rather than a startup failure.

use std::time::Duration;

use redis::AsyncCommands;

use opsgate_core::RedisConfig;

use crate::error::SessionError;
use crate::session::SessionData;
use crate::sid::SessionId;

pub struct RedisStore {
    client: redis::Client,
}

impl RedisStore {
    pub fn open(cfg: &RedisConfig) -> Result<Self, SessionError> {
        let client = redis::Client::open(cfg.url())?;
        Ok(Self { client })
    }

    fn key(id: &SessionId) -> String {
        format!("sess:{id}")
    }

    pub async fn load(&self, id: &SessionId) -> Result<Option<SessionData>, SessionError> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let payload: Option<String> = conn.get(Self::key(id)).await?;
        match payload {
            Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
            None => Ok(None),
        }
    }

    pub async fn save(
        &self,
        id: &SessionId,
        data: &SessionData,
        ttl: Duration,
    ) -> Result<(), SessionError> {
        let payload = serde_json::to_string(data)?;
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        conn.set_ex::<_, _, ()>(Self::key(id), payload, ttl.as_secs().max(1))
            .await?;
        Ok(())
    }

    pub async fn destroy(&self, id: &SessionId) -> Result<(), SessionError> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        conn.del::<_, ()>(Self::key(id)).await?;
        Ok(())
    }
}
