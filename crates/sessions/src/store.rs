//! Session store selection and the common persistence API.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use opsgate_core::{Config, SessionStoreKind};

use crate::error::SessionError;
use crate::mongo::MongoStore;
use crate::redis_store::RedisStore;
use crate::session::SessionData;
use crate::sid::SessionId;

/// The selected session backend, constructed once per worker.
///
/// Construction cost differs by backend and that difference is load-bearing:
/// the Mongo variant performs network I/O (client + ping) before `connect`
/// returns, so callers that sequence middleware registration after `connect`
/// get the "do not register until the store is ready" guarantee. Redis and
/// memory construction never touch the network.
pub enum SessionStore {
    Memory(MemoryStore),
    Redis(RedisStore),
    Mongo(MongoStore),
}

impl SessionStore {
    /// Build the store selected by `SESSION_STORE_TYPE`.
    pub async fn connect(cfg: &Config) -> Result<Self, SessionError> {
        match cfg.session_store {
            SessionStoreKind::Mongo => {
                let url = cfg
                    .mongo_session_url
                    .as_deref()
                    .ok_or(SessionError::MissingMongoUrl)?;
                Ok(SessionStore::Mongo(MongoStore::connect(url).await?))
            }
            SessionStoreKind::Redis => Ok(SessionStore::Redis(RedisStore::open(&cfg.redis)?)),
            SessionStoreKind::Memory => Ok(SessionStore::Memory(MemoryStore::new())),
        }
    }

    pub fn kind(&self) -> SessionStoreKind {
        match self {
            SessionStore::Memory(_) => SessionStoreKind::Memory,
            SessionStore::Redis(_) => SessionStoreKind::Redis,
            SessionStore::Mongo(_) => SessionStoreKind::Mongo,
        }
    }

    pub async fn load(&self, id: &SessionId) -> Result<Option<SessionData>, SessionError> {
        match self {
            SessionStore::Memory(s) => Ok(s.load(id)),
            SessionStore::Redis(s) => s.load(id).await,
            SessionStore::Mongo(s) => s.load(id).await,
        }
    }

    pub async fn save(
        &self,
        id: &SessionId,
        data: &SessionData,
        ttl: Duration,
    ) -> Result<(), SessionError> {
        match self {
            SessionStore::Memory(s) => {
                s.save(id, data, ttl);
                Ok(())
            }
            SessionStore::Redis(s) => s.save(id, data, ttl).await,
            SessionStore::Mongo(s) => s.save(id, data, ttl).await,
        }
    }

    pub async fn destroy(&self, id: &SessionId) -> Result<(), SessionError> {
        match self {
            SessionStore::Memory(s) => {
                s.destroy(id);
                Ok(())
            }
            SessionStore::Redis(s) => s.destroy(id).await,
            SessionStore::Mongo(s) => s.destroy(id).await,
        }
    }
}

/// Framework-internal in-memory sessions (the default backend).
///
/// Per-worker only: workers do not share memory, so a client pinned to a
/// different worker starts over. Acceptable for dev and single-worker runs.
pub struct MemoryStore {
    entries: Mutex<HashMap<SessionId, (SessionData, Instant)>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
        }
    }

    fn load(&self, id: &SessionId) -> Option<SessionData> {
        let mut entries = self.entries.lock().unwrap();
        match entries.get(id) {
            Some((data, expires)) if *expires > Instant::now() => Some(data.clone()),
            Some(_) => {
                entries.remove(id);
                None
            }
            None => None,
        }
    }

    fn save(&self, id: &SessionId, data: &SessionData, ttl: Duration) {
        let now = Instant::now();
        let mut entries = self.entries.lock().unwrap();
        // Sweep on write so abandoned sessions cannot accumulate forever.
        entries.retain(|_, (_, expires)| *expires > now);
        entries.insert(*id, (data.clone(), now + ttl));
    }

    fn destroy(&self, id: &SessionId) {
        self.entries.lock().unwrap().remove(id);
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}
