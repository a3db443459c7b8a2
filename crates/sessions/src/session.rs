//! The live session object attached to one request.

use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};

use serde_json::Value;

use crate::sid::SessionId;

/// Persisted session payload: a flat JSON map.
pub type SessionData = serde_json::Map<String, Value>;

/// Handle to one request's session.
///
/// Cheap to clone; the session middleware inserts it as a request extension
/// and writes it back to the store after the response only if something
/// actually changed.
#[derive(Clone)]
pub struct Session {
    inner: Arc<Inner>,
}

struct Inner {
    id: SessionId,
    fresh: bool,
    data: Mutex<SessionData>,
    dirty: AtomicBool,
}

impl Session {
    pub fn new(id: SessionId, data: SessionData, fresh: bool) -> Self {
        Self {
            inner: Arc::new(Inner {
                id,
                fresh,
                data: Mutex::new(data),
                dirty: AtomicBool::new(false),
            }),
        }
    }

    /// A session that did not exist in the store before this request.
    pub fn fresh() -> Self {
        Self::new(SessionId::new(), SessionData::new(), true)
    }

    pub fn id(&self) -> SessionId {
        self.inner.id
    }

    pub fn is_fresh(&self) -> bool {
        self.inner.fresh
    }

    pub fn is_dirty(&self) -> bool {
        self.inner.dirty.load(Ordering::Acquire)
    }

    pub fn get(&self, key: &str) -> Option<Value> {
        self.inner.data.lock().unwrap().get(key).cloned()
    }

    pub fn insert(&self, key: impl Into<String>, value: Value) {
        self.inner.data.lock().unwrap().insert(key.into(), value);
        self.inner.dirty.store(true, Ordering::Release);
    }

    pub fn remove(&self, key: &str) -> Option<Value> {
        let removed = self.inner.data.lock().unwrap().remove(key);
        if removed.is_some() {
            self.inner.dirty.store(true, Ordering::Release);
        }
        removed
    }

    pub fn clear(&self) {
        self.inner.data.lock().unwrap().clear();
        self.inner.dirty.store(true, Ordering::Release);
    }

    /// Copy of the current payload, for persistence.
    pub fn snapshot(&self) -> SessionData {
        self.inner.data.lock().unwrap().clone()
    }
}
