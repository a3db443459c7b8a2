//! Application-wide in-memory cache.
//!
//! Initialized once by the controller before any worker forks; workers read
//! and write through the same handle. Invalidation across processes arrives
//! over the cluster bus (see [`crate::state::SharedState::handle_event`]).

use std::collections::HashMap;
use std::sync::RwLock;

use serde_json::Value;

pub struct AppCache {
    entries: RwLock<HashMap<String, Value>>,
}

impl AppCache {
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
        }
    }

    /// Controller-side initialization phase: seed the cache before workers
    /// start serving.
    pub fn initialize(&self, seed: impl IntoIterator<Item = (String, Value)>) {
        let mut entries = self.entries.write().unwrap();
        entries.extend(seed);
    }

    pub fn get(&self, key: &str) -> Option<Value> {
        self.entries.read().unwrap().get(key).cloned()
    }

    pub fn put(&self, key: impl Into<String>, value: Value) {
        self.entries.write().unwrap().insert(key.into(), value);
    }

    pub fn invalidate(&self, key: &str) -> bool {
        self.entries.write().unwrap().remove(key).is_some()
    }

    pub fn len(&self) -> usize {
        self.entries.read().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for AppCache {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn seed_then_read() {
        let cache = AppCache::new();
        cache.initialize([("app.name".to_string(), json!("opsgate"))]);
        assert_eq!(cache.get("app.name"), Some(json!("opsgate")));
        assert_eq!(cache.get("missing"), None);
    }

    #[test]
    fn invalidate_removes_exactly_one_key() {
        let cache = AppCache::new();
        cache.put("a", json!(1));
        cache.put("b", json!(2));

        assert!(cache.invalidate("a"));
        assert!(!cache.invalidate("a"));
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.get("b"), Some(json!(2)));
    }
}
