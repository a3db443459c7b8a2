//! Shared-state service handed to every worker.

use std::sync::Arc;

use crate::bus::{ClusterBus, ClusterEvent};
use crate::cache::AppCache;

/// Injected shared state: the application cache plus the cluster event bus.
///
/// Constructed and initialized by the controller; workers receive clones and
/// must treat the cache as read-mostly.
#[derive(Clone)]
pub struct SharedState {
    pub cache: Arc<AppCache>,
    pub bus: ClusterBus,
}

impl SharedState {
    pub fn new() -> Self {
        Self {
            cache: Arc::new(AppCache::new()),
            bus: ClusterBus::default(),
        }
    }

    /// Worker-side event dispatch. Unknown events are logged and dropped;
    /// the bus carries notifications only.
    pub fn handle_event(&self, event: &ClusterEvent) {
        match event.name.as_str() {
            "cache.invalidate" => {
                if let Some(key) = event.payload.get("key").and_then(|v| v.as_str()) {
                    self.cache.invalidate(key);
                }
            }
            "cache.put" => {
                if let (Some(key), Some(value)) = (
                    event.payload.get("key").and_then(|v| v.as_str()),
                    event.payload.get("value"),
                ) {
                    self.cache.put(key, value.clone());
                }
            }
            other => {
                tracing::debug!(event = other, "unhandled cluster event");
            }
        }
    }
}

impl Default for SharedState {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn invalidate_event_evicts_cache_entries() {
        let state = SharedState::new();
        state.cache.put("roles", json!(["admin"]));

        state.handle_event(&ClusterEvent::new("cache.invalidate", json!({"key": "roles"})));
        assert_eq!(state.cache.get("roles"), None);
    }

    #[test]
    fn put_event_updates_cache() {
        let state = SharedState::new();
        state.handle_event(&ClusterEvent::new(
            "cache.put",
            json!({"key": "flag", "value": true}),
        ));
        assert_eq!(state.cache.get("flag"), Some(json!(true)));
    }

    #[test]
    fn unknown_events_are_ignored() {
        let state = SharedState::new();
        state.handle_event(&ClusterEvent::new("totally.unknown", json!({})));
        assert!(state.cache.is_empty());
    }
}
