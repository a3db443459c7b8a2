//! Cross-worker event bus.
//!
//! Named events with a JSON payload, broadcast to every subscribed worker.
//! Delivery is lossy for lagging subscribers; events are notifications, not
//! state transfer.

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClusterEvent {
    pub name: String,
    pub payload: serde_json::Value,
}

impl ClusterEvent {
    pub fn new(name: impl Into<String>, payload: serde_json::Value) -> Self {
        Self {
            name: name.into(),
            payload,
        }
    }
}

#[derive(Clone)]
pub struct ClusterBus {
    tx: broadcast::Sender<ClusterEvent>,
}

impl ClusterBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _rx) = broadcast::channel(capacity);
        Self { tx }
    }

    /// Emit an event to all current subscribers. Returns how many workers
    /// will observe it.
    pub fn emit(&self, name: impl Into<String>, payload: serde_json::Value) -> usize {
        self.tx
            .send(ClusterEvent::new(name, payload))
            .unwrap_or(0)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ClusterEvent> {
        self.tx.subscribe()
    }
}

impl Default for ClusterBus {
    fn default() -> Self {
        Self::new(256)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn events_reach_all_subscribers() {
        let bus = ClusterBus::new(8);
        let mut a = bus.subscribe();
        let mut b = bus.subscribe();

        let delivered = bus.emit("cache.invalidate", json!({"key": "k"}));
        assert_eq!(delivered, 2);

        let ev = a.recv().await.unwrap();
        assert_eq!(ev.name, "cache.invalidate");
        assert_eq!(ev.payload["key"], "k");
        assert_eq!(b.recv().await.unwrap(), ev);
    }

    #[test]
    fn emit_without_subscribers_is_a_no_op() {
        let bus = ClusterBus::new(8);
        assert_eq!(bus.emit("anything", json!(null)), 0);
    }
}
