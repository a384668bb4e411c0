//! Dual-store sync — keep the mirror store trailing the backend
//!
//! ```text
//! SyncWorker
//!   ├── Startup: full resync (every collection, wholesale overwrite)
//!   ├── Listen: ChangeFeed broadcast → debounced incremental upserts
//!   ├── Periodic: full resync on a timer (safety net for missed events)
//!   └── Recovery: feed lag → drop buffer, full resync
//! ```
//!
//! Mirror failures are logged and retried; they never propagate to the
//! write that produced the change.

mod service;
mod worker;

pub use service::SyncBridge;
pub use worker::SyncWorker;

use serde_json::Value;
use tokio::sync::broadcast;

use crate::store::Collection;

const FEED_CAPACITY: usize = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeAction {
    Upsert,
    Delete,
}

/// One committed change to the authoritative store.
#[derive(Debug, Clone)]
pub struct ChangeEvent {
    pub collection: Collection,
    pub id: String,
    pub action: ChangeAction,
    /// Record body after the change; `None` for deletes.
    pub data: Option<Value>,
}

impl ChangeEvent {
    pub fn upsert(collection: Collection, id: impl Into<String>, data: Value) -> Self {
        Self {
            collection,
            id: id.into(),
            action: ChangeAction::Upsert,
            data: Some(data),
        }
    }

    pub fn delete(collection: Collection, id: impl Into<String>) -> Self {
        Self {
            collection,
            id: id.into(),
            action: ChangeAction::Delete,
            data: None,
        }
    }
}

/// Broadcast channel the writers publish committed changes into.
///
/// Publishing never blocks and never fails the write: with no live
/// subscriber the event is simply dropped, and the worker's periodic full
/// resync covers whatever a subscriber misses.
#[derive(Clone)]
pub struct ChangeFeed {
    tx: broadcast::Sender<ChangeEvent>,
}

impl ChangeFeed {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(FEED_CAPACITY);
        Self { tx }
    }

    pub fn publish(&self, event: ChangeEvent) {
        let _ = self.tx.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ChangeEvent> {
        self.tx.subscribe()
    }
}

impl Default for ChangeFeed {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_publish_without_subscriber_is_silent() {
        let feed = ChangeFeed::new();
        feed.publish(ChangeEvent::delete(Collection::Lockers, "locker_1"));
    }

    #[tokio::test]
    async fn test_subscriber_receives_published_event() {
        let feed = ChangeFeed::new();
        let mut rx = feed.subscribe();
        feed.publish(ChangeEvent::upsert(
            Collection::Lockers,
            "locker_1",
            serde_json::json!({"id": "locker_1"}),
        ));
        let event = rx.recv().await.unwrap();
        assert_eq!(event.collection, Collection::Lockers);
        assert_eq!(event.action, ChangeAction::Upsert);
    }
}
