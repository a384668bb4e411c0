//! SyncBridge — moves authoritative data into the mirror store.

use serde_json::Value;
use shared::AppResult;
use std::sync::Arc;

use crate::store::{BackendStore, Collection, MirrorStore};

use super::{ChangeAction, ChangeEvent};

pub struct SyncBridge {
    backend: Arc<dyn BackendStore>,
    mirror: Arc<dyn MirrorStore>,
}

impl SyncBridge {
    pub fn new(backend: Arc<dyn BackendStore>, mirror: Arc<dyn MirrorStore>) -> Self {
        Self { backend, mirror }
    }

    /// Overwrite one mirror collection with the backend's current records.
    ///
    /// Returns the record count pushed. Records missing an `id` field are
    /// dropped by the mirror client rather than aborting the batch.
    pub async fn sync_collection(&self, collection: Collection) -> AppResult<usize> {
        let records = self.backend.list(collection).await?;
        let count = records.len();
        self.mirror.put_collection(collection, records).await?;
        tracing::debug!(%collection, count, "Mirrored collection");
        Ok(count)
    }

    /// Overwrite every mirror collection. A failing collection is logged
    /// and skipped so one bad resource cannot starve the rest; the first
    /// error is still reported to the caller.
    pub async fn full_resync(&self) -> AppResult<usize> {
        let mut total = 0;
        let mut first_error = None;
        for collection in Collection::ALL {
            match self.sync_collection(collection).await {
                Ok(count) => total += count,
                Err(e) => {
                    tracing::error!(%collection, "Collection resync failed: {e}");
                    first_error.get_or_insert(e);
                }
            }
        }
        match first_error {
            None => {
                tracing::info!(total, "Full mirror resync complete");
                Ok(total)
            }
            Some(e) => Err(e),
        }
    }

    /// Apply one committed change to the mirror incrementally.
    pub async fn apply(&self, event: &ChangeEvent) -> AppResult<()> {
        match event.action {
            ChangeAction::Upsert => {
                let data = match &event.data {
                    Some(data) => data.clone(),
                    // Event without a body: fetch the current record so the
                    // mirror still converges.
                    None => match self.backend.get(event.collection, &event.id).await? {
                        Some(record) => record,
                        None => Value::Null,
                    },
                };
                if data.is_null() {
                    self.mirror.remove(event.collection, &event.id).await
                } else {
                    self.mirror.upsert(event.collection, &event.id, data).await
                }
            }
            ChangeAction::Delete => self.mirror.remove(event.collection, &event.id).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{MemoryBackend, MemoryMirror, record_id};

    fn bridge() -> (Arc<MemoryBackend>, Arc<MemoryMirror>, SyncBridge) {
        let backend = Arc::new(MemoryBackend::new());
        let mirror = Arc::new(MemoryMirror::new());
        let bridge = SyncBridge::new(backend.clone(), mirror.clone());
        (backend, mirror, bridge)
    }

    #[tokio::test]
    async fn test_sync_collection_overwrites_stale_mirror() {
        let (backend, mirror, bridge) = bridge();
        mirror
            .upsert(
                Collection::Lockers,
                "stale",
                serde_json::json!({"id": "stale"}),
            )
            .await
            .unwrap();
        backend
            .create(Collection::Lockers, serde_json::json!({"id": "fresh"}))
            .await
            .unwrap();

        let count = bridge.sync_collection(Collection::Lockers).await.unwrap();
        assert_eq!(count, 1);

        let records = mirror.get_collection(Collection::Lockers).await.unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(record_id(&records[0]), Some("fresh"));
    }

    #[tokio::test]
    async fn test_apply_upsert_and_delete() {
        let (_backend, mirror, bridge) = bridge();
        bridge
            .apply(&ChangeEvent::upsert(
                Collection::Transactions,
                "booking_1",
                serde_json::json!({"id": "booking_1"}),
            ))
            .await
            .unwrap();
        assert_eq!(
            mirror
                .get_collection(Collection::Transactions)
                .await
                .unwrap()
                .len(),
            1
        );

        bridge
            .apply(&ChangeEvent::delete(Collection::Transactions, "booking_1"))
            .await
            .unwrap();
        assert!(
            mirror
                .get_collection(Collection::Transactions)
                .await
                .unwrap()
                .is_empty()
        );
    }

    #[tokio::test]
    async fn test_full_resync_reports_first_error_but_continues() {
        let (backend, mirror, bridge) = bridge();
        backend
            .create(Collection::Lockers, serde_json::json!({"id": "locker_1"}))
            .await
            .unwrap();
        mirror.set_failing(true);

        assert!(bridge.full_resync().await.is_err());

        mirror.set_failing(false);
        assert_eq!(bridge.full_resync().await.unwrap(), 1);
    }
}
