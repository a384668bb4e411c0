//! Device state notifier.
//!
//! Flips the embedded controller of a locker online when a paid customer is
//! expected and offline once the booking completes. A locker without a
//! registered controller is normal (manual cabinets), so a missing device
//! is logged, never an error.

use serde_json::json;
use shared::models::{Device, DeviceStatus};
use shared::{AppError, AppResult};
use std::sync::Arc;

use crate::store::{BackendStore, Collection, decode};
use crate::sync::{ChangeEvent, ChangeFeed};

pub struct DeviceNotifier {
    backend: Arc<dyn BackendStore>,
    feed: ChangeFeed,
}

impl DeviceNotifier {
    pub fn new(backend: Arc<dyn BackendStore>, feed: ChangeFeed) -> Self {
        Self { backend, feed }
    }

    /// Find the controller serving a locker, if one is registered.
    pub async fn device_for_locker(&self, locker_id: &str) -> AppResult<Option<Device>> {
        let records = self.backend.list(Collection::Devices).await?;
        for record in records {
            let device: Device = decode(record)?;
            if device.locker_id == locker_id {
                return Ok(Some(device));
            }
        }
        Ok(None)
    }

    /// Set the controller of `locker_id` to `status`.
    ///
    /// Returns the updated device, or `None` when the locker has no
    /// controller. Only store transport failures surface as errors.
    pub async fn set_status(
        &self,
        locker_id: &str,
        status: DeviceStatus,
    ) -> AppResult<Option<Device>> {
        let Some(mut device) = self.device_for_locker(locker_id).await? else {
            tracing::info!(locker_id, "No controller registered for locker");
            return Ok(None);
        };

        device.status = status;
        if status == DeviceStatus::Online {
            device.last_online = shared::util::now_rfc3339();
        }

        let patch = json!({
            "status": device.status,
            "last_online": device.last_online,
        });
        let updated = self
            .backend
            .update(Collection::Devices, &device.id, patch)
            .await?;

        tracing::info!(device = %device.device_identifier, ?status, "Controller state updated");
        self.feed
            .publish(ChangeEvent::upsert(Collection::Devices, &device.id, updated));
        Ok(Some(device))
    }

    /// Like [`set_status`](Self::set_status) but swallows transport
    /// failures: controller state is advisory during settlement.
    pub async fn set_status_best_effort(&self, locker_id: &str, status: DeviceStatus) {
        match self.set_status(locker_id, status).await {
            Ok(_) => {}
            Err(AppError::StoreUnreachable(msg)) => {
                tracing::warn!(locker_id, "Controller update skipped, store down: {msg}");
            }
            Err(e) => {
                tracing::warn!(locker_id, "Controller update failed: {e}");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryBackend;

    fn seed_device(backend: &MemoryBackend, locker_id: &str) {
        let device = Device {
            id: "device_1".into(),
            name: "Cabinet A controller".into(),
            device_identifier: "ESP32-AA01".into(),
            locker_id: locker_id.into(),
            status: DeviceStatus::Offline,
            last_online: shared::util::now_rfc3339(),
            ip_address: "10.0.0.21".into(),
            port: 8266,
            location: "Lobby".into(),
        };
        backend.seed(Collection::Devices, &device).unwrap();
    }

    #[tokio::test]
    async fn test_set_status_updates_registered_device() {
        let backend = Arc::new(MemoryBackend::new());
        seed_device(&backend, "locker_1");
        let notifier = DeviceNotifier::new(backend.clone(), ChangeFeed::new());

        let device = notifier
            .set_status("locker_1", DeviceStatus::Online)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(device.status, DeviceStatus::Online);

        let stored: Device =
            decode(backend.get(Collection::Devices, "device_1").await.unwrap().unwrap()).unwrap();
        assert_eq!(stored.status, DeviceStatus::Online);
    }

    #[tokio::test]
    async fn test_missing_device_is_not_an_error() {
        let backend = Arc::new(MemoryBackend::new());
        let notifier = DeviceNotifier::new(backend, ChangeFeed::new());

        let result = notifier
            .set_status("locker_without_controller", DeviceStatus::Online)
            .await
            .unwrap();
        assert!(result.is_none());
    }
}
