//! Reservation ledger — locker capacity accounting.
//!
//! All capacity changes go through the store's atomic
//! [`adjust_availability`](crate::store::BackendStore::adjust_availability)
//! primitive; this module never reads a counter and writes it back. Two
//! kiosks racing for the last unit both ask the store to decrement, and
//! exactly one wins.

use serde_json::json;
use shared::models::{Locker, LockerLog, locker_log};
use shared::{AppError, AppResult};
use std::sync::Arc;

use crate::store::{BackendStore, Collection, decode, encode};
use crate::sync::{ChangeEvent, ChangeFeed};

pub struct ReservationLedger {
    backend: Arc<dyn BackendStore>,
    feed: ChangeFeed,
}

impl ReservationLedger {
    pub fn new(backend: Arc<dyn BackendStore>, feed: ChangeFeed) -> Self {
        Self { backend, feed }
    }

    pub async fn list_lockers(&self) -> AppResult<Vec<Locker>> {
        let records = self.backend.list(Collection::Lockers).await?;
        records.into_iter().map(decode).collect()
    }

    pub async fn get_locker(&self, locker_id: &str) -> AppResult<Locker> {
        let record = self
            .backend
            .get(Collection::Lockers, locker_id)
            .await?
            .ok_or_else(|| AppError::not_found(format!("Locker {locker_id}")))?;
        decode(record)
    }

    /// Advisory availability check, used before a customer starts paying.
    ///
    /// Only a hint: the authoritative decision happens inside the atomic
    /// decrement at settlement.
    pub async fn ensure_rentable(&self, locker_id: &str) -> AppResult<Locker> {
        let locker = self.get_locker(locker_id).await?;
        if !locker.is_rentable() {
            return Err(AppError::unavailable(format!(
                "Locker {} has no free unit",
                locker.locker_code
            )));
        }
        Ok(locker)
    }

    /// Take one unit of a locker. Fails with [`AppError::Unavailable`] when
    /// the store rejects the decrement (no free unit, maintenance).
    pub async fn reserve(&self, locker_id: &str, booking_id: &str) -> AppResult<Locker> {
        let locker = self.backend.adjust_availability(locker_id, -1).await?;
        tracing::info!(
            locker = %locker.locker_code,
            available = locker.available,
            booking_id,
            "Reserved locker unit"
        );
        self.publish_locker(&locker);
        self.append_log(&locker, booking_id, locker_log::actions::BOOKING_CREATED)
            .await;
        Ok(locker)
    }

    /// Return one unit of a locker. The store clamps at `total`, so a
    /// duplicate release cannot inflate capacity.
    pub async fn release(&self, locker_id: &str, booking_id: &str, action: &str) -> AppResult<Locker> {
        let locker = self.backend.adjust_availability(locker_id, 1).await?;
        tracing::info!(
            locker = %locker.locker_code,
            available = locker.available,
            booking_id,
            action,
            "Released locker unit"
        );
        self.publish_locker(&locker);
        self.append_log(&locker, booking_id, action).await;
        Ok(locker)
    }

    fn publish_locker(&self, locker: &Locker) {
        if let Ok(record) = encode(locker) {
            self.feed
                .publish(ChangeEvent::upsert(Collection::Lockers, &locker.id, record));
        }
    }

    /// Audit trail write. Best effort: a ledger movement must not fail
    /// because the log collection is unreachable.
    async fn append_log(&self, locker: &Locker, booking_id: &str, action: &str) {
        let log = LockerLog {
            id: shared::util::prefixed_id("log"),
            locker_id: locker.id.clone(),
            booking_id: Some(booking_id.to_string()),
            device_id: locker.device_id.clone(),
            action: action.to_string(),
            action_time: shared::util::now_rfc3339(),
        };
        match self.backend.create(Collection::LockerLogs, json!(log)).await {
            Ok(record) => {
                self.feed
                    .publish(ChangeEvent::upsert(Collection::LockerLogs, &log.id, record));
            }
            Err(e) => tracing::warn!(action, "Locker log write failed: {e}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryBackend;
    use rust_decimal::Decimal;
    use shared::models::LockerStatus;

    fn seed_locker(backend: &MemoryBackend, available: u32, total: u32) {
        let locker = Locker {
            id: "locker_1".into(),
            locker_code: "L1".into(),
            name: "Small A".into(),
            box_category_id: "cat_1".into(),
            total,
            available,
            status: if available == 0 {
                LockerStatus::Occupied
            } else {
                LockerStatus::Available
            },
            base_price: Decimal::from(10_000),
            device_id: None,
            location: "Lobby".into(),
            created_at: shared::util::now_rfc3339(),
            updated_at: shared::util::now_rfc3339(),
        };
        backend.seed(Collection::Lockers, &locker).unwrap();
    }

    fn ledger(backend: Arc<MemoryBackend>) -> ReservationLedger {
        ReservationLedger::new(backend, ChangeFeed::new())
    }

    #[tokio::test]
    async fn test_reserve_decrements_and_logs() {
        let backend = Arc::new(MemoryBackend::new());
        seed_locker(&backend, 2, 2);
        let ledger = ledger(backend.clone());

        let locker = ledger.reserve("locker_1", "booking_1").await.unwrap();
        assert_eq!(locker.available, 1);

        let logs = backend.list(Collection::LockerLogs).await.unwrap();
        assert_eq!(logs.len(), 1);
        assert_eq!(
            logs[0].get("action").and_then(serde_json::Value::as_str),
            Some(locker_log::actions::BOOKING_CREATED)
        );
    }

    #[tokio::test]
    async fn test_last_unit_race_has_one_winner() {
        let backend = Arc::new(MemoryBackend::new());
        seed_locker(&backend, 1, 2);
        let ledger = ledger(backend.clone());

        let first = ledger.reserve("locker_1", "booking_1").await;
        let second = ledger.reserve("locker_1", "booking_2").await;

        assert!(first.is_ok());
        assert!(matches!(second.unwrap_err(), AppError::Unavailable(_)));
    }

    #[tokio::test]
    async fn test_duplicate_release_clamps_at_total() {
        let backend = Arc::new(MemoryBackend::new());
        seed_locker(&backend, 1, 2);
        let ledger = ledger(backend.clone());

        let action = locker_log::actions::ITEM_RETRIEVED;
        let first = ledger.release("locker_1", "booking_1", action).await.unwrap();
        assert_eq!(first.available, 2);
        let second = ledger.release("locker_1", "booking_1", action).await.unwrap();
        assert_eq!(second.available, 2);
    }

    #[tokio::test]
    async fn test_ensure_rentable_rejects_occupied() {
        let backend = Arc::new(MemoryBackend::new());
        seed_locker(&backend, 0, 1);
        let ledger = ledger(backend);

        let err = ledger.ensure_rentable("locker_1").await.unwrap_err();
        assert!(matches!(err, AppError::Unavailable(_)));
    }

    #[tokio::test]
    async fn test_reserve_publishes_locker_change() {
        let backend = Arc::new(MemoryBackend::new());
        seed_locker(&backend, 1, 1);
        let feed = ChangeFeed::new();
        let mut rx = feed.subscribe();
        let ledger = ReservationLedger::new(backend, feed);

        ledger.reserve("locker_1", "booking_1").await.unwrap();

        let event = rx.recv().await.unwrap();
        assert_eq!(event.collection, Collection::Lockers);
        assert_eq!(event.id, "locker_1");
    }
}
