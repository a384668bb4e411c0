//! Trust-ordered booking reads.
//!
//! Lookups try the authoritative backend first, then the mirror, then the
//! local cache. Only transport failures fall through; a store that answers
//! "no such record" is believed and the chain continues to the next tier
//! solely because a record this kiosk wrote optimistically may not have
//! reached the upper tiers yet.

use serde_json::Value;
use shared::models::Booking;
use shared::{AppError, AppResult};
use std::sync::Arc;

use super::{BackendStore, Collection, LocalCache, MirrorStore, decode};

pub struct FallbackReader {
    backend: Arc<dyn BackendStore>,
    mirror: Arc<dyn MirrorStore>,
    cache: Arc<LocalCache>,
}

impl FallbackReader {
    pub fn new(
        backend: Arc<dyn BackendStore>,
        mirror: Arc<dyn MirrorStore>,
        cache: Arc<LocalCache>,
    ) -> Self {
        Self {
            backend,
            mirror,
            cache,
        }
    }

    fn decode_bookings(records: Vec<Value>) -> Vec<Booking> {
        records
            .into_iter()
            .filter_map(|record| match decode::<Booking>(record) {
                Ok(booking) => Some(booking),
                Err(e) => {
                    tracing::warn!("Skipping malformed booking record: {e}");
                    None
                }
            })
            .collect()
    }

    async fn backend_bookings(&self) -> AppResult<Vec<Booking>> {
        let records = self.backend.list(Collection::Transactions).await?;
        Ok(Self::decode_bookings(records))
    }

    async fn mirror_bookings(&self) -> AppResult<Vec<Booking>> {
        let records = self.mirror.get_collection(Collection::Transactions).await?;
        Ok(Self::decode_bookings(records))
    }

    /// Find a booking by its access code, walking the tiers in trust order.
    pub async fn find_by_access_code(&self, code: &str) -> AppResult<Option<Booking>> {
        match self.backend_bookings().await {
            Ok(bookings) => {
                if let Some(found) = bookings
                    .into_iter()
                    .find(|b| b.access_code.as_deref() == Some(code))
                {
                    return Ok(Some(found));
                }
            }
            Err(e) if e.is_transport() => {
                tracing::warn!("Backend lookup failed, trying mirror: {e}");
            }
            Err(e) => return Err(e),
        }

        match self.mirror_bookings().await {
            Ok(bookings) => {
                if let Some(found) = bookings
                    .into_iter()
                    .find(|b| b.access_code.as_deref() == Some(code))
                {
                    return Ok(Some(found));
                }
            }
            Err(e) => {
                tracing::warn!("Mirror lookup failed, trying local cache: {e}");
            }
        }

        self.cache.find_by_access_code(code)
    }

    /// Fetch a booking by id, walking the tiers in trust order.
    pub async fn get_booking(&self, id: &str) -> AppResult<Option<Booking>> {
        match self.backend.get(Collection::Transactions, id).await {
            Ok(Some(record)) => return Ok(Some(decode(record)?)),
            Ok(None) => {}
            Err(e) if e.is_transport() => {
                tracing::warn!("Backend lookup failed, trying mirror: {e}");
            }
            Err(e) => return Err(e),
        }

        match self.mirror_bookings().await {
            Ok(bookings) => {
                if let Some(found) = bookings.into_iter().find(|b| b.id == id) {
                    return Ok(Some(found));
                }
            }
            Err(e) => {
                tracing::warn!("Mirror lookup failed, trying local cache: {e}");
            }
        }

        self.cache.get(id)
    }

    /// All bookings of one customer, newest first. Uses the first tier that
    /// answers.
    pub async fn bookings_for_user(&self, user_id: &str) -> AppResult<Vec<Booking>> {
        for result in [self.backend_bookings().await, self.mirror_bookings().await] {
            match result {
                Ok(bookings) => {
                    let mut mine: Vec<Booking> = bookings
                        .into_iter()
                        .filter(|b| b.user_id == user_id)
                        .collect();
                    mine.sort_by(|a, b| b.created_at.cmp(&a.created_at));
                    return Ok(mine);
                }
                Err(e) => {
                    tracing::warn!("Store tier failed listing bookings: {e}");
                }
            }
        }
        self.cache.bookings_for_user(user_id)
    }

    /// Like [`find_by_access_code`](Self::find_by_access_code) but maps the
    /// all-tiers-miss case to [`AppError::RecordNotFound`].
    pub async fn require_by_access_code(&self, code: &str) -> AppResult<Booking> {
        self.find_by_access_code(code)
            .await?
            .ok_or_else(|| AppError::not_found(format!("Booking with code {code}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{MemoryBackend, MemoryMirror, encode};
    use rust_decimal::Decimal;
    use shared::models::PaymentStatus;

    fn booking(id: &str, code: Option<&str>) -> Booking {
        Booking {
            id: id.into(),
            user_id: "guest_1".into(),
            customer_name: "Ana".into(),
            customer_phone: "081234567890".into(),
            customer_email: "ana@example.com".into(),
            locker_id: "locker_1".into(),
            locker_name: "Small A".into(),
            locker_size: "30x40".into(),
            duration_hours: 24,
            total_price: Decimal::from(15_000),
            payment_method: "QRIS".into(),
            payment_status: if code.is_some() {
                PaymentStatus::Paid
            } else {
                PaymentStatus::Pending
            },
            merchant_order_id: "order_1".into(),
            gateway_reference: None,
            access_code: code.map(str::to_string),
            checked_out: false,
            checked_out_at: None,
            created_at: shared::util::now_rfc3339(),
            expires_at: shared::util::now_rfc3339(),
        }
    }

    fn reader() -> (Arc<MemoryBackend>, Arc<MemoryMirror>, Arc<LocalCache>, FallbackReader, tempfile::TempDir) {
        let backend = Arc::new(MemoryBackend::new());
        let mirror = Arc::new(MemoryMirror::new());
        let dir = tempfile::tempdir().unwrap();
        let cache = Arc::new(LocalCache::open(dir.path()).unwrap());
        let reader = FallbackReader::new(backend.clone(), mirror.clone(), cache.clone());
        (backend, mirror, cache, reader, dir)
    }

    #[tokio::test]
    async fn test_backend_answer_wins() {
        let (backend, _mirror, cache, reader, _dir) = reader();
        backend
            .seed(Collection::Transactions, &booking("booking_1", Some("ABC234")))
            .unwrap();
        let mut stale = booking("booking_1", Some("ABC234"));
        stale.customer_name = "Stale".into();
        cache.put_pending(&stale).unwrap();

        let found = reader.find_by_access_code("ABC234").await.unwrap().unwrap();
        assert_eq!(found.customer_name, "Ana");
    }

    #[tokio::test]
    async fn test_falls_through_to_mirror_when_backend_down() {
        let (backend, mirror, _cache, reader, _dir) = reader();
        backend.set_offline(true);
        mirror
            .upsert(
                Collection::Transactions,
                "booking_1",
                encode(&booking("booking_1", Some("ABC234"))).unwrap(),
            )
            .await
            .unwrap();

        let found = reader.find_by_access_code("ABC234").await.unwrap().unwrap();
        assert_eq!(found.id, "booking_1");
    }

    #[tokio::test]
    async fn test_falls_through_to_cache_when_both_down() {
        let (backend, mirror, cache, reader, _dir) = reader();
        backend.set_offline(true);
        mirror.set_failing(true);
        cache.put_pending(&booking("booking_1", Some("ABC234"))).unwrap();

        let found = reader.get_booking("booking_1").await.unwrap().unwrap();
        assert_eq!(found.id, "booking_1");
    }

    #[tokio::test]
    async fn test_all_tiers_miss_is_none() {
        let (_backend, _mirror, _cache, reader, _dir) = reader();
        assert!(reader.find_by_access_code("ZZZZZZ").await.unwrap().is_none());
        let err = reader.require_by_access_code("ZZZZZZ").await.unwrap_err();
        assert!(matches!(err, AppError::RecordNotFound(_)));
    }
}
