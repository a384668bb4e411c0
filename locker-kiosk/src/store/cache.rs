//! Client-local booking cache (redb).
//!
//! Optimistic, write-ahead copy of booking state: a booking is written here
//! the moment the customer starts paying, before anything reaches the
//! authoritative store. It is the last resort of the read fallback chain
//! and the input of the reconciliation pass that re-pushes settled bookings
//! the backend missed.

use redb::{Database, ReadableDatabase, ReadableTable, TableDefinition};
use serde::{Deserialize, Serialize};
use shared::models::{Booking, PaymentStatus};
use shared::{AppError, AppResult};
use std::path::Path;

const BOOKINGS: TableDefinition<&str, &[u8]> = TableDefinition::new("bookings");

/// Cached booking plus its write-ahead bookkeeping.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct CacheRecord {
    booking: Booking,
    /// True once the authoritative store has confirmed this booking.
    reconciled: bool,
}

pub struct LocalCache {
    db: Database,
}

impl LocalCache {
    /// Open (or create) the cache database under `work_dir`.
    pub fn open(work_dir: &Path) -> AppResult<Self> {
        let path = work_dir.join("kiosk-cache.redb");
        let db = Database::create(&path)
            .map_err(|e| AppError::cache(format!("Cannot open cache at {path:?}: {e}")))?;
        // Make sure the table exists so reads never hit TableDoesNotExist.
        let txn = db
            .begin_write()
            .map_err(|e| AppError::cache(e.to_string()))?;
        txn.open_table(BOOKINGS)
            .map_err(|e| AppError::cache(e.to_string()))?;
        txn.commit().map_err(|e| AppError::cache(e.to_string()))?;
        Ok(Self { db })
    }

    fn write_record(&self, record: &CacheRecord) -> AppResult<()> {
        let bytes = serde_json::to_vec(record)
            .map_err(|e| AppError::cache(format!("Unencodable booking: {e}")))?;
        let txn = self
            .db
            .begin_write()
            .map_err(|e| AppError::cache(e.to_string()))?;
        {
            let mut table = txn
                .open_table(BOOKINGS)
                .map_err(|e| AppError::cache(e.to_string()))?;
            table
                .insert(record.booking.id.as_str(), bytes.as_slice())
                .map_err(|e| AppError::cache(e.to_string()))?;
        }
        txn.commit().map_err(|e| AppError::cache(e.to_string()))?;
        Ok(())
    }

    fn read_record(&self, id: &str) -> AppResult<Option<CacheRecord>> {
        let txn = self
            .db
            .begin_read()
            .map_err(|e| AppError::cache(e.to_string()))?;
        let table = txn
            .open_table(BOOKINGS)
            .map_err(|e| AppError::cache(e.to_string()))?;
        let Some(bytes) = table
            .get(id)
            .map_err(|e| AppError::cache(e.to_string()))?
        else {
            return Ok(None);
        };
        let record = serde_json::from_slice(bytes.value())
            .map_err(|e| AppError::cache(format!("Corrupt cache record {id}: {e}")))?;
        Ok(Some(record))
    }

    fn all_records(&self) -> AppResult<Vec<CacheRecord>> {
        let txn = self
            .db
            .begin_read()
            .map_err(|e| AppError::cache(e.to_string()))?;
        let table = txn
            .open_table(BOOKINGS)
            .map_err(|e| AppError::cache(e.to_string()))?;
        let mut records = Vec::new();
        for entry in table.iter().map_err(|e| AppError::cache(e.to_string()))? {
            let (_, value) = entry.map_err(|e| AppError::cache(e.to_string()))?;
            match serde_json::from_slice::<CacheRecord>(value.value()) {
                Ok(record) => records.push(record),
                Err(e) => tracing::warn!("Skipping corrupt cache record: {e}"),
            }
        }
        Ok(records)
    }

    /// Write a booking optimistically (not yet confirmed by the backend).
    pub fn put_pending(&self, booking: &Booking) -> AppResult<()> {
        self.write_record(&CacheRecord {
            booking: booking.clone(),
            reconciled: false,
        })
    }

    /// Overwrite a booking and flag it confirmed by the backend.
    pub fn put_reconciled(&self, booking: &Booking) -> AppResult<()> {
        self.write_record(&CacheRecord {
            booking: booking.clone(),
            reconciled: true,
        })
    }

    pub fn get(&self, id: &str) -> AppResult<Option<Booking>> {
        Ok(self.read_record(id)?.map(|r| r.booking))
    }

    pub fn find_by_access_code(&self, code: &str) -> AppResult<Option<Booking>> {
        Ok(self
            .all_records()?
            .into_iter()
            .map(|r| r.booking)
            .find(|b| b.access_code.as_deref() == Some(code)))
    }

    /// Bookings of one customer, newest first.
    pub fn bookings_for_user(&self, user_id: &str) -> AppResult<Vec<Booking>> {
        let mut bookings: Vec<Booking> = self
            .all_records()?
            .into_iter()
            .map(|r| r.booking)
            .filter(|b| b.user_id == user_id)
            .collect();
        bookings.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(bookings)
    }

    /// Update payment status (and gateway reference) in place.
    pub fn update_status(
        &self,
        id: &str,
        status: PaymentStatus,
        gateway_reference: Option<&str>,
    ) -> AppResult<()> {
        if let Some(mut record) = self.read_record(id)? {
            record.booking.payment_status = status;
            if let Some(reference) = gateway_reference {
                record.booking.gateway_reference = Some(reference.to_string());
            }
            self.write_record(&record)?;
        }
        Ok(())
    }

    pub fn mark_checked_out(&self, id: &str) -> AppResult<()> {
        if let Some(mut record) = self.read_record(id)? {
            record.booking.checked_out = true;
            record.booking.checked_out_at = Some(shared::util::now_rfc3339());
            self.write_record(&record)?;
        }
        Ok(())
    }

    pub fn remove(&self, id: &str) -> AppResult<()> {
        let txn = self
            .db
            .begin_write()
            .map_err(|e| AppError::cache(e.to_string()))?;
        {
            let mut table = txn
                .open_table(BOOKINGS)
                .map_err(|e| AppError::cache(e.to_string()))?;
            table
                .remove(id)
                .map_err(|e| AppError::cache(e.to_string()))?;
        }
        txn.commit().map_err(|e| AppError::cache(e.to_string()))?;
        Ok(())
    }

    /// Flip overdue pending bookings to expired. Returns the ids touched.
    pub fn expire_overdue(&self, now_rfc3339: &str) -> AppResult<Vec<String>> {
        let mut expired = Vec::new();
        for mut record in self.all_records()? {
            if record.booking.payment_status == PaymentStatus::Pending
                && record.booking.is_expired_at(now_rfc3339)
            {
                record.booking.payment_status = PaymentStatus::Expired;
                self.write_record(&record)?;
                expired.push(record.booking.id.clone());
            }
        }
        Ok(expired)
    }

    /// Settled bookings the backend has not confirmed yet — the work list
    /// of the reconciliation pass.
    pub fn unreconciled(&self) -> AppResult<Vec<Booking>> {
        Ok(self
            .all_records()?
            .into_iter()
            .filter(|r| !r.reconciled && r.booking.payment_status == PaymentStatus::Paid)
            .map(|r| r.booking)
            .collect())
    }
}
