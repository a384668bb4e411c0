//! Locker Model

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Locker lifecycle status.
///
/// Derived from the availability counter, never set independently:
/// `Occupied` iff `available == 0`, except `Maintenance` which is an
/// operator override that removes the locker from rental.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LockerStatus {
    Available,
    Occupied,
    Maintenance,
}

/// Locker entity.
///
/// `available` and `status` are mutated exclusively by the reservation
/// ledger; UI and sync code treat them as read-only.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Locker {
    pub id: String,
    /// Human-facing code painted on the cabinet, e.g. "L12".
    pub locker_code: String,
    pub name: String,
    pub box_category_id: String,
    /// Total unit capacity, >= 1.
    pub total: u32,
    /// Units currently free, 0..=total.
    pub available: u32,
    pub status: LockerStatus,
    pub base_price: Decimal,
    /// Controller bound to this locker, if one is installed.
    pub device_id: Option<String>,
    pub location: String,
    pub created_at: String,
    pub updated_at: String,
}

impl Locker {
    /// Status implied by an availability counter.
    pub fn status_for(available: u32) -> LockerStatus {
        if available == 0 {
            LockerStatus::Occupied
        } else {
            LockerStatus::Available
        }
    }

    /// Whether a new rental may start on this locker.
    pub fn is_rentable(&self) -> bool {
        self.available > 0 && self.status == LockerStatus::Available
    }

    /// Counter/status invariant check, used by ledger tests.
    pub fn invariant_holds(&self) -> bool {
        self.available <= self.total
            && match self.status {
                LockerStatus::Occupied => self.available == 0,
                LockerStatus::Available => self.available > 0,
                LockerStatus::Maintenance => true,
            }
    }
}
