//! Locker activity log

use serde::{Deserialize, Serialize};

/// Audit record appended on every ledger mutation.
///
/// Append failure is never fatal to the triggering operation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LockerLog {
    pub id: String,
    pub locker_id: String,
    pub booking_id: Option<String>,
    pub device_id: Option<String>,
    pub action: String,
    pub action_time: String,
}

/// Well-known log actions.
pub mod actions {
    pub const BOOKING_CREATED: &str = "booking_created";
    pub const BOOKING_CANCELLED: &str = "booking_cancelled";
    pub const ITEM_RETRIEVED: &str = "item_retrieved";
}
