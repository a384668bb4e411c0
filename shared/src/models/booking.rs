//! Booking Model

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Payment state of a booking.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentStatus {
    Pending,
    Paid,
    Failed,
    Expired,
}

/// Booking entity (stored in the backend `transactions` collection).
///
/// Invariants:
/// - `access_code` is `Some` iff `payment_status == Paid`;
/// - `checked_out == true` is terminal.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Booking {
    pub id: String,
    pub user_id: String,
    pub customer_name: String,
    pub customer_phone: String,
    pub customer_email: String,
    pub locker_id: String,
    pub locker_name: String,
    pub locker_size: String,
    pub duration_hours: u32,
    pub total_price: Decimal,
    pub payment_method: String,
    pub payment_status: PaymentStatus,
    /// Our order reference handed to the gateway.
    pub merchant_order_id: String,
    /// The gateway's own reference, once an intent exists.
    pub gateway_reference: Option<String>,
    /// Assigned only when payment succeeds.
    pub access_code: Option<String>,
    pub checked_out: bool,
    pub checked_out_at: Option<String>,
    pub created_at: String,
    pub expires_at: String,
}

impl Booking {
    /// Access-code/payment-status invariant.
    pub fn invariant_holds(&self) -> bool {
        self.access_code.is_some() == (self.payment_status == PaymentStatus::Paid)
    }

    /// Whether the booking is past its expiry at `now` (RFC 3339).
    pub fn is_expired_at(&self, now: &str) -> bool {
        // RFC 3339 timestamps in UTC compare correctly as strings only when
        // formats match, so parse properly.
        match (
            chrono::DateTime::parse_from_rfc3339(&self.expires_at),
            chrono::DateTime::parse_from_rfc3339(now),
        ) {
            (Ok(expires), Ok(now)) => now > expires,
            _ => false,
        }
    }
}
