//! Payment Model

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Terminal-or-pending state of an authoritative payment record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentRecordStatus {
    Pending,
    Success,
    Failed,
    Expired,
}

/// Payment entity.
///
/// At most one per booking; created only after the gateway confirms
/// success, so the backend never accumulates unpaid attempts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Payment {
    pub id: String,
    pub booking_id: String,
    pub amount: Decimal,
    pub gateway_reference: String,
    pub status: PaymentRecordStatus,
    pub payment_method: String,
    pub transaction_time: String,
    pub created_at: String,
}
