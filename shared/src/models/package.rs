//! Rental Package Model

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Pricing preset offered at the kiosk (daily, weekly, size-based, ...).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Package {
    pub id: String,
    pub name: String,
    pub description: String,
    pub package_type: String,
    pub box_category_id: String,
    pub base_price: Decimal,
    pub duration_hours: u32,
}
