//! User Model

use serde::{Deserialize, Serialize};

/// User entity. Walk-up customers are guests; their record is pushed to the
/// backend only once a payment succeeds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub name: String,
    pub email: String,
    pub phone: String,
    pub role: String,
    pub is_guest: bool,
    pub created_at: String,
    pub updated_at: String,
}
