//! Box Category Model

use serde::{Deserialize, Serialize};

/// Physical box size class a locker belongs to.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BoxCategory {
    pub id: String,
    pub name: String,
    pub category_type: String,
    pub width: u32,
    pub height: u32,
}
