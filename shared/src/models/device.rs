//! Embedded locker-controller record

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceStatus {
    Online,
    Offline,
}

/// Controller entity. Lifecycle follows the booking: online while a paid
/// customer is expected at the cabinet, offline once they are done.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Device {
    pub id: String,
    pub name: String,
    /// Hardware identifier reported by the controller firmware.
    pub device_identifier: String,
    pub locker_id: String,
    pub status: DeviceStatus,
    pub last_online: String,
    pub ip_address: String,
    pub port: u16,
    pub location: String,
}
