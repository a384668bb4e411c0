//! Data models
//!
//! Shared between the kiosk pipeline and the backend collections it syncs.
//! All ids are prefixed strings (see [`crate::util::prefixed_id`]).

pub mod booking;
pub mod box_category;
pub mod device;
pub mod locker;
pub mod locker_log;
pub mod package;
pub mod payment;
pub mod user;

// Re-exports
pub use booking::*;
pub use box_category::*;
pub use device::*;
pub use locker::*;
pub use locker_log::*;
pub use package::*;
pub use payment::*;
pub use user::*;
