//! Locker kiosk pipeline
//!
//! Client-side reservation–settlement pipeline for walk-up locker rental:
//! availability ledger, payment settlement coordinator, dual-store sync
//! bridge, device notifier, and the booking orchestrator tying them together.
//!
//! The presentation layer (forms, QR capture, admin screens) is out of
//! scope; this crate is the engine those surfaces call into.

pub mod booking;
pub mod common;
pub mod core;
pub mod device;
pub mod ledger;
pub mod notify;
pub mod payment;
pub mod store;
pub mod sync;

// Re-export public types
pub use core::{AppState, Config};
pub use shared::{AppError, AppResult};

/// Prepare the process environment: load `.env`, ensure the working
/// directory exists, and install the tracing stack.
pub fn setup_environment(config: &Config) -> anyhow::Result<()> {
    std::fs::create_dir_all(&config.work_dir)?;
    common::logger::init(config)?;
    Ok(())
}
