//! Shared types for the locker rental pipeline
//!
//! Domain models, the error taxonomy, and small utilities used by both the
//! kiosk client and any future tooling built on the same collections.

pub mod error;
pub mod models;
pub mod util;

// Re-exports
pub use error::{AppError, AppResult};
pub use serde::{Deserialize, Serialize};
