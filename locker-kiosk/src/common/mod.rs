//! Common infrastructure: logging setup.

pub mod logger;

pub use logger::{cleanup_old_logs, init};
