//! Store layer
//!
//! Three stores with strictly ordered trust:
//!
//! 1. authoritative backend ([`BackendStore`]) — source of truth, REST/JSON;
//! 2. mirror ([`MirrorStore`]) — advisory, eventually consistent, overwritten
//!    by the sync bridge;
//! 3. client-local cache ([`cache::LocalCache`]) — optimistic write-ahead
//!    copy, last-resort read fallback.
//!
//! Transport failures (non-2xx, non-JSON, timeout) surface as
//! [`AppError::StoreUnreachable`], never as domain errors, so callers can
//! fall through the chain.

pub mod backend;
pub mod cache;
pub mod fallback;
pub mod memory;
pub mod mirror;

pub use backend::HttpBackend;
pub use cache::LocalCache;
pub use fallback::FallbackReader;
pub use memory::{MemoryBackend, MemoryMirror};
pub use mirror::HttpMirror;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde_json::Value;
use shared::models::Locker;
use shared::{AppError, AppResult};
use std::fmt;

/// Resource collections exposed by the authoritative store and mirrored
/// one-to-one into the mirror store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Collection {
    Users,
    Lockers,
    BoxCategories,
    /// Bookings live in the backend's `transactions` collection.
    Transactions,
    Payments,
    Devices,
    LockerLogs,
    Packages,
}

impl Collection {
    pub const ALL: [Collection; 8] = [
        Collection::Users,
        Collection::Lockers,
        Collection::BoxCategories,
        Collection::Transactions,
        Collection::Payments,
        Collection::Devices,
        Collection::LockerLogs,
        Collection::Packages,
    ];

    /// URL path segment / mirror key for this collection.
    pub fn path(&self) -> &'static str {
        match self {
            Collection::Users => "users",
            Collection::Lockers => "lockers",
            Collection::BoxCategories => "box-categories",
            Collection::Transactions => "transactions",
            Collection::Payments => "payments",
            Collection::Devices => "devices",
            Collection::LockerLogs => "locker-logs",
            Collection::Packages => "packages",
        }
    }
}

impl fmt::Display for Collection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.path())
    }
}

/// Authoritative store operations.
///
/// Records are JSON objects carrying an `"id"` field; typed callers decode
/// with [`decode`]. `adjust_availability` is the one non-CRUD primitive: an
/// atomic, server-side conditional update of a locker's availability counter
/// (clamped to `[0, total]`, status recomputed), so no client ever performs
/// a read-then-write on the shared counter.
#[async_trait]
pub trait BackendStore: Send + Sync {
    async fn list(&self, collection: Collection) -> AppResult<Vec<Value>>;
    async fn get(&self, collection: Collection, id: &str) -> AppResult<Option<Value>>;
    async fn create(&self, collection: Collection, record: Value) -> AppResult<Value>;
    async fn update(&self, collection: Collection, id: &str, patch: Value) -> AppResult<Value>;
    async fn delete(&self, collection: Collection, id: &str) -> AppResult<()>;

    /// Atomically add `delta` to a locker's availability.
    ///
    /// Fails with [`AppError::Unavailable`] when a decrement is requested
    /// and the locker has no free unit or is not in rentable status.
    /// Returns the locker as updated by the store.
    async fn adjust_availability(&self, locker_id: &str, delta: i32) -> AppResult<Locker>;
}

/// Mirror store operations. Advisory only: every method may fail without
/// consequence for the triggering write.
#[async_trait]
pub trait MirrorStore: Send + Sync {
    /// Wholesale overwrite of a collection (delete-then-write semantics).
    async fn put_collection(&self, collection: Collection, records: Vec<Value>) -> AppResult<()>;
    async fn upsert(&self, collection: Collection, id: &str, record: Value) -> AppResult<()>;
    async fn remove(&self, collection: Collection, id: &str) -> AppResult<()>;
    async fn get_collection(&self, collection: Collection) -> AppResult<Vec<Value>>;
}

/// Decode a raw store record into a model type.
pub fn decode<T: DeserializeOwned>(record: Value) -> AppResult<T> {
    serde_json::from_value(record)
        .map_err(|e| AppError::internal(format!("Malformed store record: {e}")))
}

/// Encode a model into a raw store record.
pub fn encode<T: serde::Serialize>(model: &T) -> AppResult<Value> {
    serde_json::to_value(model)
        .map_err(|e| AppError::internal(format!("Unencodable record: {e}")))
}

/// Extract the `"id"` field of a raw record.
pub fn record_id(record: &Value) -> Option<&str> {
    record.get("id").and_then(Value::as_str)
}
