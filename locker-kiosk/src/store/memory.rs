//! In-process store doubles.
//!
//! Back the kiosk when it runs without a reachable backend (offline/demo
//! operation) and carry the integration test suite. `MemoryBackend`
//! implements the same atomic availability semantics the real store
//! enforces server-side.

use async_trait::async_trait;
use serde_json::Value;
use shared::models::{Locker, LockerStatus};
use shared::{AppError, AppResult};
use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};

use super::{BackendStore, Collection, MirrorStore, decode, encode, record_id};

type Collections = HashMap<Collection, HashMap<String, Value>>;

/// In-memory authoritative store.
#[derive(Default)]
pub struct MemoryBackend {
    data: Mutex<Collections>,
    /// When set, every call fails with a transport error. Lets tests take
    /// the backend down mid-flow.
    offline: AtomicBool,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    fn check_online(&self) -> AppResult<()> {
        if self.offline.load(Ordering::SeqCst) {
            Err(AppError::store("Backend offline"))
        } else {
            Ok(())
        }
    }

    /// Seed a typed record, for setup code and tests.
    pub fn seed<T: serde::Serialize>(&self, collection: Collection, model: &T) -> AppResult<()> {
        let record = encode(model)?;
        let id = record_id(&record)
            .ok_or_else(|| AppError::internal("Seed record without id"))?
            .to_string();
        self.data
            .lock()
            .expect("store lock poisoned")
            .entry(collection)
            .or_default()
            .insert(id, record);
        Ok(())
    }
}

#[async_trait]
impl BackendStore for MemoryBackend {
    async fn list(&self, collection: Collection) -> AppResult<Vec<Value>> {
        self.check_online()?;
        let data = self.data.lock().expect("store lock poisoned");
        Ok(data
            .get(&collection)
            .map(|records| records.values().cloned().collect())
            .unwrap_or_default())
    }

    async fn get(&self, collection: Collection, id: &str) -> AppResult<Option<Value>> {
        self.check_online()?;
        let data = self.data.lock().expect("store lock poisoned");
        Ok(data.get(&collection).and_then(|r| r.get(id)).cloned())
    }

    async fn create(&self, collection: Collection, record: Value) -> AppResult<Value> {
        self.check_online()?;
        let id = record_id(&record)
            .ok_or_else(|| AppError::internal("Create without id"))?
            .to_string();
        let mut data = self.data.lock().expect("store lock poisoned");
        data.entry(collection).or_default().insert(id, record.clone());
        Ok(record)
    }

    async fn update(&self, collection: Collection, id: &str, patch: Value) -> AppResult<Value> {
        self.check_online()?;
        let mut data = self.data.lock().expect("store lock poisoned");
        let records = data
            .entry(collection)
            .or_default();
        let record = records
            .get_mut(id)
            .ok_or_else(|| AppError::not_found(format!("{collection} record {id}")))?;
        if let (Value::Object(target), Value::Object(fields)) = (&mut *record, patch) {
            for (key, value) in fields {
                target.insert(key, value);
            }
        }
        Ok(record.clone())
    }

    async fn delete(&self, collection: Collection, id: &str) -> AppResult<()> {
        self.check_online()?;
        let mut data = self.data.lock().expect("store lock poisoned");
        if let Some(records) = data.get_mut(&collection) {
            records.remove(id);
        }
        Ok(())
    }

    async fn adjust_availability(&self, locker_id: &str, delta: i32) -> AppResult<Locker> {
        self.check_online()?;
        let mut data = self.data.lock().expect("store lock poisoned");
        let record = data
            .entry(Collection::Lockers)
            .or_default()
            .get_mut(locker_id)
            .ok_or_else(|| AppError::not_found(format!("Locker {locker_id}")))?;

        let mut locker: Locker = decode(record.clone())?;

        if delta < 0 {
            // The conditional part of the update: rentable-or-reject,
            // evaluated under the same lock as the write.
            if locker.available == 0 || locker.status != LockerStatus::Available {
                return Err(AppError::unavailable(format!(
                    "Locker {} has no free unit",
                    locker.locker_code
                )));
            }
            locker.available -= delta.unsigned_abs().min(locker.available);
        } else {
            locker.available = (locker.available + delta as u32).min(locker.total);
        }
        if locker.status != LockerStatus::Maintenance {
            locker.status = Locker::status_for(locker.available);
        }
        locker.updated_at = shared::util::now_rfc3339();

        *record = encode(&locker)?;
        Ok(locker)
    }
}

/// In-memory mirror store.
#[derive(Default)]
pub struct MemoryMirror {
    data: Mutex<Collections>,
    failing: AtomicBool,
}

impl MemoryMirror {
    pub fn new() -> Self {
        Self::default()
    }

    /// When set, every write fails. Exercises the "sync failure never fails
    /// the triggering write" contract.
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    fn check_healthy(&self) -> AppResult<()> {
        if self.failing.load(Ordering::SeqCst) {
            Err(AppError::store("Mirror unavailable"))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl MirrorStore for MemoryMirror {
    async fn put_collection(&self, collection: Collection, records: Vec<Value>) -> AppResult<()> {
        self.check_healthy()?;
        let mut keyed = HashMap::new();
        for record in records {
            if let Some(id) = record_id(&record) {
                keyed.insert(id.to_string(), record.clone());
            }
        }
        let mut data = self.data.lock().expect("mirror lock poisoned");
        data.insert(collection, keyed);
        Ok(())
    }

    async fn upsert(&self, collection: Collection, id: &str, record: Value) -> AppResult<()> {
        self.check_healthy()?;
        let mut data = self.data.lock().expect("mirror lock poisoned");
        data.entry(collection)
            .or_default()
            .insert(id.to_string(), record);
        Ok(())
    }

    async fn remove(&self, collection: Collection, id: &str) -> AppResult<()> {
        self.check_healthy()?;
        let mut data = self.data.lock().expect("mirror lock poisoned");
        if let Some(records) = data.get_mut(&collection) {
            records.remove(id);
        }
        Ok(())
    }

    async fn get_collection(&self, collection: Collection) -> AppResult<Vec<Value>> {
        self.check_healthy()?;
        let data = self.data.lock().expect("mirror lock poisoned");
        Ok(data
            .get(&collection)
            .map(|records| records.values().cloned().collect())
            .unwrap_or_default())
    }
}
