//! HTTP client for the mirror store (RTDB-style REST).
//!
//! Collections live at `/{collection}.json` as `{id: record}` maps; a
//! wholesale `PUT` replaces the collection, which gives the bridge its
//! delete-then-write overwrite semantics in one call.

use async_trait::async_trait;
use reqwest::Client;
use serde_json::{Map, Value};
use shared::{AppError, AppResult};
use std::time::Duration;

use super::{Collection, MirrorStore, record_id};

#[derive(Clone)]
pub struct HttpMirror {
    client: Client,
    base_url: String,
}

impl HttpMirror {
    pub fn new(base_url: impl Into<String>, timeout_ms: u64) -> AppResult<Self> {
        let client = Client::builder()
            .timeout(Duration::from_millis(timeout_ms))
            .build()
            .map_err(|e| AppError::internal(format!("HTTP client build failed: {e}")))?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    fn collection_url(&self, collection: Collection) -> String {
        format!("{}/{}.json", self.base_url, collection.path())
    }

    fn record_url(&self, collection: Collection, id: &str) -> String {
        format!("{}/{}/{id}.json", self.base_url, collection.path())
    }

    fn transport(e: reqwest::Error) -> AppError {
        AppError::store(format!("Mirror request failed: {e}"))
    }

    fn check(status: reqwest::StatusCode) -> AppResult<()> {
        if status.is_success() {
            Ok(())
        } else {
            Err(AppError::store(format!("Mirror error {status}")))
        }
    }
}

#[async_trait]
impl MirrorStore for HttpMirror {
    async fn put_collection(&self, collection: Collection, records: Vec<Value>) -> AppResult<()> {
        let mut map = Map::new();
        for record in records {
            if let Some(id) = record_id(&record) {
                map.insert(id.to_string(), record.clone());
            }
        }
        let response = self
            .client
            .put(self.collection_url(collection))
            .json(&Value::Object(map))
            .send()
            .await
            .map_err(Self::transport)?;
        Self::check(response.status())
    }

    async fn upsert(&self, collection: Collection, id: &str, record: Value) -> AppResult<()> {
        let response = self
            .client
            .put(self.record_url(collection, id))
            .json(&record)
            .send()
            .await
            .map_err(Self::transport)?;
        Self::check(response.status())
    }

    async fn remove(&self, collection: Collection, id: &str) -> AppResult<()> {
        let response = self
            .client
            .delete(self.record_url(collection, id))
            .send()
            .await
            .map_err(Self::transport)?;
        Self::check(response.status())
    }

    async fn get_collection(&self, collection: Collection) -> AppResult<Vec<Value>> {
        let response = self
            .client
            .get(self.collection_url(collection))
            .send()
            .await
            .map_err(Self::transport)?;
        Self::check(response.status())?;
        let body: Value = response
            .json()
            .await
            .map_err(|e| AppError::store(format!("Mirror returned invalid JSON: {e}")))?;
        match body {
            Value::Object(map) => Ok(map.into_values().collect()),
            Value::Null => Ok(Vec::new()),
            Value::Array(items) => Ok(items),
            _ => Err(AppError::store("Mirror returned unexpected shape")),
        }
    }
}
