//! HTTP client for the authoritative backend store.

use async_trait::async_trait;
use reqwest::{Client, Method, Response, StatusCode};
use serde_json::Value;
use shared::models::Locker;
use shared::{AppError, AppResult};
use std::time::Duration;

use super::{BackendStore, Collection, decode};

/// REST client for the authoritative store.
///
/// Responses come wrapped in a `{ "success": bool, "data": ... }` envelope;
/// anything non-2xx or non-JSON is a transport failure
/// ([`AppError::StoreUnreachable`]), not a domain failure, so callers fall
/// back instead of aborting.
#[derive(Clone)]
pub struct HttpBackend {
    client: Client,
    base_url: String,
}

impl HttpBackend {
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

    fn url(&self, path: &str) -> String {
        format!("{}/{path}", self.base_url)
    }

    async fn request(&self, method: Method, path: &str, body: Option<&Value>) -> AppResult<Value> {
        let mut req = self.client.request(method, self.url(path));
        if let Some(body) = body {
            req = req.json(body);
        }
        let response = req
            .send()
            .await
            .map_err(|e| AppError::store(format!("Backend request failed: {e}")))?;
        Self::unwrap_envelope(response).await
    }

    /// Validate status + content type and strip the response envelope.
    async fn unwrap_envelope(response: Response) -> AppResult<Value> {
        let status = response.status();
        let is_json = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(|ct| ct.contains("application/json"))
            .unwrap_or(false);

        if !is_json {
            // HTML error pages from a misrouted or down server.
            return Err(AppError::store(format!(
                "Backend returned non-JSON response (status {status})"
            )));
        }

        let body: Value = response
            .json()
            .await
            .map_err(|e| AppError::store(format!("Backend returned invalid JSON: {e}")))?;

        if !status.is_success() {
            // Conflict means the conditional update was rejected, which is
            // the one transport status that carries domain meaning.
            if status == StatusCode::CONFLICT {
                let message = body
                    .get("message")
                    .and_then(Value::as_str)
                    .unwrap_or("conflicting update")
                    .to_string();
                return Err(AppError::unavailable(message));
            }
            let message = body
                .get("message")
                .and_then(Value::as_str)
                .unwrap_or("request rejected");
            return Err(AppError::store(format!("Backend error {status}: {message}")));
        }

        // `{success, data}` envelope, or the bare payload.
        match body.get("data") {
            Some(data) => Ok(data.clone()),
            None => Ok(body),
        }
    }
}

#[async_trait]
impl BackendStore for HttpBackend {
    async fn list(&self, collection: Collection) -> AppResult<Vec<Value>> {
        let data = self.request(Method::GET, collection.path(), None).await?;
        match data {
            Value::Array(items) => Ok(items),
            Value::Null => Ok(Vec::new()),
            other => Ok(vec![other]),
        }
    }

    async fn get(&self, collection: Collection, id: &str) -> AppResult<Option<Value>> {
        let path = format!("{}/{id}", collection.path());
        match self.request(Method::GET, &path, None).await {
            Ok(Value::Null) => Ok(None),
            Ok(record) => Ok(Some(record)),
            Err(AppError::StoreUnreachable(msg)) if msg.contains("404") => Ok(None),
            Err(e) => Err(e),
        }
    }

    async fn create(&self, collection: Collection, record: Value) -> AppResult<Value> {
        self.request(Method::POST, collection.path(), Some(&record))
            .await
    }

    async fn update(&self, collection: Collection, id: &str, patch: Value) -> AppResult<Value> {
        let path = format!("{}/{id}", collection.path());
        self.request(Method::PUT, &path, Some(&patch)).await
    }

    async fn delete(&self, collection: Collection, id: &str) -> AppResult<()> {
        let path = format!("{}/{id}", collection.path());
        self.request(Method::DELETE, &path, None).await?;
        Ok(())
    }

    async fn adjust_availability(&self, locker_id: &str, delta: i32) -> AppResult<Locker> {
        let path = format!("lockers/{locker_id}/availability");
        let body = serde_json::json!({ "change": delta });
        let data = self.request(Method::PATCH, &path, Some(&body)).await?;
        decode(data)
    }
}
