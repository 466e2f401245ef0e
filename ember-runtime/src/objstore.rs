//! Object storage client.
//!
//! The in-VM agent owns the actual file sync; the orchestrator only lists and
//! clears per-server prefixes (fresh installs start from an empty tree).

use async_trait::async_trait;
use reqwest::Method;
use serde_json::Value;
use std::time::Duration;

use crate::error::{EmberError, Result};
use crate::http::{auth_headers, build_url, parse_json, send_json};

#[async_trait]
pub trait ObjectStore: Send + Sync {
    async fn list(&self, prefix: &str) -> Result<Vec<String>>;
    async fn delete(&self, key: &str) -> Result<()>;
}

/// Remove every object under a prefix. Idempotent: an already-empty prefix
/// lists zero keys.
pub async fn clear_prefix(store: &dyn ObjectStore, prefix: &str) -> Result<usize> {
    let keys = store.list(prefix).await?;
    let count = keys.len();
    for key in keys {
        store.delete(&key).await?;
    }
    Ok(count)
}

/// Client for an S3-compatible gateway exposing bucket listing as JSON.
pub struct HttpObjectStore {
    base: String,
    bucket: String,
    access_key: String,
    timeout: Duration,
}

impl HttpObjectStore {
    pub fn new(base: String, bucket: String, access_key: String, timeout: Duration) -> Self {
        Self {
            base,
            bucket,
            access_key,
            timeout,
        }
    }
}

#[async_trait]
impl ObjectStore for HttpObjectStore {
    async fn list(&self, prefix: &str) -> Result<Vec<String>> {
        let url = build_url(
            &self.base,
            &format!("/{}?list-type=2&prefix={prefix}&format=json", self.bucket),
        )?;
        let headers = auth_headers(&self.access_key)?;
        let (status, text) = send_json(Method::GET, url, None, headers, self.timeout)
            .await
            .map_err(EmberError::ObjectStorage)?;
        if !status.is_success() {
            return Err(EmberError::ObjectStorage(format!(
                "list {prefix}: HTTP {status}: {text}"
            )));
        }
        let body = parse_json(&text, EmberError::ObjectStorage)?;
        let keys = body
            .get("contents")
            .and_then(Value::as_array)
            .map(|entries| {
                entries
                    .iter()
                    .filter_map(|e| e.get("key").and_then(Value::as_str))
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();
        Ok(keys)
    }

    async fn delete(&self, key: &str) -> Result<()> {
        let url = build_url(&self.base, &format!("/{}/{key}", self.bucket))?;
        let headers = auth_headers(&self.access_key)?;
        let (status, text) = send_json(Method::DELETE, url, None, headers, self.timeout)
            .await
            .map_err(EmberError::ObjectStorage)?;
        if !status.is_success() && status.as_u16() != 404 {
            return Err(EmberError::ObjectStorage(format!(
                "delete {key}: HTTP {status}: {text}"
            )));
        }
        Ok(())
    }
}
