//! Telemetry stores
//!
//! A store accepts records into named collections. Writes are attempted
//! once; a failed write is reported to the caller and never retried here.

use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use reqwest::Client;
use serde_json::{json, Value};
use tokio::io::AsyncWriteExt;
use tracing::debug;
use uuid::Uuid;

use common::error::{Error, Result};

/// Summary persistence; failures are non-fatal to the benchmark
#[async_trait]
pub trait TelemetryStore: Send + Sync {
    /// Creates one record in `collection`
    async fn create(&self, collection: &str, record: Value) -> Result<()>;
}

/// Keeps records in memory
#[derive(Debug, Default)]
pub struct InMemoryTelemetryStore {
    records: Mutex<Vec<(String, Value)>>,
}

impl InMemoryTelemetryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every record created so far, with its collection
    pub fn records(&self) -> Vec<(String, Value)> {
        self.records.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.records.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.lock().is_empty()
    }
}

#[async_trait]
impl TelemetryStore for InMemoryTelemetryStore {
    async fn create(&self, collection: &str, record: Value) -> Result<()> {
        self.records.lock().push((collection.to_string(), record));
        Ok(())
    }
}

/// Appends records to `<dir>/<collection>.jsonl`
#[derive(Debug, Clone)]
pub struct JsonLinesTelemetryStore {
    /// Directory holding one file per collection
    dir: PathBuf,
}

impl JsonLinesTelemetryStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// File backing `collection`
    pub fn collection_path(&self, collection: &str) -> PathBuf {
        self.dir.join(format!("{}.jsonl", collection))
    }

    async fn append(&self, collection: &str, line: String) -> std::io::Result<()> {
        tokio::fs::create_dir_all(&self.dir).await?;
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.collection_path(collection))
            .await?;
        file.write_all(line.as_bytes()).await?;
        file.write_all(b"\n").await?;
        file.flush().await
    }
}

#[async_trait]
impl TelemetryStore for JsonLinesTelemetryStore {
    async fn create(&self, collection: &str, record: Value) -> Result<()> {
        let entry = json!({
            "id": Uuid::new_v4().to_string(),
            "created": Utc::now().to_rfc3339(),
            "record": record,
        });
        let line = serde_json::to_string(&entry)?;

        self.append(collection, line)
            .await
            .map_err(|e| Error::Persistence(format!("Failed to append to {}: {}", collection, e)))?;

        debug!("Appended record to {}", self.collection_path(collection).display());
        Ok(())
    }
}

/// Time allowed to establish a connection
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Creates records through `POST {base_url}/api/collections/{collection}/records`
#[derive(Debug, Clone)]
pub struct HttpTelemetryStore {
    /// HTTP client
    client: Client,

    /// Base URL without trailing slash
    base_url: String,
}

impl HttpTelemetryStore {
    /// Creates a store for `base_url` whose requests end after `timeout`
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .user_agent(concat!("model-bench/", env!("CARGO_PKG_VERSION")))
            .timeout(timeout)
            .connect_timeout(CONNECT_TIMEOUT)
            .build()
            .map_err(|e| Error::Config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self::with_client(client, base_url))
    }

    pub fn with_client(client: Client, base_url: impl Into<String>) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self { client, base_url }
    }

    /// Records endpoint of `collection`
    pub fn records_url(&self, collection: &str) -> String {
        format!("{}/api/collections/{}/records", self.base_url, collection)
    }
}

#[async_trait]
impl TelemetryStore for HttpTelemetryStore {
    async fn create(&self, collection: &str, record: Value) -> Result<()> {
        let url = self.records_url(collection);

        let resp = self
            .client
            .post(&url)
            .json(&record)
            .send()
            .await
            .map_err(|e| Error::Persistence(format!("Failed to reach {}: {}", url, e)))?;

        if !resp.status().is_success() {
            return Err(Error::Persistence(format!(
                "Failed to create record in {}: HTTP {}",
                collection,
                resp.status()
            )));
        }

        debug!("Created record in {}", collection);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_in_memory_store() {
        let store = InMemoryTelemetryStore::new();
        assert!(store.is_empty());

        store.create("Benchmark", json!({"device": "a"})).await.unwrap();
        store.create("Benchmark", json!({"device": "b"})).await.unwrap();

        let records = store.records();
        assert_eq!(store.len(), 2);
        assert_eq!(records[1].0, "Benchmark");
        assert_eq!(records[1].1["device"], "b");
    }

    #[tokio::test]
    async fn test_json_lines_store_appends() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonLinesTelemetryStore::new(dir.path().join("telemetry"));

        store.create("Benchmark", json!({"device": "a"})).await.unwrap();
        store.create("Benchmark", json!({"device": "b"})).await.unwrap();

        let raw = std::fs::read_to_string(store.collection_path("Benchmark")).unwrap();
        let lines: Vec<Value> = raw.lines().map(|line| serde_json::from_str(line).unwrap()).collect();

        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0]["record"]["device"], "a");
        assert!(lines[1]["id"].is_string());
    }

    #[tokio::test]
    async fn test_json_lines_store_failure_is_persistence_error() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("not-a-dir");
        std::fs::write(&blocker, b"").unwrap();

        let result = JsonLinesTelemetryStore::new(&blocker).create("Benchmark", json!({})).await;
        assert!(matches!(result, Err(Error::Persistence(_))));
    }

    #[tokio::test]
    async fn test_http_store_unreachable() {
        let store = HttpTelemetryStore::new("http://127.0.0.1:9/", Duration::from_secs(10)).unwrap();
        assert_eq!(store.records_url("Benchmark"), "http://127.0.0.1:9/api/collections/Benchmark/records");

        let result = store.create("Benchmark", json!({})).await;
        assert!(matches!(result, Err(Error::Persistence(_))));
    }
}
