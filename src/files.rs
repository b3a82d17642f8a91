use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use reqwest::Client;

use crate::models::{ImportError, Result};
use crate::storage::RetryPolicy;

/// Source of uploaded file bytes. Invocations are stateless, so the driver
/// re-fetches and re-tokenizes the file on every chunk.
#[async_trait]
pub trait FileStore: Send + Sync {
    async fn fetch(&self, storage_path: &str) -> Result<Vec<u8>>;
}

/// Fetches files over HTTP from the upload storage, with bounded retry on
/// transport failures.
pub struct HttpFileStore {
    client: Client,
    base_url: String,
    retry: RetryPolicy,
}

impl HttpFileStore {
    pub fn new(base_url: String, timeout_ms: u64, retry: RetryPolicy) -> Self {
        let client = Client::builder()
            .timeout(std::time::Duration::from_millis(timeout_ms))
            .connect_timeout(std::time::Duration::from_millis(timeout_ms.min(10_000)))
            .build()
            .expect("Failed to create HTTP client");

        Self {
            client,
            base_url,
            retry,
        }
    }

    fn url_for(&self, storage_path: &str) -> String {
        if storage_path.starts_with("http://") || storage_path.starts_with("https://") {
            storage_path.to_string()
        } else {
            format!(
                "{}/{}",
                self.base_url.trim_end_matches('/'),
                storage_path.trim_start_matches('/')
            )
        }
    }
}

#[async_trait]
impl FileStore for HttpFileStore {
    async fn fetch(&self, storage_path: &str) -> Result<Vec<u8>> {
        let url = self.url_for(storage_path);
        self.retry
            .run("file_fetch", || {
                let client = self.client.clone();
                let url = url.clone();
                async move {
                    let response = client.get(&url).send().await?;
                    if !response.status().is_success() {
                        return Err(ImportError::Storage(format!(
                            "file fetch failed: status={} url={}",
                            response.status(),
                            url
                        )));
                    }
                    let bytes = response.bytes().await?;
                    Ok(bytes.to_vec())
                }
            })
            .await
    }
}

/// In-memory file store for tests.
#[derive(Default)]
pub struct MemoryFileStore {
    files: Mutex<HashMap<String, Vec<u8>>>,
}

impl MemoryFileStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, storage_path: impl Into<String>, bytes: Vec<u8>) {
        self.files.lock().unwrap().insert(storage_path.into(), bytes);
    }
}

#[async_trait]
impl FileStore for MemoryFileStore {
    async fn fetch(&self, storage_path: &str) -> Result<Vec<u8>> {
        self.files
            .lock()
            .unwrap()
            .get(storage_path)
            .cloned()
            .ok_or_else(|| ImportError::Storage(format!("no such file: {storage_path}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn absolute_urls_pass_through() {
        let store = HttpFileStore::new(
            "http://uploads.local".to_string(),
            5_000,
            RetryPolicy::default(),
        );
        assert_eq!(
            store.url_for("https://cdn.example.com/f.csv"),
            "https://cdn.example.com/f.csv"
        );
    }

    #[test]
    fn relative_paths_join_the_base_url() {
        let store = HttpFileStore::new(
            "http://uploads.local/".to_string(),
            5_000,
            RetryPolicy::default(),
        );
        assert_eq!(store.url_for("/imports/f.csv"), "http://uploads.local/imports/f.csv");
    }
}
