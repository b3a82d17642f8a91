use serde::{Deserialize, Serialize};

use crate::import::ImportSettings;
use crate::storage::RetryPolicy;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub port: u16,
    pub mongodb_uri: String,
    pub mongodb_retry_writes: bool,
    pub database_name: String,
    pub file_storage_url: String,
    pub http_timeout_ms: u64,
    pub http_max_retries: u32,
    pub http_retry_backoff_ms: u64,
    pub chunk_size: usize,
    pub batch_size: usize,
    pub progress_interval: usize,
    pub error_log_cap: usize,
    pub poll_interval_ms: u64,
    pub cache_ttl_ms: u64,
}

impl Config {
    pub fn from_env() -> Self {
        let get = |k: &str| std::env::var(k).ok();

        let mongodb_uri = get("MONGODB_URI").unwrap_or_else(|| "mongodb://localhost:27017".to_string());
        let mongodb_retry_writes: bool = get("MONGODB_RETRY_WRITES").and_then(|s| s.parse().ok()).unwrap_or(false);
        let database_name = get("DATABASE_NAME").unwrap_or_else(|| "import".to_string());
        let file_storage_url = get("FILE_STORAGE_URL").unwrap_or_else(|| "http://localhost:9000".to_string());
        let port: u16 = get("PORT").and_then(|s| s.parse().ok()).unwrap_or(8091);
        let http_timeout_ms: u64 = get("HTTP_TIMEOUT_MS").and_then(|s| s.parse().ok()).unwrap_or(60000);
        let http_max_retries: u32 = get("HTTP_MAX_RETRIES").and_then(|s| s.parse().ok()).unwrap_or(3);
        let http_retry_backoff_ms: u64 = get("HTTP_RETRY_BACKOFF_MS").and_then(|s| s.parse().ok()).unwrap_or(500);
        // Size knobs are clamped to at least 1; a zero here would stall or
        // panic the chunk driver.
        let chunk_size: usize = get("IMPORT_CHUNK_SIZE").and_then(|s| s.parse().ok()).unwrap_or(20_000).max(1);
        let batch_size: usize = get("IMPORT_BATCH_SIZE").and_then(|s| s.parse().ok()).unwrap_or(500).max(1);
        let progress_interval: usize = get("IMPORT_PROGRESS_INTERVAL").and_then(|s| s.parse().ok()).unwrap_or(1_000).max(1);
        let error_log_cap: usize = get("IMPORT_ERROR_LOG_CAP").and_then(|s| s.parse().ok()).unwrap_or(100);
        let poll_interval_ms: u64 = get("IMPORT_POLL_INTERVAL_MS").and_then(|s| s.parse().ok()).unwrap_or(2_000);
        let cache_ttl_ms: u64 = get("CACHE_TTL_MS").and_then(|s| s.parse().ok()).unwrap_or(30_000);

        Self {
            port,
            mongodb_uri,
            mongodb_retry_writes,
            database_name,
            file_storage_url,
            http_timeout_ms,
            http_max_retries,
            http_retry_backoff_ms,
            chunk_size,
            batch_size,
            progress_interval,
            error_log_cap,
            poll_interval_ms,
            cache_ttl_ms,
        }
    }

    pub fn import_settings(&self) -> ImportSettings {
        ImportSettings {
            chunk_size: self.chunk_size,
            batch_size: self.batch_size,
            progress_interval: self.progress_interval,
            error_log_cap: self.error_log_cap,
        }
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.http_max_retries, self.http_retry_backoff_ms)
    }

    /// Interval for `ImportPoller` instances embedding this service as a
    /// library; the HTTP surface itself leaves polling to its callers.
    pub fn poll_interval(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.poll_interval_ms)
    }
}
