use std::sync::Arc;
use std::time::Duration;

use mongodb::bson::oid::ObjectId;

use crate::config::Config;
use crate::import::ImportEngine;
use crate::models::{ImportError, ImportJob, ImportStatus, Result};
use crate::storage::ImportStore;

/// Read-only progress snapshot surfaced to callers while a job runs.
#[derive(Debug, Clone)]
pub struct ImportProgress {
    pub status: ImportStatus,
    pub processed_rows: i64,
    pub total_rows: Option<i64>,
    pub fraction: f64,
    pub errors_count: i64,
}

impl From<&ImportJob> for ImportProgress {
    fn from(job: &ImportJob) -> Self {
        Self {
            status: job.status,
            processed_rows: job.processed_rows,
            total_rows: job.total_rows,
            fraction: job.progress_fraction(),
            errors_count: job.failed_rows,
        }
    }
}

/// Drives a job to completion by polling its state and re-invoking the
/// engine whenever a chunk hands control back. The engine's per-job
/// in-flight guard prevents a second continuation from overlapping one
/// already running.
pub struct ImportPoller {
    engine: Arc<ImportEngine>,
    store: Arc<dyn ImportStore>,
    interval: Duration,
}

impl ImportPoller {
    pub fn new(engine: Arc<ImportEngine>, store: Arc<dyn ImportStore>, interval: Duration) -> Self {
        Self {
            engine,
            store,
            interval,
        }
    }

    /// Poller with the configured `IMPORT_POLL_INTERVAL_MS` interval.
    pub fn from_config(
        engine: Arc<ImportEngine>,
        store: Arc<dyn ImportStore>,
        cfg: &Config,
    ) -> Self {
        Self::new(engine, store, cfg.poll_interval())
    }

    pub async fn progress(&self, job_id: ObjectId) -> Result<ImportProgress> {
        let job = self
            .store
            .load_job(job_id)
            .await?
            .ok_or_else(|| ImportError::JobNotFound(job_id.to_hex()))?;
        Ok(ImportProgress::from(&job))
    }

    /// Polls until the job reaches `completed` or `failed`, triggering the
    /// next chunk whenever the job reports `chunk_completed`. Returns the
    /// terminal job state.
    pub async fn poll_until_terminal(&self, job_id: ObjectId) -> Result<ImportJob> {
        loop {
            let job = self
                .store
                .load_job(job_id)
                .await?
                .ok_or_else(|| ImportError::JobNotFound(job_id.to_hex()))?;

            if job.status.is_terminal() {
                return Ok(job);
            }

            if job.status == ImportStatus::ChunkCompleted {
                let next_offset = job.chunk_metadata.as_ref().map(|m| m.next_offset);
                match self.engine.process_chunk(job_id, next_offset).await {
                    Ok(_) => continue,
                    // Another continuation is already in flight; just wait.
                    Err(ImportError::JobBusy(_)) => {}
                    // Fatal errors have already marked the job failed; the
                    // next poll observes the terminal state.
                    Err(err) => {
                        tracing::warn!(job_id = %job_id.to_hex(), error = %err, "continuation failed");
                    }
                }
            }

            tokio::time::sleep(self.interval).await;
        }
    }
}
