use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use mongodb::bson::oid::ObjectId;

use crate::files::FileStore;
use crate::import::ImportSettings;
use crate::models::{
    ChunkSummary, ClientRecord, ContractRecord, ImportError, ImportErrorEntry, ImportJob, Result,
};
use crate::parser::{self, HeaderMap, TabularFile};
use crate::storage::ImportStore;

/// Chunked job driver. Each `process_chunk` call handles one bounded slice
/// of the file and persists enough state for the next invocation to
/// resume; the poller (or any external scheduler) drives the loop.
pub struct ImportEngine {
    store: Arc<dyn ImportStore>,
    files: Arc<dyn FileStore>,
    settings: ImportSettings,
    active_jobs: Arc<Mutex<HashSet<ObjectId>>>,
}

struct ActiveJobGuard {
    set: Arc<Mutex<HashSet<ObjectId>>>,
    id: ObjectId,
}

impl Drop for ActiveJobGuard {
    fn drop(&mut self) {
        if let Ok(mut s) = self.set.lock() {
            s.remove(&self.id);
        }
    }
}

impl ImportEngine {
    pub fn new(
        store: Arc<dyn ImportStore>,
        files: Arc<dyn FileStore>,
        settings: ImportSettings,
    ) -> Self {
        Self {
            store,
            files,
            settings,
            active_jobs: Arc::new(Mutex::new(HashSet::new())),
        }
    }

    /// Processes one chunk of the given job, starting from
    /// `continue_from_offset` when supplied, otherwise from the job's
    /// persisted offset. The persisted offset is always the floor, so a
    /// stale or replayed continuation can never reprocess earlier rows.
    pub async fn process_chunk(
        &self,
        job_id: ObjectId,
        continue_from_offset: Option<i64>,
    ) -> Result<ChunkSummary> {
        // One in-flight invocation per job id.
        {
            let mut active = self.active_jobs.lock().expect("Mutex poisoned");
            if active.contains(&job_id) {
                return Err(ImportError::JobBusy(job_id.to_hex()));
            }
            active.insert(job_id);
        }
        let _guard = ActiveJobGuard {
            set: self.active_jobs.clone(),
            id: job_id,
        };

        let mut job = self
            .store
            .load_job(job_id)
            .await?
            .ok_or_else(|| ImportError::JobNotFound(job_id.to_hex()))?;

        if job.status.is_terminal() {
            return Ok(ChunkSummary::from_job(&job, 0));
        }

        match self.run_chunk(&mut job, continue_from_offset).await {
            Ok(summary) => Ok(summary),
            Err(err) => {
                // Fatal for the job: setup or persistence broke, nothing
                // row-level can be salvaged. Best-effort save so the job
                // never stays parked in `processing`.
                tracing::error!(job_id = %job_id.to_hex(), error = %err, "import chunk failed");
                job.fail(err.to_string());
                if let Err(save_err) = self.store.save_job(&job).await {
                    tracing::error!(job_id = %job_id.to_hex(), error = %save_err, "failed to persist failed job state");
                }
                Err(err)
            }
        }
    }

    async fn run_chunk(
        &self,
        job: &mut ImportJob,
        continue_from_offset: Option<i64>,
    ) -> Result<ChunkSummary> {
        let job_id = job.id.map(|id| id.to_hex()).unwrap_or_default();
        job.begin_processing();
        self.store.save_job(job).await?;

        let file = self.load_file(job).await?;

        let headers = HeaderMap::resolve(&file.headers);
        let total_rows = file.rows.len() as i64;
        job.total_rows = Some(total_rows);

        // Misconfigured knobs must never stall or panic the driver.
        let chunk_size = (self.settings.chunk_size as i64).max(1);

        let floor = job.last_processed_offset;
        let start = continue_from_offset.unwrap_or(floor).max(floor).min(total_rows);
        let end = (start + chunk_size).min(total_rows);

        tracing::info!(
            job_id = %job_id,
            file = %job.file_name,
            start_offset = start,
            end_offset = end,
            total_rows,
            "processing import chunk"
        );

        self.process_slice(job, &file, &headers, start, end).await?;

        if end >= total_rows {
            job.complete();
        } else {
            job.complete_chunk(end, total_rows - end);
        }
        self.store.save_job(job).await?;

        let summary = ChunkSummary::from_job(job, end - start);
        tracing::info!(
            job_id = %summary.job_id,
            processed_in_chunk = summary.processed_in_chunk,
            total_processed = summary.total_processed,
            is_complete = summary.is_complete,
            errors = summary.errors_count,
            "chunk finished"
        );
        Ok(summary)
    }

    async fn load_file(&self, job: &ImportJob) -> Result<TabularFile> {
        let bytes = self.files.fetch(&job.storage_path).await?;
        parser::parse_file(&bytes, job.format)
    }

    async fn process_slice(
        &self,
        job: &mut ImportJob,
        file: &TabularFile,
        headers: &HeaderMap,
        start: i64,
        end: i64,
    ) -> Result<()> {
        let mut clients: Vec<ClientRecord> = Vec::new();
        let mut contracts: Vec<ContractRecord> = Vec::new();
        let mut pending_errors: Vec<ImportErrorEntry> = Vec::new();
        let progress_interval = (self.settings.progress_interval as i64).max(1);

        for i in start..end {
            let row = &file.rows[i as usize];
            match parser::project_row(headers, row) {
                Ok(projected) => {
                    if let Some(client) = projected.client {
                        clients.push(client);
                    }
                    if let Some(contract) = projected.contract {
                        contracts.push(contract);
                    }
                }
                Err(err) => {
                    // Row errors never abort the chunk. Header is line 1,
                    // so data row i reports as line i + 2.
                    pending_errors.push(ImportErrorEntry::new(i + 2, err.to_string()));
                }
            }

            if clients.len() >= self.settings.batch_size {
                self.flush_buffers(&mut clients, &mut contracts).await;
            }

            let rows_done = i - start + 1;
            if rows_done % progress_interval == 0 {
                job.record_progress(i + 1, i + 1);
                job.push_errors(pending_errors.drain(..), self.settings.error_log_cap);
                self.store.save_job(job).await?;
                // Keep the invocation cooperative during long slices.
                tokio::task::yield_now().await;
            }
        }

        self.flush_buffers(&mut clients, &mut contracts).await;
        job.record_progress(end, end);
        job.push_errors(pending_errors.drain(..), self.settings.error_log_cap);
        Ok(())
    }

    /// Writes both buffers and clears them. A failure on one buffer is
    /// logged and does not block the other; upserts on natural keys make
    /// replays of the same slice idempotent.
    async fn flush_buffers(
        &self,
        clients: &mut Vec<ClientRecord>,
        contracts: &mut Vec<ContractRecord>,
    ) {
        if !clients.is_empty() {
            if let Err(err) = self.store.upsert_clients(clients).await {
                tracing::error!(records = clients.len(), error = %err, "client batch upsert failed");
            }
            clients.clear();
        }
        if !contracts.is_empty() {
            if let Err(err) = self.store.upsert_contracts(contracts).await {
                tracing::error!(records = contracts.len(), error = %err, "contract batch upsert failed");
            }
            contracts.clear();
        }
    }
}
