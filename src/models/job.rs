use mongodb::bson::{oid::ObjectId, DateTime as BsonDateTime};
use serde::{Deserialize, Serialize};

use crate::models::{ImportFormat, ImportStatus};

/// One bulk-import job. Created when an uploaded file is accepted, then
/// mutated exclusively by the import engine until it reaches a terminal
/// status. Never deleted here; retention is an external concern.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImportJob {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<ObjectId>,
    pub file_name: String,
    pub storage_path: String,
    pub size_mb: f64,
    pub format: ImportFormat,
    pub status: ImportStatus,
    pub total_rows: Option<i64>,
    pub processed_rows: i64,
    /// Monotonically non-decreasing; the engine treats it as the floor for
    /// any continuation offset, so chunks can never run out of order.
    pub last_processed_offset: i64,
    pub failed_rows: i64,
    pub chunk_metadata: Option<ChunkMetadata>,
    pub error_log: Vec<ImportErrorEntry>,
    pub processing_started_at: Option<BsonDateTime>,
    pub processing_ended_at: Option<BsonDateTime>,
    pub created_at: BsonDateTime,
    pub updated_at: BsonDateTime,
}

/// Continuation handle persisted between chunk invocations.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkMetadata {
    pub next_offset: i64,
    pub rows_remaining: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImportErrorEntry {
    /// Absolute line in the source file; the header is line 1, so data row
    /// `i` (0-indexed) reports as `i + 2`. Job-level failures use line 0.
    pub line: i64,
    pub error: String,
    pub timestamp: BsonDateTime,
}

impl ImportErrorEntry {
    pub fn new(line: i64, error: impl Into<String>) -> Self {
        Self {
            line,
            error: error.into(),
            timestamp: BsonDateTime::now(),
        }
    }
}

impl ImportJob {
    pub fn new(file_name: String, storage_path: String, size_mb: f64, format: ImportFormat) -> Self {
        let now = BsonDateTime::now();
        Self {
            id: None,
            file_name,
            storage_path,
            size_mb,
            format,
            status: ImportStatus::Uploaded,
            total_rows: None,
            processed_rows: 0,
            last_processed_offset: 0,
            failed_rows: 0,
            chunk_metadata: None,
            error_log: Vec::new(),
            processing_started_at: None,
            processing_ended_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Marks the job as processing. The start timestamp is only stamped on
    /// the first invocation so resumed chunks keep the original start.
    pub fn begin_processing(&mut self) {
        self.status = ImportStatus::Processing;
        if self.processing_started_at.is_none() {
            self.processing_started_at = Some(BsonDateTime::now());
        }
        self.touch();
    }

    pub fn record_progress(&mut self, processed_rows: i64, offset: i64) {
        self.processed_rows = processed_rows;
        self.last_processed_offset = self.last_processed_offset.max(offset);
        self.touch();
    }

    /// Appends row errors, keeping only the most recent `cap` entries.
    pub fn push_errors<I>(&mut self, entries: I, cap: usize)
    where
        I: IntoIterator<Item = ImportErrorEntry>,
    {
        for entry in entries {
            self.failed_rows += 1;
            self.error_log.push(entry);
        }
        if self.error_log.len() > cap {
            let excess = self.error_log.len() - cap;
            self.error_log.drain(..excess);
        }
    }

    pub fn complete_chunk(&mut self, next_offset: i64, rows_remaining: i64) {
        self.status = ImportStatus::ChunkCompleted;
        self.chunk_metadata = Some(ChunkMetadata {
            next_offset,
            rows_remaining,
        });
        self.touch();
    }

    pub fn complete(&mut self) {
        self.status = ImportStatus::Completed;
        self.chunk_metadata = None;
        self.processing_ended_at = Some(BsonDateTime::now());
        self.touch();
    }

    pub fn fail(&mut self, message: impl Into<String>) {
        self.status = ImportStatus::Failed;
        self.error_log.push(ImportErrorEntry::new(0, message));
        self.processing_ended_at = Some(BsonDateTime::now());
        self.touch();
    }

    /// Fraction in [0, 1]; safe before `total_rows` is known.
    pub fn progress_fraction(&self) -> f64 {
        let total = self.total_rows.unwrap_or(0).max(1);
        self.processed_rows as f64 / total as f64
    }

    fn touch(&mut self) {
        self.updated_at = BsonDateTime::now();
    }
}

/// Per-invocation result returned to the caller driving the chunk loop.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkSummary {
    pub job_id: String,
    pub processed_in_chunk: i64,
    pub total_processed: i64,
    pub total_rows: i64,
    pub is_complete: bool,
    pub next_offset: Option<i64>,
    pub errors_count: i64,
}

impl ChunkSummary {
    pub fn from_job(job: &ImportJob, processed_in_chunk: i64) -> Self {
        Self {
            job_id: job.id.map(|id| id.to_hex()).unwrap_or_default(),
            processed_in_chunk,
            total_processed: job.processed_rows,
            total_rows: job.total_rows.unwrap_or(0),
            is_complete: job.status == ImportStatus::Completed,
            next_offset: job.chunk_metadata.as_ref().map(|m| m.next_offset),
            errors_count: job.failed_rows,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_log_keeps_most_recent_entries() {
        let mut job = ImportJob::new("a.csv".into(), "path".into(), 0.1, ImportFormat::Csv);
        job.push_errors((0..150).map(|i| ImportErrorEntry::new(i + 2, "bad row")), 100);
        assert_eq!(job.error_log.len(), 100);
        assert_eq!(job.failed_rows, 150);
        assert_eq!(job.error_log[0].line, 52);
        assert_eq!(job.error_log[99].line, 151);
    }

    #[test]
    fn begin_processing_does_not_overwrite_start_time() {
        let mut job = ImportJob::new("a.csv".into(), "path".into(), 0.1, ImportFormat::Csv);
        job.begin_processing();
        let first = job.processing_started_at;
        job.complete_chunk(1000, 500);
        job.begin_processing();
        assert_eq!(job.processing_started_at, first);
    }

    #[test]
    fn progress_fraction_is_safe_before_total_known() {
        let job = ImportJob::new("a.csv".into(), "path".into(), 0.1, ImportFormat::Csv);
        assert_eq!(job.progress_fraction(), 0.0);
    }
}
