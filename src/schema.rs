use std::sync::Arc;

use async_graphql::{
    Context, EmptySubscription, Json, Object, Result as GraphQLResult, Schema, ID,
};
use mongodb::bson::oid::ObjectId;
use serde::Deserialize;

use crate::cache::TtlCache;
use crate::dedupe::DuplicateGuard;
use crate::import::ImportEngine;
use crate::models::{ChunkSummary, DuplicateCheck, ImportFormat, ImportJob};
use crate::storage::ImportStore;

pub type ImportSchema = Schema<QueryRoot, MutationRoot, EmptySubscription>;

const HISTORY_CACHE_KEY: &str = "import_history";

/// Shared state handed to every resolver.
pub struct AppState {
    pub engine: Arc<ImportEngine>,
    pub store: Arc<dyn ImportStore>,
    pub duplicate_guard: DuplicateGuard,
    pub history_cache: TtlCache<Vec<ImportJob>>,
}

pub struct QueryRoot;

#[Object]
impl QueryRoot {
    /// Read-only fetch of one import job; this is what pollers hit.
    async fn import_job(&self, ctx: &Context<'_>, id: ID) -> GraphQLResult<Option<ImportJob>> {
        let state = ctx.data::<AppState>()?;
        let object_id = ObjectId::parse_str(&id)?;
        Ok(state.store.load_job(object_id).await?)
    }

    /// Most recent import jobs first.
    async fn import_history(
        &self,
        ctx: &Context<'_>,
        limit: Option<i32>,
    ) -> GraphQLResult<Vec<ImportJob>> {
        let state = ctx.data::<AppState>()?;
        let limit = limit.unwrap_or(20) as i64;
        let key = format!("{HISTORY_CACHE_KEY}:{limit}");
        if let Some(cached) = state.history_cache.get(&key) {
            return Ok(cached);
        }
        let jobs = state.store.list_jobs(limit).await?;
        state.history_cache.insert(key, jobs.clone());
        Ok(jobs)
    }

    /// Advisory duplicate check by content hash; never blocks a re-import.
    async fn check_duplicate_import(
        &self,
        ctx: &Context<'_>,
        file_hash: String,
        module: Option<String>,
    ) -> GraphQLResult<DuplicateCheckResult> {
        let state = ctx.data::<AppState>()?;
        let check = state
            .duplicate_guard
            .check(&file_hash, module.as_deref())
            .await?;
        Ok(DuplicateCheckResult::from(check))
    }

    /// Health check
    async fn health(&self) -> GraphQLResult<String> {
        Ok("OK".to_string())
    }
}

pub struct MutationRoot;

#[derive(Debug, Deserialize)]
struct CreateImportJobInput {
    file_name: String,
    storage_path: String,
    size_mb: f64,
    format: ImportFormat,
}

#[Object]
impl MutationRoot {
    /// Registers an uploaded file as a new import job in `uploaded` state.
    /// Processing starts with the first `processImportChunk` call.
    async fn create_import_job(
        &self,
        ctx: &Context<'_>,
        input: Json<serde_json::Value>,
    ) -> GraphQLResult<ImportJob> {
        let state = ctx.data::<AppState>()?;
        let input: CreateImportJobInput = serde_json::from_value(input.0)?;
        let mut job = ImportJob::new(
            input.file_name,
            input.storage_path,
            input.size_mb,
            input.format,
        );
        let id = state.store.insert_job(&job).await?;
        job.id = Some(id);
        state.history_cache.clear();
        Ok(job)
    }

    /// Runs one chunk of the job. Re-invoke with the returned `nextOffset`
    /// until `isComplete` is true.
    async fn process_import_chunk(
        &self,
        ctx: &Context<'_>,
        id: ID,
        continue_from_offset: Option<i64>,
    ) -> GraphQLResult<ChunkResult> {
        let state = ctx.data::<AppState>()?;
        let object_id = ObjectId::parse_str(&id)?;
        let summary = state
            .engine
            .process_chunk(object_id, continue_from_offset)
            .await?;
        state.history_cache.clear();
        Ok(ChunkResult::from(summary))
    }

    /// Records a confirmed import's content hash so later uploads of the
    /// same file can be flagged as duplicates.
    async fn record_import_hash(
        &self,
        ctx: &Context<'_>,
        file_hash: String,
        file_name: String,
        records_imported: i64,
        module: Option<String>,
    ) -> GraphQLResult<bool> {
        let state = ctx.data::<AppState>()?;
        state
            .duplicate_guard
            .record(file_hash, module, file_name, records_imported)
            .await?;
        Ok(true)
    }
}

// GraphQL output types

#[derive(async_graphql::SimpleObject)]
pub struct ChunkResult {
    pub job_id: ID,
    pub processed_in_chunk: i64,
    pub total_processed: i64,
    pub total_rows: i64,
    pub is_complete: bool,
    pub next_offset: Option<i64>,
    pub errors_count: i64,
}

impl From<ChunkSummary> for ChunkResult {
    fn from(s: ChunkSummary) -> Self {
        Self {
            job_id: ID::from(s.job_id),
            processed_in_chunk: s.processed_in_chunk,
            total_processed: s.total_processed,
            total_rows: s.total_rows,
            is_complete: s.is_complete,
            next_offset: s.next_offset,
            errors_count: s.errors_count,
        }
    }
}

#[derive(async_graphql::SimpleObject)]
pub struct DuplicateCheckResult {
    pub is_duplicate: bool,
    pub original_import_date: Option<String>,
    pub original_file_name: Option<String>,
    pub records_imported: Option<i64>,
}

impl From<DuplicateCheck> for DuplicateCheckResult {
    fn from(c: DuplicateCheck) -> Self {
        Self {
            is_duplicate: c.is_duplicate,
            original_import_date: c.original_import_date,
            original_file_name: c.original_file_name,
            records_imported: c.records_imported,
        }
    }
}

// Convert domain models to GraphQL objects

#[Object]
impl ImportJob {
    async fn id(&self) -> Option<ID> {
        self.id.map(|id| ID::from(id.to_string()))
    }

    async fn file_name(&self) -> &str {
        &self.file_name
    }

    async fn storage_path(&self) -> &str {
        &self.storage_path
    }

    async fn size_mb(&self) -> f64 {
        self.size_mb
    }

    async fn format(&self) -> Json<serde_json::Value> {
        Json(serde_json::to_value(self.format).unwrap_or(serde_json::Value::Null))
    }

    async fn status(&self) -> Json<serde_json::Value> {
        Json(serde_json::to_value(self.status).unwrap_or(serde_json::Value::Null))
    }

    async fn total_rows(&self) -> Option<i64> {
        self.total_rows
    }

    async fn processed_rows(&self) -> i64 {
        self.processed_rows
    }

    async fn last_processed_offset(&self) -> i64 {
        self.last_processed_offset
    }

    async fn errors_count(&self) -> i64 {
        self.failed_rows
    }

    async fn progress(&self) -> f64 {
        self.progress_fraction()
    }

    async fn chunk_metadata(&self) -> Json<serde_json::Value> {
        Json(serde_json::to_value(&self.chunk_metadata).unwrap_or(serde_json::Value::Null))
    }

    async fn error_log(&self) -> Json<serde_json::Value> {
        Json(serde_json::to_value(&self.error_log).unwrap_or(serde_json::Value::Null))
    }

    async fn processing_started_at(&self) -> Option<String> {
        self.processing_started_at.map(|dt| dt.to_chrono().to_rfc3339())
    }

    async fn processing_ended_at(&self) -> Option<String> {
        self.processing_ended_at.map(|dt| dt.to_chrono().to_rfc3339())
    }

    async fn created_at(&self) -> String {
        self.created_at.to_chrono().to_rfc3339()
    }

    async fn updated_at(&self) -> String {
        self.updated_at.to_chrono().to_rfc3339()
    }
}

pub fn build_schema(state: AppState) -> ImportSchema {
    Schema::build(QueryRoot, MutationRoot, EmptySubscription)
        .data(state)
        .finish()
}
