pub mod memory;
pub mod mongo;
pub mod retry;

pub use memory::MemoryImportStore;
pub use mongo::MongoImportStore;
pub use retry::RetryPolicy;

use async_trait::async_trait;
use mongodb::bson::oid::ObjectId;

use crate::models::{ClientRecord, ContractRecord, ImportJob, ImportedFile, Result};

/// Persistence seam for the import pipeline. The production implementation
/// is Mongo-backed; tests drive the same engine against an in-memory
/// store.
#[async_trait]
pub trait ImportStore: Send + Sync {
    async fn insert_job(&self, job: &ImportJob) -> Result<ObjectId>;

    async fn load_job(&self, id: ObjectId) -> Result<Option<ImportJob>>;

    /// Full-document save of a job the caller owns. The driver is the only
    /// writer for a given job id, so replace semantics are safe here.
    async fn save_job(&self, job: &ImportJob) -> Result<()>;

    /// Most recent jobs first.
    async fn list_jobs(&self, limit: i64) -> Result<Vec<ImportJob>>;

    /// Upserts each record on its natural key (cpf). Records in the batch
    /// that target the same key apply in order, last write wins.
    async fn upsert_clients(&self, records: &[ClientRecord]) -> Result<u64>;

    /// Upserts each record on (cpf, numero_contrato).
    async fn upsert_contracts(&self, records: &[ContractRecord]) -> Result<u64>;

    async fn find_imported_file(
        &self,
        file_hash: &str,
        module: Option<&str>,
    ) -> Result<Option<ImportedFile>>;

    async fn record_imported_file(&self, file: &ImportedFile) -> Result<ObjectId>;
}
