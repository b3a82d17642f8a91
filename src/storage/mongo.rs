use async_trait::async_trait;
use futures::StreamExt;
use mongodb::bson::{doc, oid::ObjectId, to_document, DateTime as BsonDateTime};
use mongodb::options::{FindOptions, IndexOptions, UpdateOptions};
use mongodb::{Collection, Database, IndexModel};

use crate::models::{
    ClientRecord, ContractRecord, ImportError, ImportJob, ImportedFile, Result,
};
use crate::storage::{ImportStore, RetryPolicy};

const JOBS: &str = "import_jobs";
const CLIENTS: &str = "clients";
const CONTRACTS: &str = "contracts";
const IMPORTED_FILES: &str = "imported_files";

/// Mongo-backed store. Destination upserts go through the retry policy;
/// job-row writes do not, since the driver re-persists job state on the
/// next progress interval anyway.
#[derive(Clone)]
pub struct MongoImportStore {
    db: Database,
    retry: RetryPolicy,
}

impl MongoImportStore {
    pub fn new(db: Database, retry: RetryPolicy) -> Self {
        Self { db, retry }
    }

    fn jobs(&self) -> Collection<ImportJob> {
        self.db.collection(JOBS)
    }

    /// Creates the indexes the pipeline depends on: natural-key lookups on
    /// the destination collections and the hash lookup for the duplicate
    /// guard. Safe to call on every startup.
    pub async fn ensure_indexes(&self) -> Result<()> {
        let unique = |keys| {
            IndexModel::builder()
                .keys(keys)
                .options(IndexOptions::builder().unique(true).build())
                .build()
        };

        self.db
            .collection::<ClientRecord>(CLIENTS)
            .create_index(unique(doc! { "cpf": 1 }), None)
            .await?;
        self.db
            .collection::<ContractRecord>(CONTRACTS)
            .create_index(unique(doc! { "cpf": 1, "numero_contrato": 1 }), None)
            .await?;
        self.db
            .collection::<ImportedFile>(IMPORTED_FILES)
            .create_index(
                IndexModel::builder()
                    .keys(doc! { "file_hash": 1, "module": 1 })
                    .build(),
                None,
            )
            .await?;
        self.jobs()
            .create_index(IndexModel::builder().keys(doc! { "created_at": -1 }).build(), None)
            .await?;

        tracing::info!("database indexes ensured");
        Ok(())
    }

    async fn upsert_batch<T: serde::Serialize>(
        &self,
        collection: &str,
        records: &[T],
        filter_for: impl Fn(&T) -> mongodb::bson::Document,
    ) -> Result<u64> {
        let coll = self.db.collection::<mongodb::bson::Document>(collection);
        let options = UpdateOptions::builder().upsert(true).build();
        let mut written = 0u64;
        for record in records {
            let mut body = to_document(record)?;
            body.insert("updated_at", BsonDateTime::now());
            let filter = filter_for(record);
            let update = doc! {
                "$set": body,
                "$setOnInsert": { "created_at": BsonDateTime::now() },
            };
            let coll = coll.clone();
            let options = options.clone();
            self.retry
                .run(collection, || {
                    let coll = coll.clone();
                    let filter = filter.clone();
                    let update = update.clone();
                    let options = options.clone();
                    async move {
                        coll.update_one(filter, update, options).await?;
                        Ok(())
                    }
                })
                .await?;
            written += 1;
        }
        Ok(written)
    }
}

#[async_trait]
impl ImportStore for MongoImportStore {
    async fn insert_job(&self, job: &ImportJob) -> Result<ObjectId> {
        let result = self.jobs().insert_one(job, None).await?;
        result
            .inserted_id
            .as_object_id()
            .ok_or_else(|| ImportError::Storage("inserted job id is not an ObjectId".to_string()))
    }

    async fn load_job(&self, id: ObjectId) -> Result<Option<ImportJob>> {
        self.jobs()
            .find_one(doc! { "_id": id }, None)
            .await
            .map_err(Into::into)
    }

    async fn save_job(&self, job: &ImportJob) -> Result<()> {
        let id = job
            .id
            .ok_or_else(|| ImportError::Storage("cannot save a job without an id".to_string()))?;
        self.jobs()
            .replace_one(doc! { "_id": id }, job, None)
            .await?;
        Ok(())
    }

    async fn list_jobs(&self, limit: i64) -> Result<Vec<ImportJob>> {
        let options = FindOptions::builder()
            .sort(doc! { "created_at": -1 })
            .limit(limit)
            .build();
        let mut cursor = self.jobs().find(None, options).await?;
        let mut jobs = Vec::new();
        while let Some(job) = cursor.next().await {
            jobs.push(job?);
        }
        Ok(jobs)
    }

    async fn upsert_clients(&self, records: &[ClientRecord]) -> Result<u64> {
        self.upsert_batch(CLIENTS, records, |r| doc! { "cpf": &r.cpf })
            .await
    }

    async fn upsert_contracts(&self, records: &[ContractRecord]) -> Result<u64> {
        self.upsert_batch(CONTRACTS, records, |r| {
            doc! { "cpf": &r.cpf, "numero_contrato": &r.numero_contrato }
        })
        .await
    }

    async fn find_imported_file(
        &self,
        file_hash: &str,
        module: Option<&str>,
    ) -> Result<Option<ImportedFile>> {
        let mut filter = doc! { "file_hash": file_hash };
        if let Some(module) = module {
            filter.insert("module", module);
        }
        self.db
            .collection::<ImportedFile>(IMPORTED_FILES)
            .find_one(filter, None)
            .await
            .map_err(Into::into)
    }

    async fn record_imported_file(&self, file: &ImportedFile) -> Result<ObjectId> {
        let result = self
            .db
            .collection::<ImportedFile>(IMPORTED_FILES)
            .insert_one(file, None)
            .await?;
        result
            .inserted_id
            .as_object_id()
            .ok_or_else(|| ImportError::Storage("inserted file id is not an ObjectId".to_string()))
    }
}
