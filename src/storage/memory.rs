use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use mongodb::bson::oid::ObjectId;

use crate::models::{ClientRecord, ContractRecord, ImportError, ImportJob, ImportedFile, Result};
use crate::storage::ImportStore;

/// In-memory store with the same upsert semantics as the Mongo
/// implementation. Used by integration tests to drive the real engine
/// without a database.
#[derive(Default)]
pub struct MemoryImportStore {
    jobs: Mutex<HashMap<ObjectId, ImportJob>>,
    clients: Mutex<HashMap<String, ClientRecord>>,
    contracts: Mutex<HashMap<(String, String), ContractRecord>>,
    imported_files: Mutex<Vec<ImportedFile>>,
    fail_client_writes: AtomicBool,
    fail_contract_writes: AtomicBool,
    // 0 = disabled, n > 0 = fail the n-th upcoming save_job call once.
    fail_job_save_at: AtomicI64,
}

impl MemoryImportStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes client-buffer flushes fail, for exercising write isolation.
    pub fn fail_client_writes(&self, fail: bool) {
        self.fail_client_writes.store(fail, Ordering::SeqCst);
    }

    pub fn fail_contract_writes(&self, fail: bool) {
        self.fail_contract_writes.store(fail, Ordering::SeqCst);
    }

    /// Makes the n-th upcoming `save_job` call fail once, for exercising
    /// transient persistence outages mid-chunk.
    pub fn fail_job_save_number(&self, n: i64) {
        self.fail_job_save_at.store(n, Ordering::SeqCst);
    }

    pub fn client_count(&self) -> usize {
        self.clients.lock().unwrap().len()
    }

    pub fn contract_count(&self) -> usize {
        self.contracts.lock().unwrap().len()
    }

    pub fn client(&self, cpf: &str) -> Option<ClientRecord> {
        self.clients.lock().unwrap().get(cpf).cloned()
    }

    pub fn contract(&self, cpf: &str, numero_contrato: &str) -> Option<ContractRecord> {
        self.contracts
            .lock()
            .unwrap()
            .get(&(cpf.to_string(), numero_contrato.to_string()))
            .cloned()
    }
}

#[async_trait]
impl ImportStore for MemoryImportStore {
    async fn insert_job(&self, job: &ImportJob) -> Result<ObjectId> {
        let id = job.id.unwrap_or_else(ObjectId::new);
        let mut stored = job.clone();
        stored.id = Some(id);
        self.jobs.lock().unwrap().insert(id, stored);
        Ok(id)
    }

    async fn load_job(&self, id: ObjectId) -> Result<Option<ImportJob>> {
        Ok(self.jobs.lock().unwrap().get(&id).cloned())
    }

    async fn save_job(&self, job: &ImportJob) -> Result<()> {
        match self.fail_job_save_at.load(Ordering::SeqCst) {
            1 => {
                self.fail_job_save_at.store(0, Ordering::SeqCst);
                return Err(ImportError::Storage("job save failed".to_string()));
            }
            n if n > 1 => {
                self.fail_job_save_at.fetch_sub(1, Ordering::SeqCst);
            }
            _ => {}
        }
        let id = job
            .id
            .ok_or_else(|| ImportError::Storage("cannot save a job without an id".to_string()))?;
        self.jobs.lock().unwrap().insert(id, job.clone());
        Ok(())
    }

    async fn list_jobs(&self, limit: i64) -> Result<Vec<ImportJob>> {
        let mut jobs: Vec<ImportJob> = self.jobs.lock().unwrap().values().cloned().collect();
        jobs.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        jobs.truncate(limit.max(0) as usize);
        Ok(jobs)
    }

    async fn upsert_clients(&self, records: &[ClientRecord]) -> Result<u64> {
        if self.fail_client_writes.load(Ordering::SeqCst) {
            return Err(ImportError::Storage("client writes disabled".to_string()));
        }
        let mut clients = self.clients.lock().unwrap();
        for record in records {
            clients.insert(record.cpf.clone(), record.clone());
        }
        Ok(records.len() as u64)
    }

    async fn upsert_contracts(&self, records: &[ContractRecord]) -> Result<u64> {
        if self.fail_contract_writes.load(Ordering::SeqCst) {
            return Err(ImportError::Storage("contract writes disabled".to_string()));
        }
        let mut contracts = self.contracts.lock().unwrap();
        for record in records {
            let key = (record.cpf.clone(), record.numero_contrato.clone());
            contracts.insert(key, record.clone());
        }
        Ok(records.len() as u64)
    }

    async fn find_imported_file(
        &self,
        file_hash: &str,
        module: Option<&str>,
    ) -> Result<Option<ImportedFile>> {
        let files = self.imported_files.lock().unwrap();
        Ok(files
            .iter()
            .find(|f| f.file_hash == file_hash && f.module.as_deref() == module)
            .cloned())
    }

    async fn record_imported_file(&self, file: &ImportedFile) -> Result<ObjectId> {
        let id = file.id.unwrap_or_else(ObjectId::new);
        let mut stored = file.clone();
        stored.id = Some(id);
        self.imported_files.lock().unwrap().push(stored);
        Ok(id)
    }
}
