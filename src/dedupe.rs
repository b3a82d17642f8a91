use std::sync::Arc;

use sha2::{Digest, Sha256};

use crate::models::{DuplicateCheck, ImportedFile, Result};
use crate::storage::ImportStore;

/// Hex-encoded SHA-256 of the raw file bytes. Cheap relative to parsing
/// and collision-resistant enough to treat equal hashes as the same file.
pub fn file_hash(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}

/// Advisory duplicate detection. `check` only reads; a file becomes a
/// known import only when the caller explicitly records it after a
/// confirmed run, so checking never blocks a deliberate re-import.
pub struct DuplicateGuard {
    store: Arc<dyn ImportStore>,
}

impl DuplicateGuard {
    pub fn new(store: Arc<dyn ImportStore>) -> Self {
        Self { store }
    }

    pub async fn check(&self, file_hash: &str, module: Option<&str>) -> Result<DuplicateCheck> {
        match self.store.find_imported_file(file_hash, module).await? {
            Some(existing) => Ok(DuplicateCheck::from(&existing)),
            None => Ok(DuplicateCheck::not_found()),
        }
    }

    pub async fn record(
        &self,
        file_hash: String,
        module: Option<String>,
        file_name: String,
        records_imported: i64,
    ) -> Result<ImportedFile> {
        let mut file = ImportedFile::new(file_hash, module, file_name, records_imported);
        let id = self.store.record_imported_file(&file).await?;
        file.id = Some(id);
        Ok(file)
    }
}
