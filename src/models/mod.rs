pub mod job;
pub mod records;

pub use job::*;
pub use records::*;
use serde::{Deserialize, Serialize};

/// Declared format of an uploaded file. A file declared as spreadsheet that
/// turns out not to be a readable workbook fails the job with
/// `UnsupportedFormat` rather than being partially parsed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImportFormat {
    Csv,
    Xlsx,
}

/// Job lifecycle: Uploaded -> Processing -> {ChunkCompleted <-> Processing}
/// -> Completed, with Failed reachable from Processing at any point.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ImportStatus {
    Uploaded,
    Processing,
    ChunkCompleted,
    Completed,
    Failed,
}

impl ImportStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, ImportStatus::Completed | ImportStatus::Failed)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ImportError {
    #[error("Database error: {0}")]
    Database(#[from] mongodb::error::Error),

    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("BSON encoding error: {0}")]
    BsonEncoding(#[from] mongodb::bson::ser::Error),

    #[error("CSV parsing error: {0}")]
    CsvParsing(#[from] csv::Error),

    #[error("Spreadsheet parsing error: {0}")]
    Spreadsheet(String),

    #[error("Malformed input: {0}")]
    MalformedInput(String),

    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),

    #[error("Import job not found: {0}")]
    JobNotFound(String),

    #[error("Import job busy: {0}")]
    JobBusy(String),

    #[error("Invalid row: {0}")]
    InvalidRow(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Configuration error: {0}")]
    Configuration(String),
}

pub type Result<T> = std::result::Result<T, ImportError>;
