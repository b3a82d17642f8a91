pub mod csv;
pub mod headers;
pub mod projector;
pub mod xlsx;

pub use headers::{FieldKey, HeaderMap};
pub use projector::{project_row, ProjectedRow};

use crate::models::{ImportError, ImportFormat, Result};

/// Tokenized file: the header row plus every data row, in file order.
/// Cells are trimmed strings; empty cells are empty strings, never absent.
#[derive(Debug, Clone)]
pub struct TabularFile {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl TabularFile {
    fn from_rows(mut rows: Vec<Vec<String>>) -> Result<Self> {
        if rows.len() < 2 {
            return Err(ImportError::MalformedInput(
                "file must contain a header row and at least one data row".to_string(),
            ));
        }
        let headers = rows.remove(0);
        Ok(Self { headers, rows })
    }
}

/// Tokenizes raw file bytes according to the declared format. Tokenization
/// happens once per invocation; chunking operates on row slices afterwards.
pub fn parse_file(bytes: &[u8], format: ImportFormat) -> Result<TabularFile> {
    let rows = match format {
        ImportFormat::Csv => csv::tokenize(bytes)?,
        ImportFormat::Xlsx => xlsx::tokenize(bytes)?,
    };
    TabularFile::from_rows(rows)
}
