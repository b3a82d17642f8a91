use mongodb::bson::{oid::ObjectId, DateTime as BsonDateTime};
use serde::{Deserialize, Serialize};

/// Normalized client row ("baseoff" entity). Natural key is the CPF,
/// already digit-stripped and zero-padded to 11 characters by the
/// projector; a row without a resolvable CPF never produces one of these.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClientRecord {
    pub cpf: String,
    pub nome: Option<String>,
    pub telefone1: Option<String>,
    pub telefone2: Option<String>,
    pub telefone3: Option<String>,
    pub banco: Option<String>,
    pub margem_disponivel: Option<f64>,
    pub valor_beneficio: Option<f64>,
    pub uf: Option<String>,
    pub municipio: Option<String>,
    pub numero_beneficio: Option<String>,
    pub especie: Option<String>,
    pub dib: Option<String>,
    pub data_nascimento: Option<String>,
}

/// Normalized contract row, keyed by (cpf, numero_contrato). Requires both
/// halves of the key; the projector drops the row otherwise.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContractRecord {
    pub cpf: String,
    pub numero_contrato: String,
    pub banco: Option<String>,
    pub parcelas_restantes: Option<i64>,
    pub valor_parcela: Option<f64>,
    pub saldo_devedor: Option<f64>,
    pub taxa: Option<f64>,
}

/// Record of a confirmed import, keyed by content hash (plus an optional
/// module tag). Written only after the caller confirms the import; the
/// duplicate guard itself just reads these.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImportedFile {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<ObjectId>,
    pub file_hash: String,
    pub module: Option<String>,
    pub file_name: String,
    pub imported_at: BsonDateTime,
    pub records_imported: i64,
}

impl ImportedFile {
    pub fn new(
        file_hash: String,
        module: Option<String>,
        file_name: String,
        records_imported: i64,
    ) -> Self {
        Self {
            id: None,
            file_hash,
            module,
            file_name,
            imported_at: BsonDateTime::now(),
            records_imported,
        }
    }
}

/// Advisory answer to "has this exact file been imported before". Never
/// blocks a re-import; the caller decides what to do with it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DuplicateCheck {
    pub is_duplicate: bool,
    pub original_import_date: Option<String>,
    pub original_file_name: Option<String>,
    pub records_imported: Option<i64>,
}

impl DuplicateCheck {
    pub fn not_found() -> Self {
        Self {
            is_duplicate: false,
            original_import_date: None,
            original_file_name: None,
            records_imported: None,
        }
    }
}

impl From<&ImportedFile> for DuplicateCheck {
    fn from(rec: &ImportedFile) -> Self {
        Self {
            is_duplicate: true,
            original_import_date: Some(rec.imported_at.to_chrono().to_rfc3339()),
            original_file_name: Some(rec.file_name.clone()),
            records_imported: Some(rec.records_imported),
        }
    }
}
