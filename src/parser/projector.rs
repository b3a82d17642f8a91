use crate::models::{ClientRecord, ContractRecord, ImportError, Result};
use crate::parser::headers::{FieldKey, HeaderMap};

/// Outcome of projecting one raw row. Either side may be absent; a row
/// that resolves neither a client nor a contract is dropped silently.
#[derive(Debug, Default)]
pub struct ProjectedRow {
    pub client: Option<ClientRecord>,
    pub contract: Option<ContractRecord>,
}

impl ProjectedRow {
    pub fn is_empty(&self) -> bool {
        self.client.is_none() && self.contract.is_none()
    }
}

/// Strips non-digits and left-pads to the canonical 11-digit CPF.
/// Empty input yields None. Inputs carrying more than 11 digits cannot
/// be a CPF and surface as a row error rather than a silently truncated
/// key.
pub fn normalize_cpf(raw: &str) -> Result<Option<String>> {
    let digits: String = raw.chars().filter(|c| c.is_ascii_digit()).collect();
    if digits.is_empty() {
        return Ok(None);
    }
    if digits.len() > 11 {
        return Err(ImportError::InvalidRow(format!(
            "cpf has {} digits: {raw:?}",
            digits.len()
        )));
    }
    Ok(Some(format!("{digits:0>11}")))
}

/// Parses a Brazilian-formatted numeric cell. When a comma is present it
/// is the decimal separator and periods are thousand separators; without
/// a comma the period is kept as the decimal point. Unparseable cells
/// yield None.
pub fn normalize_decimal(raw: &str) -> Option<f64> {
    let filtered: String = raw
        .chars()
        .filter(|c| c.is_ascii_digit() || matches!(c, ',' | '.' | '-'))
        .collect();
    if filtered.is_empty() {
        return None;
    }
    let candidate = if filtered.contains(',') {
        filtered.replace('.', "").replace(',', ".")
    } else {
        filtered
    };
    candidate.parse::<f64>().ok()
}

/// Parses an integer cell, tolerating a trailing decimal part some
/// spreadsheet exports attach to whole numbers.
pub fn normalize_integer(raw: &str) -> Option<i64> {
    normalize_decimal(raw).map(|v| v.trunc() as i64)
}

fn text(map: &HeaderMap, row: &[String], key: FieldKey) -> Option<String> {
    map.cell(row, key).map(|s| s.to_string())
}

fn decimal(map: &HeaderMap, row: &[String], key: FieldKey) -> Option<f64> {
    map.cell(row, key).and_then(normalize_decimal)
}

/// Projects one raw row into at most one client and one contract record.
/// A client is emitted only when the CPF resolves; a contract
/// additionally requires a contract number.
pub fn project_row(map: &HeaderMap, row: &[String]) -> Result<ProjectedRow> {
    let cpf = match map.cell(row, FieldKey::Cpf) {
        Some(raw) => normalize_cpf(raw)?,
        None => None,
    };
    let Some(cpf) = cpf else {
        return Ok(ProjectedRow::default());
    };

    let client = ClientRecord {
        cpf: cpf.clone(),
        nome: text(map, row, FieldKey::Nome),
        telefone1: text(map, row, FieldKey::Telefone1),
        telefone2: text(map, row, FieldKey::Telefone2),
        telefone3: text(map, row, FieldKey::Telefone3),
        banco: text(map, row, FieldKey::Banco),
        margem_disponivel: decimal(map, row, FieldKey::MargemDisponivel),
        valor_beneficio: decimal(map, row, FieldKey::ValorBeneficio),
        uf: text(map, row, FieldKey::Uf),
        municipio: text(map, row, FieldKey::Municipio),
        numero_beneficio: text(map, row, FieldKey::NumeroBeneficio),
        especie: text(map, row, FieldKey::Especie),
        dib: text(map, row, FieldKey::Dib),
        data_nascimento: text(map, row, FieldKey::DataNascimento),
    };

    let contract = text(map, row, FieldKey::NumeroContrato).map(|numero_contrato| ContractRecord {
        cpf,
        numero_contrato,
        banco: text(map, row, FieldKey::Banco),
        parcelas_restantes: map
            .cell(row, FieldKey::ParcelasRestantes)
            .and_then(normalize_integer),
        valor_parcela: decimal(map, row, FieldKey::ValorParcela),
        saldo_devedor: decimal(map, row, FieldKey::SaldoDevedor),
        taxa: decimal(map, row, FieldKey::Taxa),
    });

    Ok(ProjectedRow {
        client: Some(client),
        contract,
    })
}
