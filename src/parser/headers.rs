use std::collections::HashMap;

/// Internal schema keys a source column can resolve to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FieldKey {
    Cpf,
    Nome,
    Telefone1,
    Telefone2,
    Telefone3,
    Banco,
    MargemDisponivel,
    ValorBeneficio,
    Uf,
    Municipio,
    NumeroBeneficio,
    Especie,
    Dib,
    DataNascimento,
    NumeroContrato,
    ParcelasRestantes,
    ValorParcela,
    SaldoDevedor,
    Taxa,
}

/// Known label variants per key, in match order. Specific keys come before
/// keys with generic substrings (Telefone3 before Telefone1's bare
/// "telefone", ValorBeneficio and Dib before NumeroBeneficio's bare
/// "beneficio") so a column lands on the most specific key that fits.
/// Variants are written in normalized form: lowercase, underscores as
/// spaces.
const VARIANTS: &[(FieldKey, &[&str])] = &[
    (FieldKey::Cpf, &["cpf"]),
    (FieldKey::Nome, &["nome"]),
    (FieldKey::Telefone3, &["telefone3", "telefone 3", "fone3", "celular3", "tel3"]),
    (FieldKey::Telefone2, &["telefone2", "telefone 2", "fone2", "celular2", "tel2"]),
    (
        FieldKey::Telefone1,
        &["telefone1", "telefone 1", "fone1", "celular1", "tel1", "telefone", "celular", "fone"],
    ),
    (FieldKey::MargemDisponivel, &["margem"]),
    (FieldKey::ValorBeneficio, &["valor beneficio", "vl beneficio", "valor do beneficio"]),
    (FieldKey::Dib, &["dib", "inicio beneficio", "inicio do beneficio"]),
    (
        FieldKey::NumeroBeneficio,
        &["numero beneficio", "num beneficio", "nr beneficio", "nb", "beneficio"],
    ),
    (FieldKey::Banco, &["banco", "cod banco", "codigo banco"]),
    (FieldKey::Uf, &["uf", "estado"]),
    (FieldKey::Municipio, &["municipio", "cidade"]),
    (FieldKey::Especie, &["especie"]),
    (FieldKey::DataNascimento, &["nascimento", "data nasc", "dt nasc"]),
    (
        FieldKey::NumeroContrato,
        &["numero contrato", "num contrato", "nr contrato", "contrato"],
    ),
    (FieldKey::ValorParcela, &["valor parcela", "vl parcela", "valor da parcela"]),
    (
        FieldKey::ParcelasRestantes,
        &["parcelas restantes", "qtd parcelas", "parcelas", "prazo"],
    ),
    (FieldKey::SaldoDevedor, &["saldo"]),
    (FieldKey::Taxa, &["taxa", "juros"]),
];

/// Mapping from internal field key to column index, computed once per file
/// and reused for every row of every chunk.
#[derive(Debug, Clone)]
pub struct HeaderMap {
    columns: HashMap<FieldKey, usize>,
}

impl HeaderMap {
    /// Resolves raw column labels against the variant table. A column maps
    /// to the first key whose variants it contains; once a key is mapped,
    /// later columns cannot remap it. Unknown columns are ignored.
    pub fn resolve(headers: &[String]) -> Self {
        let mut columns = HashMap::new();
        for (index, raw) in headers.iter().enumerate() {
            let label = normalize_label(raw);
            if label.is_empty() {
                continue;
            }
            for (key, variants) in VARIANTS {
                if columns.contains_key(key) {
                    continue;
                }
                if variants.iter().any(|v| label.contains(v)) {
                    columns.insert(*key, index);
                    break;
                }
            }
        }
        Self { columns }
    }

    pub fn index_of(&self, key: FieldKey) -> Option<usize> {
        self.columns.get(&key).copied()
    }

    /// Trimmed, non-empty cell for `key`, or None when the column is
    /// unmapped, missing from this row, or blank.
    pub fn cell<'a>(&self, row: &'a [String], key: FieldKey) -> Option<&'a str> {
        let idx = self.index_of(key)?;
        let cell = row.get(idx)?.trim();
        if cell.is_empty() {
            None
        } else {
            Some(cell)
        }
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }
}

fn normalize_label(raw: &str) -> String {
    let lowered = raw.to_lowercase();
    let spaced: String = lowered
        .chars()
        .map(|c| if c == '_' || c.is_whitespace() { ' ' } else { c })
        .collect();
    spaced.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hdrs(labels: &[&str]) -> Vec<String> {
        labels.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn first_matching_column_wins() {
        let map = HeaderMap::resolve(&hdrs(&["NR_CPF", "cpf_cliente"]));
        assert_eq!(map.index_of(FieldKey::Cpf), Some(0));
    }

    #[test]
    fn labels_are_normalized_before_matching() {
        let map = HeaderMap::resolve(&hdrs(&["  Numero__Do_Contrato ", "VALOR_PARCELA"]));
        assert_eq!(map.index_of(FieldKey::NumeroContrato), Some(0));
        assert_eq!(map.index_of(FieldKey::ValorParcela), Some(1));
    }

    #[test]
    fn numbered_phone_columns_map_to_their_own_keys() {
        let map = HeaderMap::resolve(&hdrs(&["TELEFONE1", "TELEFONE2", "TELEFONE3"]));
        assert_eq!(map.index_of(FieldKey::Telefone1), Some(0));
        assert_eq!(map.index_of(FieldKey::Telefone2), Some(1));
        assert_eq!(map.index_of(FieldKey::Telefone3), Some(2));
    }

    #[test]
    fn bare_telefone_maps_to_the_first_phone() {
        let map = HeaderMap::resolve(&hdrs(&["TELEFONE"]));
        assert_eq!(map.index_of(FieldKey::Telefone1), Some(0));
    }

    #[test]
    fn benefit_columns_resolve_to_the_specific_keys() {
        let map = HeaderMap::resolve(&hdrs(&["VALOR_BENEFICIO", "NR_BENEFICIO", "DIB"]));
        assert_eq!(map.index_of(FieldKey::ValorBeneficio), Some(0));
        assert_eq!(map.index_of(FieldKey::NumeroBeneficio), Some(1));
        assert_eq!(map.index_of(FieldKey::Dib), Some(2));
    }

    #[test]
    fn unknown_columns_are_ignored() {
        let map = HeaderMap::resolve(&hdrs(&["coluna_misteriosa", "outra"]));
        assert!(map.is_empty());
    }
}
