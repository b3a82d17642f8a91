use std::io::Cursor;

use calamine::{Data, Reader, Xlsx};

use crate::models::{ImportError, Result};

/// Decodes an XLSX workbook from memory and yields the used range of the
/// first sheet as stringified rows. Anything calamine cannot open as a
/// workbook is an unsupported format, not a partial parse.
pub fn tokenize(bytes: &[u8]) -> Result<Vec<Vec<String>>> {
    let mut workbook: Xlsx<_> = Xlsx::new(Cursor::new(bytes))
        .map_err(|e| ImportError::UnsupportedFormat(format!("not a readable XLSX workbook: {e}")))?;

    let range = workbook
        .worksheet_range_at(0)
        .ok_or_else(|| ImportError::MalformedInput("workbook has no sheets".to_string()))?
        .map_err(|e| ImportError::Spreadsheet(e.to_string()))?;

    let mut rows = Vec::with_capacity(range.height());
    for row in range.rows() {
        let cells: Vec<String> = row.iter().map(cell_to_string).collect();
        if cells.iter().all(|c| c.is_empty()) {
            continue;
        }
        rows.push(cells);
    }
    Ok(rows)
}

/// Empty cells become empty strings, never a missing column. Integral
/// floats print without the trailing `.0` so numeric CPF/contract columns
/// keep their digit form.
fn cell_to_string(cell: &Data) -> String {
    match cell {
        Data::Empty => String::new(),
        Data::String(s) => s.trim().to_string(),
        Data::Int(i) => i.to_string(),
        Data::Float(f) => {
            if f.fract() == 0.0 && f.abs() < 1e15 {
                format!("{}", *f as i64)
            } else {
                f.to_string()
            }
        }
        Data::Bool(b) => b.to_string(),
        Data::DateTime(dt) => dt.as_f64().to_string(),
        Data::DateTimeIso(s) | Data::DurationIso(s) => s.trim().to_string(),
        Data::Error(_) => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn garbage_bytes_are_an_unsupported_format() {
        let err = tokenize(b"this is not a zip archive").unwrap_err();
        assert!(matches!(err, ImportError::UnsupportedFormat(_)));
    }

    #[test]
    fn integral_floats_render_without_decimal_point() {
        assert_eq!(cell_to_string(&Data::Float(12345678909.0)), "12345678909");
        assert_eq!(cell_to_string(&Data::Float(1.5)), "1.5");
    }

    #[test]
    fn empty_cells_become_empty_strings() {
        assert_eq!(cell_to_string(&Data::Empty), "");
    }
}
