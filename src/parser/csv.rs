use csv::ReaderBuilder;

use crate::models::Result;

/// Tokenizes CSV bytes into trimmed string rows. The delimiter is sniffed
/// from the first non-blank line (Brazilian exports use semicolons as often
/// as commas); quoting follows RFC 4180, so a delimiter inside double
/// quotes is literal content. Blank lines are dropped.
pub fn tokenize(bytes: &[u8]) -> Result<Vec<Vec<String>>> {
    let text = String::from_utf8_lossy(bytes);
    let delimiter = sniff_delimiter(&text);

    let mut reader = ReaderBuilder::new()
        .delimiter(delimiter)
        .has_headers(false)
        .flexible(true)
        .from_reader(text.as_bytes());

    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record?;
        let cells: Vec<String> = record.iter().map(|c| c.trim().to_string()).collect();
        if cells.iter().all(|c| c.is_empty()) {
            continue;
        }
        rows.push(cells);
    }
    Ok(rows)
}

/// Counts candidate delimiters outside quoted spans on the first non-blank
/// line; semicolon wins ties only when it actually appears more often.
fn sniff_delimiter(text: &str) -> u8 {
    let line = match text.lines().find(|l| !l.trim().is_empty()) {
        Some(l) => l,
        None => return b',',
    };
    let mut commas = 0usize;
    let mut semicolons = 0usize;
    let mut in_quotes = false;
    for ch in line.chars() {
        match ch {
            '"' => in_quotes = !in_quotes,
            ',' if !in_quotes => commas += 1,
            ';' if !in_quotes => semicolons += 1,
            _ => {}
        }
    }
    if semicolons > commas {
        b';'
    } else {
        b','
    }
}
