//! Decoding of spreadsheet and CSV bytes into a plain string grid.

use std::io::Cursor;

use calamine::{open_workbook_auto_from_rs, Data, Reader};
use encoding_rs::WINDOWS_1252;
use tracing::debug;
use utils::normalize::excel_serial_to_date;

use crate::error::{ParseError, Result};

pub type Grid = Vec<Vec<String>>;

/// Reads every sheet of an xlsx/xls/ods workbook, in workbook order.
pub fn read_workbook(bytes: &[u8]) -> Result<Vec<(String, Grid)>> {
    let mut workbook = open_workbook_auto_from_rs(Cursor::new(bytes.to_vec()))
        .map_err(|e| ParseError::Spreadsheet(e.to_string()))?;

    let sheet_names = workbook.sheet_names().to_vec();
    let mut out = Vec::with_capacity(sheet_names.len());
    for name in sheet_names {
        let range = match workbook.worksheet_range(&name) {
            Ok(r) => r,
            Err(e) => {
                debug!(sheet = %name, error = %e, "Skipping unreadable sheet");
                continue;
            }
        };
        let grid: Grid = range
            .rows()
            .map(|row| row.iter().map(cell_to_string).collect())
            .collect();
        out.push((name, grid));
    }

    if out.is_empty() {
        return Err(ParseError::unreadable("workbook contains no readable sheets"));
    }
    Ok(out)
}

/// Prefers a sheet named like "Account Statement", else the first one.
pub fn select_sheet(names: &[String]) -> Option<usize> {
    if names.is_empty() {
        return None;
    }
    let idx = names
        .iter()
        .position(|n| {
            let lower = n.to_lowercase();
            lower.contains("account") || lower.contains("statement")
        })
        .unwrap_or(0);
    Some(idx)
}

pub fn cell_to_string(c: &Data) -> String {
    match c {
        Data::Empty => String::new(),
        Data::String(s) => s.trim().to_string(),
        Data::Float(f) => f.to_string(),
        Data::Int(i) => i.to_string(),
        Data::Bool(b) => b.to_string(),
        Data::DateTime(dt) => excel_serial_to_date(dt.as_f64())
            .map(|d| d.format("%Y-%m-%d").to_string())
            .unwrap_or_else(|| dt.as_f64().to_string()),
        Data::DateTimeIso(s) => s.trim().to_string(),
        _ => c.to_string(),
    }
}

/// Bank CSV exports are UTF-8 or Windows-1252, sometimes with a BOM.
pub fn decode_text_lossy(bytes: &[u8]) -> String {
    let bytes = bytes.strip_prefix(&[0xEF, 0xBB, 0xBF]).unwrap_or(bytes);
    if let Ok(s) = std::str::from_utf8(bytes) {
        return s.to_string();
    }
    let (decoded, _, _) = WINDOWS_1252.decode(bytes);
    decoded.into_owned()
}

/// Picks the delimiter from the header line, or the first non-empty line
/// when no header is present.
fn sniff_delimiter(text: &str) -> u8 {
    let line = text
        .lines()
        .find(|l| {
            let lower = l.to_lowercase();
            lower.contains("transaction date") || lower.contains("txn date")
        })
        .or_else(|| text.lines().find(|l| !l.trim().is_empty()))
        .unwrap_or("");

    [b',', b';', b'\t', b'|']
        .into_iter()
        .max_by_key(|d| line.matches(*d as char).count())
        .filter(|d| line.contains(*d as char))
        .unwrap_or(b',')
}

/// Reads CSV bytes into a grid. Preamble lines above the table are kept as
/// rows so the extractor can scrape metadata from them.
pub fn read_csv(bytes: &[u8]) -> Result<Grid> {
    let text = decode_text_lossy(bytes);
    let delimiter = sniff_delimiter(&text);

    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .delimiter(delimiter)
        .trim(csv::Trim::All)
        .from_reader(text.as_bytes());

    let mut grid = Grid::new();
    for record in reader.records() {
        let record = record?;
        grid.push(record.iter().map(|s| s.to_string()).collect());
    }
    Ok(grid)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_select_sheet() {
        let names = vec!["Summary".to_string(), "Account Statement".to_string()];
        assert_eq!(select_sheet(&names), Some(1));
        let names = vec!["Sheet1".to_string(), "Sheet2".to_string()];
        assert_eq!(select_sheet(&names), Some(0));
        assert_eq!(select_sheet(&[]), None);
    }

    #[test]
    fn test_read_csv_semicolon() {
        let csv = "Account No: 1234\n\
                   Transaction Date;Description;Debit;Credit\n\
                   01/02/2026;\"ZOMATO; ORDER\";450.00;\n";
        let grid = read_csv(csv.as_bytes()).unwrap();
        assert_eq!(grid.len(), 3);
        assert_eq!(grid[1][0], "Transaction Date");
        assert_eq!(grid[2][1], "ZOMATO; ORDER");
        assert_eq!(grid[2][3], "");
    }

    #[test]
    fn test_decode_windows_1252() {
        let bytes = b"Caf\xe9 Coffee";
        assert_eq!(decode_text_lossy(bytes), "Café Coffee");
        assert_eq!(decode_text_lossy("\u{feff}abc".as_bytes()), "abc");
    }

    #[test]
    fn test_cell_to_string() {
        assert_eq!(cell_to_string(&Data::Empty), "");
        assert_eq!(cell_to_string(&Data::Float(2500.5)), "2500.5");
        assert_eq!(cell_to_string(&Data::String("  x ".into())), "x");
    }

    #[test]
    fn test_garbage_workbook_is_error() {
        assert!(read_workbook(b"definitely not a workbook").is_err());
    }
}
