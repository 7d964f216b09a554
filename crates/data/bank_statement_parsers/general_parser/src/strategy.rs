use models::{ParserSettings, StatementSummary, Transaction};
use tracing::{debug, info};
use utils::rules::RuleBook;

use crate::classify::classify;
use crate::error::{ParseError, Result, SkippedRow};
use crate::extract::{extract_grid, Extraction};
use crate::pdf::{extract_text, parse_lines};
use crate::sheet::{decode_text_lossy, read_csv, read_workbook, select_sheet};
use crate::{CancellationToken, StatementInput};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileFormat {
    /// xlsx, xlsm, xlsb, xls, ods
    Spreadsheet,
    Csv,
    Pdf,
    /// Statement text that was already extracted elsewhere.
    Text,
}

impl FileFormat {
    fn from_extension(name: &str) -> Option<Self> {
        let ext = name.rsplit_once('.')?.1.to_ascii_lowercase();
        match ext.as_str() {
            "xlsx" | "xlsm" | "xlsb" | "xls" | "ods" => Some(FileFormat::Spreadsheet),
            "csv" => Some(FileFormat::Csv),
            "pdf" => Some(FileFormat::Pdf),
            "txt" => Some(FileFormat::Text),
            _ => None,
        }
    }

    fn from_mime(mime: &str) -> Option<Self> {
        let mime = mime.to_ascii_lowercase();
        if mime == "application/pdf" {
            Some(FileFormat::Pdf)
        } else if mime == "text/csv" {
            Some(FileFormat::Csv)
        } else if mime.contains("spreadsheet") || mime.contains("ms-excel") {
            Some(FileFormat::Spreadsheet)
        } else if mime == "text/plain" {
            Some(FileFormat::Text)
        } else {
            None
        }
    }

    fn from_magic(bytes: &[u8]) -> Option<Self> {
        if bytes.starts_with(b"%PDF") {
            Some(FileFormat::Pdf)
        } else if bytes.starts_with(b"PK\x03\x04") || bytes.starts_with(&[0xD0, 0xCF, 0x11, 0xE0]) {
            Some(FileFormat::Spreadsheet)
        } else {
            None
        }
    }

    /// Extension first, then MIME type, then content sniffing. Anything that
    /// decodes as text falls through to CSV.
    pub fn detect(input: &StatementInput<'_>) -> Result<Self> {
        if input.bytes.is_empty() {
            return Err(ParseError::unreadable("file is empty"));
        }
        let detected = input
            .file_name
            .and_then(Self::from_extension)
            .or_else(|| input.mime.and_then(Self::from_mime))
            .or_else(|| Self::from_magic(input.bytes));
        if let Some(format) = detected {
            return Ok(format);
        }

        let head = &input.bytes[..input.bytes.len().min(4096)];
        if head.iter().any(|b| *b == 0) {
            return Err(ParseError::UnsupportedFormat(
                input.file_name.unwrap_or("binary input").to_string(),
            ));
        }
        Ok(FileFormat::Csv)
    }
}

/// What a strategy hands back: classified transactions before reconciliation
/// and duplicate detection.
#[derive(Debug, Clone, Default)]
pub struct Extracted {
    pub transactions: Vec<Transaction>,
    pub summary: StatementSummary,
    pub skipped: Vec<SkippedRow>,
}

/// A way of turning statement bytes into transactions.
///
/// The orchestrator always runs the deterministic rule-based strategy first.
/// Alternate strategies (for example model-assisted ones supplied by the
/// caller) are consulted only when it fails outright.
pub trait ExtractionStrategy: Send + Sync {
    fn name(&self) -> &str;

    fn is_deterministic(&self) -> bool {
        true
    }

    fn extract(&self, input: &StatementInput<'_>, cancel: &CancellationToken) -> Result<Extracted>;
}

/// Column-position extraction followed by the rule tables.
#[derive(Debug, Clone)]
pub struct RuleBasedStrategy {
    rules: RuleBook,
    year_pivot: u32,
}

impl Default for RuleBasedStrategy {
    fn default() -> Self {
        Self::from_settings(&ParserSettings::default())
    }
}

impl RuleBasedStrategy {
    pub fn new(rules: RuleBook, year_pivot: u32) -> Self {
        Self { rules, year_pivot }
    }

    pub fn from_settings(settings: &ParserSettings) -> Self {
        Self::new(RuleBook::with_settings(&settings.rules), settings.two_digit_year_pivot)
    }

    pub fn rules(&self) -> &RuleBook {
        &self.rules
    }

    /// Runs extraction and classification over an already decoded grid.
    pub fn extract_grid(
        &self,
        grid: &[Vec<String>],
        cancel: &CancellationToken,
    ) -> Result<Extracted> {
        let extraction = extract_grid(grid, cancel)?;
        self.classify_rows(extraction, cancel)
    }

    pub fn extract_text(&self, text: &str, cancel: &CancellationToken) -> Result<Extracted> {
        let extraction = parse_lines(text, cancel)?;
        self.classify_rows(extraction, cancel)
    }

    fn classify_rows(
        &self,
        extraction: Extraction,
        cancel: &CancellationToken,
    ) -> Result<Extracted> {
        let Extraction {
            summary,
            rows,
            mut skipped,
            ..
        } = extraction;

        let mut transactions = Vec::with_capacity(rows.len());
        for row in &rows {
            cancel.check()?;
            match classify(row, transactions.len(), &self.rules, self.year_pivot) {
                Ok(txn) => transactions.push(txn),
                Err(reason) => {
                    debug!(row = row.source_row, %reason, "Skipping row");
                    skipped.push(SkippedRow {
                        source_row: row.source_row,
                        reason,
                    });
                }
            }
        }

        if transactions.is_empty() {
            return Err(ParseError::NoTransactions);
        }
        skipped.sort_by_key(|s| s.source_row);

        info!(
            transactions = transactions.len(),
            skipped = skipped.len(),
            "Classified statement rows"
        );
        Ok(Extracted {
            transactions,
            summary,
            skipped,
        })
    }
}

impl ExtractionStrategy for RuleBasedStrategy {
    fn name(&self) -> &str {
        "rule_based"
    }

    fn extract(&self, input: &StatementInput<'_>, cancel: &CancellationToken) -> Result<Extracted> {
        let format = FileFormat::detect(input)?;
        debug!(?format, file = input.file_name.unwrap_or("<bytes>"), "Detected statement format");

        match format {
            FileFormat::Spreadsheet => {
                let sheets = read_workbook(input.bytes)?;
                let names: Vec<String> = sheets.iter().map(|(name, _)| name.clone()).collect();
                let idx = select_sheet(&names)
                    .ok_or_else(|| ParseError::unreadable("workbook contains no sheets"))?;
                let (name, grid) = &sheets[idx];
                info!(sheet = %name, rows = grid.len(), "Selected worksheet");
                self.extract_grid(grid, cancel)
            }
            FileFormat::Csv => {
                let grid = read_csv(input.bytes)?;
                self.extract_grid(&grid, cancel)
            }
            FileFormat::Pdf => {
                let text = extract_text(input.bytes)?;
                self.extract_text(&text, cancel)
            }
            FileFormat::Text => {
                let text = decode_text_lossy(input.bytes);
                self.extract_text(&text, cancel)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_detect_format() {
        let pdf = StatementInput::new(b"%PDF-1.7 ...");
        assert_eq!(FileFormat::detect(&pdf).unwrap(), FileFormat::Pdf);

        let named = StatementInput::new(b"PK\x03\x04").with_file_name("Statement.XLSX");
        assert_eq!(FileFormat::detect(&named).unwrap(), FileFormat::Spreadsheet);

        let csv = StatementInput::new(b"a,b,c").with_mime("text/csv");
        assert_eq!(FileFormat::detect(&csv).unwrap(), FileFormat::Csv);

        let ole = StatementInput::new(&[0xD0, 0xCF, 0x11, 0xE0, 0x00]);
        assert_eq!(FileFormat::detect(&ole).unwrap(), FileFormat::Spreadsheet);

        let text = StatementInput::new(b"Transaction Date,Description");
        assert_eq!(FileFormat::detect(&text).unwrap(), FileFormat::Csv);
    }

    #[test]
    fn test_detect_rejects_empty_and_binary() {
        assert!(matches!(
            FileFormat::detect(&StatementInput::new(b"")),
            Err(ParseError::Unreadable { .. })
        ));
        assert!(matches!(
            FileFormat::detect(&StatementInput::new(&[1, 0, 2, 0])),
            Err(ParseError::UnsupportedFormat(_))
        ));
    }

    #[test]
    fn test_no_rows_after_header() {
        let grid = vec![vec![
            "Transaction Date".to_string(),
            "Value Date".to_string(),
            "Description".to_string(),
            "Cheque No".to_string(),
            "Debit".to_string(),
            "Credit".to_string(),
            "Balance".to_string(),
        ]];
        let err = RuleBasedStrategy::default()
            .extract_grid(&grid, &CancellationToken::new())
            .unwrap_err();
        assert!(matches!(err, ParseError::NoTransactions));
    }
}
