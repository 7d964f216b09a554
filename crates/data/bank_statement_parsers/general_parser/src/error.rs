use std::fmt;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, ParseError>;

/// Structural failures. Anything here aborts the parse and no transactions
/// are returned.
#[derive(Debug, Error)]
pub enum ParseError {
    #[error("Unreadable file: {reason}")]
    Unreadable { reason: String },

    #[error("Unsupported file format: {0}")]
    UnsupportedFormat(String),

    #[error("Could not find transaction header row — expected a 'Transaction Date' column")]
    HeaderNotFound,

    #[error("No transaction rows found after the header row")]
    NoTransactions,

    #[error("Parse cancelled")]
    Cancelled,

    #[error("Spreadsheet error: {0}")]
    Spreadsheet(String),

    #[error("PDF text extraction failed: {0}")]
    Pdf(String),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
}

impl ParseError {
    pub fn unreadable(reason: impl Into<String>) -> Self {
        ParseError::Unreadable {
            reason: reason.into(),
        }
    }
}

/// Why a single row was left out. Row skips never abort a parse.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum RowSkip {
    MissingDate,
    UnparseableDate,
    NoAmount,
    BothColumns,
    TooShort,
    ZeroAmount,
}

impl RowSkip {
    /// Skips that are page noise rather than data problems are not reported.
    pub fn is_silent(self) -> bool {
        matches!(self, RowSkip::NoAmount | RowSkip::ZeroAmount)
    }
}

impl fmt::Display for RowSkip {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let msg = match self {
            RowSkip::MissingDate => "missing date",
            RowSkip::UnparseableDate => "unparseable date",
            RowSkip::NoAmount => "no debit or credit amount",
            RowSkip::BothColumns => "both debit and credit populated",
            RowSkip::TooShort => "row too short",
            RowSkip::ZeroAmount => "zero amount",
        };
        f.write_str(msg)
    }
}

/// A row dropped during extraction or classification, with its position in
/// the source grid or text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedRow {
    pub source_row: usize,
    pub reason: RowSkip,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_message_names_column() {
        let msg = ParseError::HeaderNotFound.to_string();
        assert!(msg.contains("Transaction Date"));
        assert!(msg.starts_with("Could not find transaction header row"));
    }

    #[test]
    fn test_silent_skips() {
        assert!(RowSkip::NoAmount.is_silent());
        assert!(!RowSkip::UnparseableDate.is_silent());
        assert_eq!(RowSkip::BothColumns.to_string(), "both debit and credit populated");
    }
}
