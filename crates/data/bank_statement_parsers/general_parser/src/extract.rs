//! Grid extraction: header row, column positions, summary block and the raw
//! transaction rows between the header and the end of the block.

use models::StatementSummary;
use rust_decimal::Decimal;
use tracing::debug;
use utils::description::{collapse_whitespace, normalize_for_matching};
use utils::normalize::try_parse_amount;

use crate::error::{ParseError, Result, RowSkip, SkippedRow};
use crate::CancellationToken;

pub(crate) const HEADER_MARKERS: &[&str] = &["transaction date", "txn date", "tran date"];
pub(crate) const END_MARKERS: &[&str] = &[
    "end of statement",
    "registered office",
    "statement summary",
    "this is a computer generated",
];

/// One transaction row as printed, before any interpretation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawRow {
    /// Zero-based row (grid) or line (PDF text) the row starts on.
    pub source_row: usize,
    pub date: String,
    pub value_date: String,
    pub description: String,
    pub cheque_no: String,
    pub debit: String,
    pub credit: String,
    pub balance: String,
}

impl RawRow {
    pub(crate) fn append_narration(&mut self, more: &str) {
        let more = more.trim();
        if more.is_empty() {
            return;
        }
        if self.description.is_empty() {
            self.description = more.to_string();
        } else {
            self.description = format!("{} {}", self.description, more);
        }
    }
}

/// Column positions for the transaction table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ColumnMap {
    pub date: usize,
    pub value_date: Option<usize>,
    pub description: usize,
    pub cheque_no: Option<usize>,
    pub debit: usize,
    pub credit: usize,
    pub balance: Option<usize>,
}

impl ColumnMap {
    /// The fixed layout {date, value date, description, cheque, debit,
    /// credit, balance} starting at the date column.
    pub fn fixed(date: usize) -> Self {
        Self {
            date,
            value_date: Some(date + 1),
            description: date + 2,
            cheque_no: Some(date + 3),
            debit: date + 4,
            credit: date + 5,
            balance: Some(date + 6),
        }
    }

    /// Deduces positions from header labels. Debit and credit must both be
    /// labelled, otherwise the fixed layout is assumed.
    pub fn from_header(header: &[String]) -> Option<Self> {
        let labels: Vec<String> = header.iter().map(|c| normalize_for_matching(c)).collect();
        let date = find_label(&labels, HEADER_MARKERS)?;

        let debit = find_label(
            &labels,
            &["debit", "withdrawal", "withdrawals", "dr amount", "paid out"],
        )
        .or_else(|| find_exact(&labels, &["dr"]));
        let credit = find_label(&labels, &["credit", "deposit", "deposits", "cr amount", "paid in"])
            .or_else(|| find_exact(&labels, &["cr"]));

        let (debit, credit) = match (debit, credit) {
            (Some(d), Some(c)) if d != c => (d, c),
            _ => {
                debug!("Debit/credit labels not found, assuming fixed column order");
                return Some(Self::fixed(date));
            }
        };

        let fixed = Self::fixed(date);
        Some(Self {
            date,
            value_date: find_label(&labels, &["value date", "value dt"]),
            description: find_label(
                &labels,
                &["description", "narration", "particulars", "details", "remarks"],
            )
            .unwrap_or(fixed.description),
            cheque_no: find_label(&labels, &["cheque", "chq", "ref no", "reference"]),
            debit,
            credit,
            balance: find_label(&labels, &["balance"]),
        })
    }

    fn cell(row: &[String], idx: Option<usize>) -> String {
        idx.and_then(|i| row.get(i))
            .map(|s| collapse_whitespace(s))
            .unwrap_or_default()
    }

    fn raw_row(&self, source_row: usize, row: &[String]) -> RawRow {
        RawRow {
            source_row,
            date: Self::cell(row, Some(self.date)),
            value_date: Self::cell(row, self.value_date),
            description: Self::cell(row, Some(self.description)),
            cheque_no: Self::cell(row, self.cheque_no),
            debit: Self::cell(row, Some(self.debit)),
            credit: Self::cell(row, Some(self.credit)),
            balance: Self::cell(row, self.balance),
        }
    }
}

fn find_label(labels: &[String], needles: &[&str]) -> Option<usize> {
    labels
        .iter()
        .position(|l| needles.iter().any(|n| l.contains(n)))
}

fn find_exact(labels: &[String], needles: &[&str]) -> Option<usize> {
    labels.iter().position(|l| needles.contains(&l.as_str()))
}

fn is_header_row(row: &[String]) -> bool {
    row.iter().any(|c| {
        let lower = normalize_for_matching(c);
        HEADER_MARKERS.iter().any(|m| lower.contains(m))
    })
}

fn is_blank(row: &[String]) -> bool {
    row.iter().all(|c| c.trim().is_empty())
}

fn is_end_marker(row: &[String]) -> bool {
    row.iter().any(|c| {
        let lower = normalize_for_matching(c);
        END_MARKERS.iter().any(|m| lower.contains(m))
    })
}

/// Index of the first row with a "Transaction Date" style label.
pub fn find_header_row(grid: &[Vec<String>]) -> Result<usize> {
    grid.iter()
        .position(|row| is_header_row(row))
        .ok_or(ParseError::HeaderNotFound)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SummaryField {
    Opening,
    Debit,
    Credit,
    Closing,
    Unknown,
}

fn summary_field(label: &str) -> SummaryField {
    let l = normalize_for_matching(label);
    if l.contains("opening balance") {
        SummaryField::Opening
    } else if l.contains("closing balance") {
        SummaryField::Closing
    } else if l.contains("total debit") || l.contains("total withdrawal") {
        SummaryField::Debit
    } else if l.contains("total credit") || l.contains("total deposit") {
        SummaryField::Credit
    } else {
        SummaryField::Unknown
    }
}

pub fn is_summary_label_row(row: &[String]) -> bool {
    let fields: Vec<SummaryField> = row.iter().map(|c| summary_field(c)).collect();
    fields.contains(&SummaryField::Opening) && fields.contains(&SummaryField::Debit)
}

fn assign(summary: &mut StatementSummary, field: SummaryField, value: Decimal) {
    match field {
        SummaryField::Opening => summary.opening_balance = Some(value),
        SummaryField::Debit => summary.total_debit = Some(value.abs()),
        SummaryField::Credit => summary.total_credit = Some(value.abs()),
        SummaryField::Closing => summary.closing_balance = Some(value),
        SummaryField::Unknown => {}
    }
}

/// Reads the values row under a summary label row. Values are matched to
/// labels by column; when that leaves a label empty (merged or shifted
/// cells) the non-empty labels and values are paired in order instead.
pub fn summary_from_rows(labels: &[String], values: &[String]) -> StatementSummary {
    let mut summary = StatementSummary::default();
    let mut aligned_ok = true;

    for (idx, label) in labels.iter().enumerate() {
        let field = summary_field(label);
        if field == SummaryField::Unknown {
            continue;
        }
        match values.get(idx).and_then(|v| try_parse_amount(v)) {
            Some(v) => assign(&mut summary, field, v),
            None => aligned_ok = false,
        }
    }

    if !aligned_ok {
        let mut positional = StatementSummary::default();
        let label_cells = labels.iter().filter(|l| !l.trim().is_empty());
        let value_cells = values.iter().filter(|v| !v.trim().is_empty());
        for (label, value) in label_cells.zip(value_cells) {
            if let Some(v) = try_parse_amount(value) {
                assign(&mut positional, summary_field(label), v);
            }
        }
        summary = positional;
    }
    summary
}

/// Locates the row carrying both "Opening Balance" and "Total Debit" labels
/// and reads the values from the row right below it.
pub fn find_summary(grid: &[Vec<String>]) -> Option<(usize, StatementSummary)> {
    let idx = grid.iter().position(|row| is_summary_label_row(row))?;
    let values = grid.get(idx + 1)?;
    Some((idx, summary_from_rows(&grid[idx], values)))
}

const ACCOUNT_LABELS: &[&str] = &["account number", "account no", "a c no", "acct no"];
const NAME_LABELS: &[&str] = &["customer name", "account name", "account holder", "name"];
const PERIOD_LABELS: &[&str] = &["statement period", "period", "statement from"];

/// Best-effort "Label: value" scraping from cells above the header.
pub fn scrape_metadata(rows: &[Vec<String>], summary: &mut StatementSummary) {
    for row in rows {
        for (idx, cell) in row.iter().enumerate() {
            let (label, inline_value) = match cell.split_once(':') {
                Some((l, v)) => (normalize_for_matching(l), v.trim().to_string()),
                None => (normalize_for_matching(cell), String::new()),
            };
            if label.is_empty() || label.split_whitespace().count() > 4 {
                continue;
            }
            let value = if inline_value.is_empty() {
                row.iter()
                    .skip(idx + 1)
                    .map(|c| c.trim())
                    .find(|c| !c.is_empty())
                    .unwrap_or("")
                    .to_string()
            } else {
                inline_value
            };
            if value.is_empty() {
                continue;
            }
            let value = collapse_whitespace(&value);

            if summary.account_number.is_none() && ACCOUNT_LABELS.iter().any(|l| label == *l) {
                summary.account_number = Some(value);
            } else if summary.customer_name.is_none() && NAME_LABELS.iter().any(|l| label == *l) {
                summary.customer_name = Some(value);
            } else if summary.statement_period.is_none()
                && PERIOD_LABELS.iter().any(|l| label == *l)
            {
                summary.statement_period = Some(value);
            }
        }
    }
}

/// Everything pulled out of one grid.
#[derive(Debug, Clone, Default)]
pub struct Extraction {
    pub header_row: usize,
    pub summary: StatementSummary,
    pub rows: Vec<RawRow>,
    pub skipped: Vec<SkippedRow>,
}

/// Walks the rows after the header until an end marker, the summary block
/// or a blank row after the block.
pub fn extract_rows(
    grid: &[Vec<String>],
    header_row: usize,
    columns: &ColumnMap,
    cancel: &CancellationToken,
) -> Result<(Vec<RawRow>, Vec<SkippedRow>)> {
    let mut rows: Vec<RawRow> = Vec::new();
    let mut skipped = Vec::new();
    let mut last_was_txn = false;
    let min_len = columns.date.max(columns.description) + 1;

    for (idx, row) in grid.iter().enumerate().skip(header_row + 1) {
        cancel.check()?;

        if is_blank(row) {
            if !rows.is_empty() {
                debug!(row = idx, "Blank row after transaction block, stopping");
                break;
            }
            continue;
        }
        if is_end_marker(row) || is_summary_label_row(row) {
            debug!(row = idx, "End of transaction block");
            break;
        }
        if is_header_row(row) {
            last_was_txn = false;
            continue;
        }
        if row.len() < min_len {
            skipped.push(SkippedRow {
                source_row: idx,
                reason: RowSkip::TooShort,
            });
            last_was_txn = false;
            continue;
        }

        let raw = columns.raw_row(idx, row);
        if raw.date.is_empty() {
            let no_amounts = raw.debit.is_empty() && raw.credit.is_empty();
            match rows.last_mut() {
                Some(prev) if last_was_txn && no_amounts && !raw.description.is_empty() => {
                    prev.append_narration(&raw.description);
                }
                _ if no_amounts => {
                    // Page footers and stray notes.
                    last_was_txn = false;
                }
                _ => {
                    skipped.push(SkippedRow {
                        source_row: idx,
                        reason: RowSkip::MissingDate,
                    });
                    last_was_txn = false;
                }
            }
            continue;
        }

        rows.push(raw);
        last_was_txn = true;
    }

    Ok((rows, skipped))
}

/// Header, columns, summary, metadata and rows from one grid.
pub fn extract_grid(grid: &[Vec<String>], cancel: &CancellationToken) -> Result<Extraction> {
    let header_row = find_header_row(grid)?;
    let columns = ColumnMap::from_header(&grid[header_row]).ok_or(ParseError::HeaderNotFound)?;
    debug!(header_row, ?columns, "Located transaction header");

    let mut summary = match find_summary(grid) {
        Some((idx, summary)) => {
            debug!(row = idx, "Located statement summary");
            summary
        }
        None => StatementSummary::default(),
    };
    scrape_metadata(&grid[..header_row], &mut summary);

    let (rows, skipped) = extract_rows(grid, header_row, &columns, cancel)?;
    Ok(Extraction {
        header_row,
        summary,
        rows,
        skipped,
    })
}
