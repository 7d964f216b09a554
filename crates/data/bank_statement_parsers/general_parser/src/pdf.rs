//! Line-based extraction for text pulled out of PDF statements.
//!
//! Column layout degrades to whitespace once a PDF is flattened to text, so
//! this path is heuristic: a line that starts with a date is a transaction,
//! its trailing amount tokens are read as debit, credit and balance, and what
//! is left is the narration. Best effort only. Scanned PDFs without a text
//! layer are rejected.

use once_cell::sync::Lazy;
use regex::Regex;
use tracing::debug;
use utils::description::collapse_whitespace;

use crate::error::{ParseError, Result, RowSkip, SkippedRow};
use crate::extract::{
    is_summary_label_row, scrape_metadata, summary_from_rows, Extraction, RawRow, END_MARKERS,
    HEADER_MARKERS,
};
use crate::CancellationToken;

static DATE_ANCHOR_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\s*(\d{1,2}[-/. ](?:[A-Za-z]{3,9}|\d{1,2})[-/. ]\d{2,4}|\d{4}-\d{2}-\d{2})(?:\s|$)")
        .expect("valid date anchor regex")
});
static AMOUNT_TOKEN_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^\(?-?(?:rs\.?|inr|₹)?\d[\d,]*\.\d{2}\)?(?:cr|dr)?$")
        .expect("valid amount regex")
});
static COLUMN_SPLIT_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\s{2,}|\t").expect("valid split regex"));
static WORD_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\S+").expect("valid word regex"));
static PAGE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)^\s*page\s+\d+(\s+of\s+\d+)?\s*$").expect("valid page regex"));

pub fn extract_text(bytes: &[u8]) -> Result<String> {
    let text =
        pdf_extract::extract_text_from_mem(bytes).map_err(|e| ParseError::Pdf(e.to_string()))?;
    if text.trim().is_empty() {
        return Err(ParseError::unreadable(
            "PDF has no text layer; scanned statements are not supported",
        ));
    }
    Ok(text)
}

fn split_columns(line: &str) -> Vec<String> {
    COLUMN_SPLIT_RE
        .split(line.trim())
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

fn is_amount_token(token: &str) -> bool {
    token == "-" || AMOUNT_TOKEN_RE.is_match(token)
}

fn contains_marker(line: &str, markers: &[&str]) -> bool {
    let lower = line.to_lowercase();
    markers.iter().any(|m| lower.contains(m))
}

/// Splits one anchored line into a raw row. Returns `None` when the line does
/// not start with a date.
pub fn split_line(source_row: usize, line: &str) -> Option<RawRow> {
    let caps = DATE_ANCHOR_RE.captures(line)?;
    let date = caps.get(1)?.as_str().to_string();
    let mut rest = line[caps.get(0)?.end()..].trim();

    let mut value_date = String::new();
    if let Some(vd) = DATE_ANCHOR_RE.captures(rest) {
        if let (Some(whole), Some(d)) = (vd.get(0), vd.get(1)) {
            value_date = d.as_str().to_string();
            rest = rest[whole.end()..].trim();
        }
    }

    // Peel up to three amount tokens off the end; "Cr"/"Dr" may stand apart.
    let words: Vec<regex::Match> = WORD_RE.find_iter(rest).collect();
    let mut amounts: Vec<String> = Vec::new();
    let mut cut = rest.len();
    let mut i = words.len();
    while i > 0 && amounts.len() < 3 {
        let word = words[i - 1].as_str();
        let is_suffix = word.eq_ignore_ascii_case("cr") || word.eq_ignore_ascii_case("dr");
        if is_suffix && i >= 2 && AMOUNT_TOKEN_RE.is_match(words[i - 2].as_str()) {
            amounts.push(format!("{} {}", words[i - 2].as_str(), word));
            cut = words[i - 2].start();
            i -= 2;
        } else if is_amount_token(word) {
            amounts.push(word.to_string());
            cut = words[i - 1].start();
            i -= 1;
        } else {
            break;
        }
    }
    amounts.reverse();

    let mut fields = split_columns(&rest[..cut]);
    let cheque_no = match fields.last() {
        Some(f)
            if fields.len() > 1
                && (4..=10).contains(&f.len())
                && f.chars().all(|c| c.is_ascii_digit()) =>
        {
            fields.pop().unwrap_or_default()
        }
        _ => String::new(),
    };

    let (debit, credit, balance) = match amounts.as_slice() {
        [d, c, b] => (d.clone(), c.clone(), b.clone()),
        [amount, b] => (amount.clone(), String::new(), b.clone()),
        [amount] => (amount.clone(), String::new(), String::new()),
        _ => (String::new(), String::new(), String::new()),
    };

    Some(RawRow {
        source_row,
        date,
        value_date,
        description: collapse_whitespace(&fields.join(" ")),
        cheque_no,
        debit: if debit == "-" { String::new() } else { debit },
        credit: if credit == "-" { String::new() } else { credit },
        balance: if balance == "-" { String::new() } else { balance },
    })
}

/// Summary values usually sit on the next non-empty line, either in wide
/// columns or separated by single spaces.
fn summary_from_lines(lines: &[&str], label_idx: usize) -> Option<models::StatementSummary> {
    let labels = split_columns(lines[label_idx]);
    let value_line = lines.iter().skip(label_idx + 1).find(|l| !l.trim().is_empty())?;
    let mut values = split_columns(value_line);
    if values.len() < labels.len() {
        values = value_line.split_whitespace().map(|s| s.to_string()).collect();
    }
    Some(summary_from_rows(&labels, &values))
}

/// Parses flattened statement text into raw rows plus the summary block.
pub fn parse_lines(text: &str, cancel: &CancellationToken) -> Result<Extraction> {
    let lines: Vec<&str> = text.lines().collect();
    let header_row = lines
        .iter()
        .position(|l| contains_marker(l, HEADER_MARKERS))
        .ok_or(ParseError::HeaderNotFound)?;

    let mut summary = lines
        .iter()
        .position(|l| is_summary_label_row(&split_columns(l)))
        .and_then(|idx| summary_from_lines(&lines, idx))
        .unwrap_or_default();
    let preamble: Vec<Vec<String>> = lines[..header_row].iter().map(|l| split_columns(l)).collect();
    scrape_metadata(&preamble, &mut summary);

    let mut rows: Vec<RawRow> = Vec::new();
    let mut skipped = Vec::new();
    let mut last_was_txn = false;

    for (idx, line) in lines.iter().enumerate().skip(header_row + 1) {
        cancel.check()?;
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        if contains_marker(trimmed, END_MARKERS) || is_summary_label_row(&split_columns(trimmed)) {
            debug!(line = idx, "End of transaction lines");
            break;
        }
        if contains_marker(trimmed, HEADER_MARKERS) || PAGE_RE.is_match(trimmed) {
            last_was_txn = false;
            continue;
        }

        if let Some(row) = split_line(idx, line) {
            rows.push(row);
            last_was_txn = true;
            continue;
        }

        let has_amount = trimmed.split_whitespace().any(|w| w != "-" && is_amount_token(w));
        match rows.last_mut() {
            Some(prev) if last_was_txn && !has_amount => prev.append_narration(trimmed),
            _ if has_amount => {
                skipped.push(SkippedRow {
                    source_row: idx,
                    reason: RowSkip::MissingDate,
                });
                last_was_txn = false;
            }
            _ => last_was_txn = false,
        }
    }

    debug!(rows = rows.len(), skipped = skipped.len(), "Parsed statement text");
    Ok(Extraction {
        header_row,
        summary,
        rows,
        skipped,
    })
}
