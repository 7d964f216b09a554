//! Bank statement ingestion: spreadsheet, CSV or PDF bytes in, a validated,
//! classified and duplicate-flagged transaction list out.
//!
//! ```no_run
//! use general_parser::{StatementInput, StatementParser};
//!
//! let bytes = std::fs::read("statement.xlsx").unwrap();
//! let result = StatementParser::default()
//!     .parse(&StatementInput::new(&bytes).with_file_name("statement.xlsx"))
//!     .unwrap();
//! println!("{} transactions, valid: {}", result.transactions.len(), result.validation.is_valid);
//! ```

pub mod classify;
pub mod error;
pub mod extract;
pub mod pdf;
pub mod reconcile;
pub mod sheet;
pub mod strategy;

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use models::{Direction, ParseResult, ParserSettings, Transaction};
use tracing::{info, warn};
use utils::transactions::{detect_duplicates, ensure_unique_ids, find_existing_txn_ids};

pub use crate::error::{ParseError, Result, RowSkip, SkippedRow};
pub use crate::strategy::{Extracted, ExtractionStrategy, FileFormat, RuleBasedStrategy};

pub const PARSER_NAME: &str = "general_parser";

/// Statement bytes plus whatever the caller knows about their format.
#[derive(Debug, Clone, Copy)]
pub struct StatementInput<'a> {
    pub bytes: &'a [u8],
    pub file_name: Option<&'a str>,
    pub mime: Option<&'a str>,
}

impl<'a> StatementInput<'a> {
    pub fn new(bytes: &'a [u8]) -> Self {
        Self {
            bytes,
            file_name: None,
            mime: None,
        }
    }

    pub fn with_file_name(mut self, file_name: &'a str) -> Self {
        self.file_name = Some(file_name);
        self
    }

    pub fn with_mime(mut self, mime: &'a str) -> Self {
        self.mime = Some(mime);
        self
    }
}

/// Cooperative cancellation flag, checked between rows and before
/// reconciliation. Clones share the flag.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    pub fn check(&self) -> Result<()> {
        if self.is_cancelled() {
            Err(ParseError::Cancelled)
        } else {
            Ok(())
        }
    }
}

/// Drives extraction, classification, reconciliation and duplicate flagging.
///
/// Each call is independent: the parser holds only configuration, so the
/// same bytes always produce the same result.
pub struct StatementParser {
    primary: RuleBasedStrategy,
    fallback: Option<Box<dyn ExtractionStrategy>>,
    settings: ParserSettings,
}

impl Default for StatementParser {
    fn default() -> Self {
        Self::new(ParserSettings::default())
    }
}

impl StatementParser {
    pub fn new(settings: ParserSettings) -> Self {
        Self {
            primary: RuleBasedStrategy::from_settings(&settings),
            fallback: None,
            settings,
        }
    }

    /// Strategy to try when the rule-based path fails outright. It never
    /// overrides a successful rule-based parse.
    pub fn with_fallback(mut self, fallback: Box<dyn ExtractionStrategy>) -> Self {
        self.fallback = Some(fallback);
        self
    }

    pub fn settings(&self) -> &ParserSettings {
        &self.settings
    }

    pub fn parse(&self, input: &StatementInput<'_>) -> Result<ParseResult> {
        self.parse_against(input, &[], &CancellationToken::new())
    }

    /// Parses and flags duplicates against previously stored transactions.
    pub fn parse_against(
        &self,
        input: &StatementInput<'_>,
        prior: &[Transaction],
        cancel: &CancellationToken,
    ) -> Result<ParseResult> {
        let (extracted, fallback_used) = match self.primary.extract(input, cancel) {
            Ok(extracted) => (extracted, None),
            Err(ParseError::Cancelled) => return Err(ParseError::Cancelled),
            Err(err) => {
                let Some(fallback) = &self.fallback else {
                    return Err(err);
                };
                warn!(
                    error = %err,
                    fallback = fallback.name(),
                    "Rule-based extraction failed, trying fallback"
                );
                match fallback.extract(input, cancel) {
                    Ok(extracted) => (extracted, Some(fallback.as_ref())),
                    Err(fallback_err) => {
                        warn!(error = %fallback_err, "Fallback extraction failed");
                        return Err(err);
                    }
                }
            }
        };
        self.finish(extracted, prior, cancel, fallback_used)
    }

    /// Entry point for a grid that was decoded elsewhere.
    pub fn parse_grid(
        &self,
        grid: &[Vec<String>],
        prior: &[Transaction],
        cancel: &CancellationToken,
    ) -> Result<ParseResult> {
        let extracted = self.primary.extract_grid(grid, cancel)?;
        self.finish(extracted, prior, cancel, None)
    }

    fn finish(
        &self,
        extracted: Extracted,
        prior: &[Transaction],
        cancel: &CancellationToken,
        fallback: Option<&dyn ExtractionStrategy>,
    ) -> Result<ParseResult> {
        let Extracted {
            mut transactions,
            summary,
            skipped,
        } = extracted;

        ensure_unique_ids(&mut transactions);
        // Reconciliation needs the complete batch.
        cancel.check()?;

        let read_directions: Vec<Direction> = transactions.iter().map(|t| t.direction).collect();
        let (mut transactions, mut validation) =
            reconcile::reconcile(transactions, &summary, &self.settings.reconcile);
        for (txn, read) in transactions.iter_mut().zip(read_directions) {
            if txn.direction != read {
                classify::reclassify(txn, self.primary.rules());
            }
        }
        cancel.check()?;

        let already_imported = find_existing_txn_ids(prior, &transactions);
        let duplicates = detect_duplicates(&mut transactions, prior, &self.settings.duplicates);
        validation.duplicate_count = duplicates;
        if duplicates > 0 {
            validation.warnings.push(format!(
                "{} possible duplicate transaction(s) flagged for review",
                duplicates
            ));
        }
        if !already_imported.is_empty() {
            validation.warnings.push(format!(
                "{} transaction(s) were already imported (same id)",
                already_imported.len()
            ));
        }

        let mut by_reason: BTreeMap<RowSkip, usize> = BTreeMap::new();
        for skip in skipped.iter().filter(|s| !s.reason.is_silent()) {
            *by_reason.entry(skip.reason).or_insert(0) += 1;
        }
        validation.skipped_rows = by_reason.values().sum();
        for (reason, count) in &by_reason {
            validation
                .warnings
                .push(format!("{} row(s) skipped ({})", count, reason));
        }

        if let Some(strategy) = fallback {
            let note = if strategy.is_deterministic() {
                format!("Parsed with fallback strategy '{}'", strategy.name())
            } else {
                format!(
                    "Parsed with non-deterministic fallback strategy '{}'; review before importing",
                    strategy.name()
                )
            };
            validation.warnings.push(note);
        }

        info!(
            parser = PARSER_NAME,
            transactions = transactions.len(),
            valid = validation.is_valid,
            corrections = validation.corrections_applied,
            swapped = validation.global_swap_applied,
            duplicates,
            "Statement parsed"
        );

        Ok(ParseResult {
            transactions,
            summary,
            validation,
        })
    }
}

/// Parses with default settings. `file_name` is used for format detection.
pub fn parse(bytes: &[u8], file_name: Option<&str>) -> Result<ParseResult> {
    let mut input = StatementInput::new(bytes);
    if let Some(name) = file_name {
        input = input.with_file_name(name);
    }
    StatementParser::default().parse(&input)
}
