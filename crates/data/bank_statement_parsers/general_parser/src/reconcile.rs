//! Reconciliation of parsed transactions against the statement's printed
//! totals.
//!
//! The printed summary is treated as ground truth. When the parsed aggregates
//! disagree by more than the relative correction band, two corrections are
//! tried in order:
//!
//! 1. a global swap of every direction, applied only when it moves both the
//!    debit and the credit aggregate strictly closer to their targets;
//! 2. greedy single flips over the transactions, largest amount first, each
//!    accepted only when it cuts the combined error
//!    `|debit - total_debit| + |credit - total_credit|` by more than
//!    `min_improvement`, capped at `max_corrections`.
//!
//! The greedy pass is best-effort error reduction with no optimality
//! guarantee. Reconciliation never fails; problems end up in the report.

use models::{Direction, ReconcileSettings, StatementSummary, Transaction, ValidationReport};
use rust_decimal::Decimal;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Totals {
    pub debit: Decimal,
    pub credit: Decimal,
}

impl Totals {
    fn error_against(&self, target_debit: Decimal, target_credit: Decimal) -> Decimal {
        (self.debit - target_debit).abs() + (self.credit - target_credit).abs()
    }

    fn within(&self, target_debit: Decimal, target_credit: Decimal, tolerance: Decimal) -> bool {
        (self.debit - target_debit).abs() <= tolerance
            && (self.credit - target_credit).abs() <= tolerance
    }

    /// Totals after moving one amount from one side to the other.
    fn with_flip(&self, txn: &Transaction) -> Totals {
        match txn.direction {
            Direction::Expense => Totals {
                debit: self.debit - txn.amount,
                credit: self.credit + txn.amount,
            },
            Direction::Income => Totals {
                debit: self.debit + txn.amount,
                credit: self.credit - txn.amount,
            },
        }
    }
}

/// Sum of expense amounts and sum of income amounts.
pub fn totals(transactions: &[Transaction]) -> Totals {
    transactions.iter().fold(Totals::default(), |mut acc, t| {
        match t.direction {
            Direction::Expense => acc.debit += t.amount,
            Direction::Income => acc.credit += t.amount,
        }
        acc
    })
}

fn flip(txn: &mut Transaction) {
    txn.direction = txn.direction.flipped();
    txn.direction_corrected = !txn.direction_corrected;
}

fn money(d: Decimal) -> Decimal {
    d.round_dp(2)
}

/// Compares parsed totals with the printed summary and corrects directions
/// where the evidence is strong enough. Order of transactions is preserved.
pub fn reconcile(
    mut transactions: Vec<Transaction>,
    summary: &StatementSummary,
    settings: &ReconcileSettings,
) -> (Vec<Transaction>, ValidationReport) {
    let mut report = ValidationReport::default();

    let (target_debit, target_credit) = match (summary.total_debit, summary.total_credit) {
        (Some(d), Some(c)) => (d, c),
        _ => {
            let parsed = totals(&transactions);
            report.computed_debit = parsed.debit;
            report.computed_credit = parsed.credit;
            report.is_valid = false;
            report.errors.push(
                "Statement summary totals not found; totals could not be reconciled".to_string(),
            );
            warn!("No printed totals to reconcile against");
            balance_warnings(&transactions, summary, settings, &mut report);
            return (transactions, report);
        }
    };

    let tolerance = settings.absolute_tolerance;
    let initial = totals(&transactions);
    debug!(
        parsed_debit = %initial.debit,
        parsed_credit = %initial.credit,
        %target_debit,
        %target_credit,
        "Reconciling"
    );

    if !initial.within(target_debit, target_credit, tolerance) {
        let band = (target_debit.abs() * settings.relative_band).max(tolerance);
        let worst = (initial.debit - target_debit)
            .abs()
            .max((initial.credit - target_credit).abs());

        if worst <= band {
            report.warnings.push(format!(
                "Totals differ by at most {} which is inside the {}% correction band; no automatic correction attempted",
                money(worst),
                (settings.relative_band * Decimal::ONE_HUNDRED).normalize()
            ));
        } else {
            let swapped = Totals {
                debit: initial.credit,
                credit: initial.debit,
            };
            let debit_closer =
                (swapped.debit - target_debit).abs() < (initial.debit - target_debit).abs();
            let credit_closer =
                (swapped.credit - target_credit).abs() < (initial.credit - target_credit).abs();

            if debit_closer && credit_closer {
                transactions.iter_mut().for_each(flip);
                report.global_swap_applied = true;
                info!(
                    count = transactions.len(),
                    "Debit/credit columns look swapped, flipped every direction"
                );
                report.warnings.push(format!(
                    "Debit and credit columns appear swapped; flipped the direction of all {} transactions",
                    transactions.len()
                ));
            }

            let current = totals(&transactions);
            if !current.within(target_debit, target_credit, tolerance) {
                let applied =
                    targeted_flips(&mut transactions, target_debit, target_credit, settings);
                report.corrections_applied = applied;
                if applied > 0 {
                    report.warnings.push(format!(
                        "Corrected the direction of {} transaction(s) to match the statement totals",
                        applied
                    ));
                }
            }
        }
    }

    let final_totals = totals(&transactions);
    report.computed_debit = final_totals.debit;
    report.computed_credit = final_totals.credit;

    let debit_diff = final_totals.debit - target_debit;
    if debit_diff.abs() > tolerance {
        report.errors.push(format!(
            "Total debit mismatch: parsed {} vs statement {} (difference {})",
            money(final_totals.debit),
            money(target_debit),
            money(debit_diff)
        ));
    }
    let credit_diff = final_totals.credit - target_credit;
    if credit_diff.abs() > tolerance {
        report.errors.push(format!(
            "Total credit mismatch: parsed {} vs statement {} (difference {})",
            money(final_totals.credit),
            money(target_credit),
            money(credit_diff)
        ));
    }
    report.is_valid = report.errors.is_empty();
    balance_warnings(&transactions, summary, settings, &mut report);

    if report.is_valid {
        info!(
            debit = %final_totals.debit,
            credit = %final_totals.credit,
            "Totals reconcile with statement"
        );
    } else {
        warn!(errors = ?report.errors, "Totals do not reconcile");
    }

    (transactions, report)
}

/// Greedy largest-first single flips. Returns the number of flips applied.
fn targeted_flips(
    transactions: &mut [Transaction],
    target_debit: Decimal,
    target_credit: Decimal,
    settings: &ReconcileSettings,
) -> usize {
    let mut order: Vec<usize> = (0..transactions.len()).collect();
    // Stable, so equal amounts keep statement order.
    order.sort_by(|&a, &b| transactions[b].amount.cmp(&transactions[a].amount));

    let mut current = totals(transactions);
    let mut applied = 0;

    for idx in order {
        if applied >= settings.max_corrections {
            debug!(cap = settings.max_corrections, "Correction cap reached");
            break;
        }
        if current.within(target_debit, target_credit, settings.absolute_tolerance) {
            break;
        }

        let before = current.error_against(target_debit, target_credit);
        let candidate = current.with_flip(&transactions[idx]);
        let after = candidate.error_against(target_debit, target_credit);

        if before - after > settings.min_improvement {
            let txn = &mut transactions[idx];
            debug!(
                id = %txn.id,
                amount = %txn.amount,
                from = %txn.direction,
                error_before = %before,
                error_after = %after,
                "Flipping transaction direction"
            );
            flip(txn);
            current = candidate;
            applied += 1;
        }
    }

    applied
}

fn balance_warnings(
    transactions: &[Transaction],
    summary: &StatementSummary,
    settings: &ReconcileSettings,
    report: &mut ValidationReport,
) {
    if let Some(drift) = summary.balance_drift() {
        if drift.abs() > settings.balance_tolerance {
            report.warnings.push(format!(
                "Opening balance + total credit - total debit differs from closing balance by {}",
                money(drift)
            ));
        }
    }

    let breaks = running_balance_breaks(transactions, settings.balance_tolerance);
    if breaks > 0 {
        report.warnings.push(format!(
            "{} running-balance break(s) between consecutive rows",
            breaks
        ));
    }
}

/// Count of consecutive rows whose printed balances do not follow from the
/// amount in between. Statements run oldest-first or newest-first, so both
/// readings are tried and the better one is reported.
pub fn running_balance_breaks(transactions: &[Transaction], tolerance: Decimal) -> usize {
    fn breaks<'a>(ordered: impl Iterator<Item = &'a Transaction>, tolerance: Decimal) -> usize {
        let mut prev: Option<Decimal> = None;
        let mut count = 0;
        for txn in ordered {
            if let (Some(p), Some(bal)) = (prev, txn.post_balance) {
                if (p + txn.signed_amount() - bal).abs() > tolerance {
                    count += 1;
                }
            }
            prev = txn.post_balance;
        }
        count
    }

    let forward = breaks(transactions.iter(), tolerance);
    if forward == 0 {
        return 0;
    }
    forward.min(breaks(transactions.iter().rev(), tolerance))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use models::{Nature, PaymentMethod};
    use rust_decimal_macros::dec;

    fn txn(id: &str, amount: Decimal, direction: Direction) -> Transaction {
        Transaction {
            id: id.to_string(),
            date: NaiveDate::from_ymd_opt(2025, 1, 1).unwrap(),
            value_date: None,
            description: id.to_string(),
            raw_description: id.to_string(),
            cheque_no: None,
            amount,
            direction,
            category: "Other".to_string(),
            nature: Nature::Uncategorized,
            income_source: None,
            payment_method: PaymentMethod::Other,
            post_balance: None,
            is_duplicate: false,
            duplicate_of_id: None,
            direction_corrected: false,
        }
    }

    fn summary(
        opening: Decimal,
        debit: Decimal,
        credit: Decimal,
        closing: Decimal,
    ) -> StatementSummary {
        StatementSummary {
            opening_balance: Some(opening),
            total_debit: Some(debit),
            total_credit: Some(credit),
            closing_balance: Some(closing),
            ..StatementSummary::default()
        }
    }

    fn correct_batch() -> Vec<Transaction> {
        vec![
            txn("a", dec!(1000.00), Direction::Expense),
            txn("b", dec!(3000.00), Direction::Income),
            txn("c", dec!(800.00), Direction::Expense),
            txn("d", dec!(450.00), Direction::Expense),
            txn("e", dec!(250.00), Direction::Expense),
        ]
    }

    #[test]
    fn test_matching_totals_are_valid() {
        let s = summary(dec!(10000.00), dec!(2500.00), dec!(3000.00), dec!(10500.00));
        let (txns, report) = reconcile(correct_batch(), &s, &ReconcileSettings::default());
        assert!(report.is_valid);
        assert!(report.errors.is_empty());
        assert!(report.warnings.is_empty());
        assert_eq!(report.computed_debit, dec!(2500.00));
        assert_eq!(report.computed_credit, dec!(3000.00));
        assert!(txns.iter().all(|t| !t.direction_corrected));
    }

    #[test]
    fn test_global_swap_is_detected() {
        let s = summary(dec!(10000.00), dec!(2500.00), dec!(3000.00), dec!(10500.00));
        let inverted: Vec<Transaction> = correct_batch()
            .into_iter()
            .map(|mut t| {
                t.direction = t.direction.flipped();
                t
            })
            .collect();
        let (txns, report) = reconcile(inverted, &s, &ReconcileSettings::default());
        assert!(report.global_swap_applied);
        assert!(report.is_valid);
        assert_eq!(report.corrections_applied, 0);
        assert_eq!(report.computed_debit, dec!(2500.00));
        assert_eq!(report.computed_credit, dec!(3000.00));
        assert!(txns.iter().all(|t| t.direction_corrected));
        let expected: Vec<Direction> = correct_batch().iter().map(|t| t.direction).collect();
        let got: Vec<Direction> = txns.iter().map(|t| t.direction).collect();
        assert_eq!(got, expected);
    }

    #[test]
    fn test_targeted_flip_fixes_single_row() {
        let txns = vec![
            txn("salary", dec!(3000), Direction::Income),
            txn("rent", dec!(1000), Direction::Expense),
            txn("food", dec!(500), Direction::Expense),
            txn("misread", dec!(200), Direction::Income),
        ];
        let s = summary(dec!(0), dec!(1700), dec!(3000), dec!(1300));
        let (txns, report) = reconcile(txns, &s, &ReconcileSettings::default());
        assert!(report.is_valid, "{:?}", report.errors);
        assert!(!report.global_swap_applied);
        assert_eq!(report.corrections_applied, 1);
        assert_eq!(txns[3].direction, Direction::Expense);
        assert!(txns[3].direction_corrected);
        assert!(txns[..3].iter().all(|t| !t.direction_corrected));
    }

    #[test]
    fn test_small_difference_is_not_corrected() {
        let txns = vec![
            txn("a", dec!(10000.50), Direction::Expense),
            txn("b", dec!(5000.00), Direction::Income),
        ];
        let s = summary(dec!(20000), dec!(10000.00), dec!(5000.00), dec!(15000.00));
        let (txns, report) = reconcile(txns, &s, &ReconcileSettings::default());
        assert!(!report.is_valid);
        assert_eq!(report.corrections_applied, 0);
        assert!(txns.iter().all(|t| !t.direction_corrected));
        assert_eq!(
            report.errors,
            vec![
                "Total debit mismatch: parsed 10000.50 vs statement 10000.00 (difference 0.50)"
                    .to_string()
            ]
        );
        assert!(report.warnings.iter().any(|w| w.contains("correction band")));
    }

    #[test]
    fn test_correction_cap() {
        let txns = vec![
            txn("a", dec!(1000), Direction::Income),
            txn("b", dec!(900), Direction::Income),
            txn("c", dec!(5000), Direction::Income),
        ];
        let s = summary(dec!(0), dec!(1900), dec!(5000), dec!(3100));
        let settings = ReconcileSettings {
            max_corrections: 1,
            ..ReconcileSettings::default()
        };
        let (txns, report) = reconcile(txns, &s, &settings);
        assert_eq!(report.corrections_applied, 1);
        assert!(!report.is_valid);
        assert_eq!(txns[0].direction, Direction::Expense);
        assert_eq!(txns[1].direction, Direction::Income);
    }

    fn misread_cashback() -> Vec<Transaction> {
        vec![
            txn("fee", dec!(1.00), Direction::Expense),
            txn("cashback", dec!(0.40), Direction::Expense),
        ]
    }

    #[test]
    fn test_flip_below_min_improvement_is_refused() {
        // Outside the band, but the only useful flip gains just 0.80.
        let s = summary(dec!(10.00), dec!(1.00), dec!(0.40), dec!(9.40));
        let (txns, report) = reconcile(misread_cashback(), &s, &ReconcileSettings::default());
        assert_eq!(report.corrections_applied, 0);
        assert!(!report.global_swap_applied);
        assert!(!report.is_valid);
        assert!(txns.iter().all(|t| t.direction == Direction::Expense && !t.direction_corrected));

        let at_threshold = ReconcileSettings {
            min_improvement: dec!(0.80),
            ..ReconcileSettings::default()
        };
        let (txns, report) = reconcile(misread_cashback(), &s, &at_threshold);
        assert_eq!(report.corrections_applied, 0);
        assert_eq!(txns[1].direction, Direction::Expense);
    }

    #[test]
    fn test_lower_min_improvement_allows_small_flip() {
        let s = summary(dec!(10.00), dec!(1.00), dec!(0.40), dec!(9.40));
        let settings = ReconcileSettings {
            min_improvement: dec!(0.50),
            ..ReconcileSettings::default()
        };
        let (txns, report) = reconcile(misread_cashback(), &s, &settings);
        assert_eq!(report.corrections_applied, 1);
        assert!(report.is_valid);
        assert_eq!(txns[0].direction, Direction::Expense);
        assert_eq!(txns[1].direction, Direction::Income);
        assert!(txns[1].direction_corrected);
    }

    #[test]
    fn test_missing_totals_reported() {
        let (txns, report) = reconcile(
            correct_batch(),
            &StatementSummary::default(),
            &ReconcileSettings::default(),
        );
        assert_eq!(txns.len(), 5);
        assert!(!report.is_valid);
        assert_eq!(report.errors.len(), 1);
        assert_eq!(report.computed_debit, dec!(2500.00));
    }

    #[test]
    fn test_balance_drift_is_a_warning() {
        let s = summary(dec!(10000.00), dec!(2500.00), dec!(3000.00), dec!(10499.00));
        let (_, report) = reconcile(correct_batch(), &s, &ReconcileSettings::default());
        assert!(report.is_valid);
        assert_eq!(report.warnings.len(), 1);
        assert!(report.warnings[0].contains("1.00"));
    }

    #[test]
    fn test_running_balance_breaks() {
        let mut txns = vec![
            txn("a", dec!(100), Direction::Expense),
            txn("b", dec!(50), Direction::Income),
            txn("c", dec!(30), Direction::Expense),
        ];
        txns[0].post_balance = Some(dec!(900));
        txns[1].post_balance = Some(dec!(950));
        txns[2].post_balance = Some(dec!(920));
        assert_eq!(running_balance_breaks(&txns, dec!(0.01)), 0);

        // newest first
        txns.reverse();
        assert_eq!(running_balance_breaks(&txns, dec!(0.01)), 0);

        txns[1].post_balance = Some(dec!(999));
        assert!(running_balance_breaks(&txns, dec!(0.01)) > 0);
    }
}
