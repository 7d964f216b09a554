use models::{Direction, Transaction};
use rust_decimal::Decimal;
use utils::description::{
    clean_description, counterparty, normalize_for_matching, payment_method,
};
use utils::normalize::{parse_date_or_serial, try_parse_amount};
use utils::rules::{RuleBook, RuleInput};
use utils::transactions::make_txn_id;

use crate::error::RowSkip;
use crate::extract::RawRow;

/// Turns one raw row into a transaction.
///
/// Direction comes only from which column holds the value: debit means
/// expense, credit means income. The narration is never consulted for it.
/// `ordinal` is the index among accepted rows and feeds the id.
pub fn classify(
    row: &RawRow,
    ordinal: usize,
    rules: &RuleBook,
    year_pivot: u32,
) -> Result<Transaction, RowSkip> {
    let debit = try_parse_amount(&row.debit).map(|d| d.abs()).unwrap_or(Decimal::ZERO);
    let credit = try_parse_amount(&row.credit).map(|c| c.abs()).unwrap_or(Decimal::ZERO);

    let date = match parse_date_or_serial(&row.date, year_pivot) {
        Some(d) => d,
        None if debit.is_zero() && credit.is_zero() => return Err(RowSkip::NoAmount),
        None if row.date.trim().is_empty() => return Err(RowSkip::MissingDate),
        None => return Err(RowSkip::UnparseableDate),
    };

    let (amount, direction) = match (debit.is_zero(), credit.is_zero()) {
        (false, true) => (debit, Direction::Expense),
        (true, false) => (credit, Direction::Income),
        (false, false) => return Err(RowSkip::BothColumns),
        (true, true) => {
            // "0.00" in both columns is a printed zero row, an empty pair is noise.
            let printed_zero =
                try_parse_amount(&row.debit).is_some() || try_parse_amount(&row.credit).is_some();
            return Err(if printed_zero {
                RowSkip::ZeroAmount
            } else {
                RowSkip::NoAmount
            });
        }
    };

    let raw_description = row.description.trim().to_string();
    let text = normalize_for_matching(&raw_description);
    let cp = counterparty(&raw_description);
    let method = payment_method(&raw_description);
    let classification = rules.classify(&RuleInput {
        text: &text,
        counterparty: cp.as_deref(),
        direction,
        payment_method: method,
        category: None,
    });

    let cheque_no = row.cheque_no.trim();
    Ok(Transaction {
        id: make_txn_id(date, amount, &raw_description, direction, ordinal),
        date,
        value_date: parse_date_or_serial(&row.value_date, year_pivot),
        description: clean_description(&raw_description),
        raw_description,
        cheque_no: (!cheque_no.is_empty() && cheque_no != "-").then(|| cheque_no.to_string()),
        amount,
        direction,
        category: classification.category,
        nature: classification.nature,
        income_source: classification.income_source,
        payment_method: method,
        post_balance: try_parse_amount(&row.balance),
        is_duplicate: false,
        duplicate_of_id: None,
        direction_corrected: false,
    })
}

/// Reclassifies a transaction after reconciliation changed its direction.
/// The id is left alone so it still reflects the columns as printed.
pub fn reclassify(txn: &mut Transaction, rules: &RuleBook) {
    let text = normalize_for_matching(&txn.raw_description);
    let cp = counterparty(&txn.raw_description);
    let classification = rules.classify(&RuleInput {
        text: &text,
        counterparty: cp.as_deref(),
        direction: txn.direction,
        payment_method: txn.payment_method,
        category: None,
    });
    txn.category = classification.category;
    txn.nature = classification.nature;
    txn.income_source = classification.income_source;
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use models::{IncomeSource, Nature, PaymentMethod};
    use rust_decimal_macros::dec;

    fn raw(date: &str, desc: &str, debit: &str, credit: &str) -> RawRow {
        RawRow {
            source_row: 1,
            date: date.into(),
            description: desc.into(),
            debit: debit.into(),
            credit: credit.into(),
            ..RawRow::default()
        }
    }

    fn run(date: &str, desc: &str, debit: &str, credit: &str) -> Result<Transaction, RowSkip> {
        classify(&raw(date, desc, debit, credit), 0, &RuleBook::builtin(), 50)
    }

    #[test]
    fn test_salary_credit_column() {
        let txn = run("05-03-2025", "SALARY CREDIT MAR 2025", "", "85,000.00").unwrap();
        assert_eq!(txn.direction, Direction::Income);
        assert_eq!(txn.amount, dec!(85000.00));
        assert_eq!(txn.category, "Salary");
        assert_eq!(txn.nature, Nature::Salary);
        assert_eq!(txn.income_source, Some(IncomeSource::Salary));
        assert_eq!(txn.date, NaiveDate::from_ymd_opt(2025, 3, 5).unwrap());
    }

    #[test]
    fn test_direction_ignores_keywords() {
        // A refund narration in the debit column is still an expense.
        let txn = run("01/01/2025", "REFUND SALARY REVERSAL", "500", "").unwrap();
        assert_eq!(txn.direction, Direction::Expense);
        assert_eq!(txn.income_source, None);
    }

    #[test]
    fn test_negative_cell_is_magnitude() {
        let txn = run("01/01/2025", "ATM WDL", "(2,000.00)", "").unwrap();
        assert_eq!(txn.amount, dec!(2000.00));
        assert_eq!(txn.payment_method, PaymentMethod::Atm);
        assert!(txn.amount > Decimal::ZERO);
    }

    #[test]
    fn test_skip_reasons() {
        assert_eq!(run("not-a-date", "desc", "", ""), Err(RowSkip::NoAmount));
        assert_eq!(run("not-a-date", "desc", "10.00", ""), Err(RowSkip::UnparseableDate));
        assert_eq!(run("01/01/2025", "desc", "10.00", "5.00"), Err(RowSkip::BothColumns));
        assert_eq!(run("01/01/2025", "desc", "0.00", "0.00"), Err(RowSkip::ZeroAmount));
        assert_eq!(run("01/01/2025", "desc", "", ""), Err(RowSkip::NoAmount));
    }

    #[test]
    fn test_raw_description_preserved() {
        let row = raw("01/01/2025", "UPI-ZOMATO-1234567890", "450.00", "");
        let txn = classify(&row, 3, &RuleBook::builtin(), 50).unwrap();
        assert_eq!(txn.description, "Zomato");
        assert_eq!(txn.raw_description, "UPI-ZOMATO-1234567890");
        let again = classify(&row, 3, &RuleBook::builtin(), 50).unwrap();
        assert_eq!(txn.id, again.id);
    }

    #[test]
    fn test_reclassify_after_flip() {
        let rules = RuleBook::builtin();
        let mut txn = run("01/01/2025", "SALARY CREDIT", "1000.00", "").unwrap();
        assert_eq!(txn.category, "Other");
        let id = txn.id.clone();
        txn.direction = Direction::Income;
        reclassify(&mut txn, &rules);
        assert_eq!(txn.category, "Salary");
        assert_eq!(txn.id, id);
    }
}
