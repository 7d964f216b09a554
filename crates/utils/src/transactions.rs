use chrono::NaiveDate;
use models::{Direction, DuplicateSettings, Transaction};
use rust_decimal::Decimal;
use sha2::{Digest, Sha256};
use std::collections::{BTreeSet, HashMap, HashSet};
use tracing::debug;

use crate::description::{clean_description, normalize_for_matching};

pub fn make_hash(input: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(input.as_bytes());
    hex::encode(hasher.finalize())
}

/// Deterministic transaction id.
///
/// Same file, same row, same id: the ordinal keeps two identical rows on one
/// statement apart while re-imports of the file reproduce the ids exactly.
pub fn make_txn_id(
    date: NaiveDate,
    amount: Decimal,
    description: &str,
    direction: Direction,
    ordinal: usize,
) -> String {
    let sig = format!(
        "{}|{}|{}|{}|{}",
        date.format("%Y-%m-%d"),
        amount.normalize(),
        normalize_for_matching(description),
        direction.as_str(),
        ordinal
    );
    format!("TXN-{}", &make_hash(&sig)[..24])
}

/// Appends `-2`, `-3`, ... to ids that collide within one batch.
/// Returns how many ids were rewritten.
pub fn ensure_unique_ids(transactions: &mut [Transaction]) -> usize {
    let mut seen: HashMap<String, usize> = HashMap::new();
    let mut taken: HashSet<String> = transactions.iter().map(|t| t.id.clone()).collect();
    let mut rewritten = 0;

    for txn in transactions.iter_mut() {
        let count = seen.entry(txn.id.clone()).or_insert(0);
        *count += 1;
        if *count == 1 {
            continue;
        }
        let mut suffix = *count;
        let mut candidate = format!("{}-{}", txn.id, suffix);
        while taken.contains(&candidate) {
            suffix += 1;
            candidate = format!("{}-{}", txn.id, suffix);
        }
        debug!(from = %txn.id, to = %candidate, "Rewrote colliding transaction id");
        taken.insert(candidate.clone());
        txn.id = candidate;
        rewritten += 1;
    }
    rewritten
}

/// Ids of `batch` that already exist in `prior`, i.e. rows imported before.
pub fn find_existing_txn_ids(prior: &[Transaction], batch: &[Transaction]) -> Vec<String> {
    let existing: HashSet<&str> = prior.iter().map(|t| t.id.as_str()).collect();
    batch
        .iter()
        .filter(|t| existing.contains(t.id.as_str()))
        .map(|t| t.id.clone())
        .collect()
}

/// Word tokens used for duplicate similarity. Built from the cleaned
/// description so rail prefixes and reference numbers do not count.
pub fn duplicate_tokens(txn: &Transaction, min_len: usize) -> BTreeSet<String> {
    let source = if txn.raw_description.is_empty() {
        &txn.description
    } else {
        &txn.raw_description
    };
    normalize_for_matching(&clean_description(source))
        .split_whitespace()
        .filter(|t| t.chars().count() >= min_len)
        .filter(|t| !(t.len() >= 10 && t.chars().all(|c| c.is_ascii_digit())))
        .map(|t| t.to_string())
        .collect()
}

/// Token-set Jaccard similarity. Two empty sets share nothing.
pub fn jaccard(a: &BTreeSet<String>, b: &BTreeSet<String>) -> f64 {
    let union = a.union(b).count();
    if union == 0 {
        return 0.0;
    }
    a.intersection(b).count() as f64 / union as f64
}

/// All four duplicate conditions at once: direction, amount, date window and
/// description similarity.
pub fn is_duplicate_pair(a: &Transaction, b: &Transaction, settings: &DuplicateSettings) -> bool {
    if a.direction != b.direction {
        return false;
    }
    if (a.amount - b.amount).abs() > settings.amount_tolerance {
        return false;
    }
    if (a.date - b.date).num_days().abs() > settings.date_window_days {
        return false;
    }
    let sim = jaccard(
        &duplicate_tokens(a, settings.min_token_len),
        &duplicate_tokens(b, settings.min_token_len),
    );
    sim > settings.similarity_threshold
}

/// Flags likely duplicates, comparing each transaction against the prior
/// history first and then against earlier rows of the same batch.
///
/// A prior transaction with the same id is the same row imported again and
/// always counts as a match. Within the batch, rows sharing an id are never
/// compared with each other.
///
/// Flags are advisory: nothing is removed. Returns the number of rows flagged.
pub fn detect_duplicates(
    transactions: &mut [Transaction],
    prior: &[Transaction],
    settings: &DuplicateSettings,
) -> usize {
    let mut flagged = 0;

    for i in 0..transactions.len() {
        let (earlier, rest) = transactions.split_at_mut(i);
        let matched = {
            let current = &rest[0];
            prior
                .iter()
                .find(|candidate| candidate.id == current.id)
                .or_else(|| {
                    prior
                        .iter()
                        .find(|candidate| is_duplicate_pair(current, candidate, settings))
                })
                .or_else(|| {
                    earlier.iter().find(|candidate| {
                        candidate.id != current.id
                            && is_duplicate_pair(current, candidate, settings)
                    })
                })
                .map(|candidate| candidate.id.clone())
        };

        if let Some(original) = matched {
            let current = &mut rest[0];
            debug!(id = %current.id, duplicate_of = %original, "Possible duplicate transaction");
            current.is_duplicate = true;
            current.duplicate_of_id = Some(original);
            flagged += 1;
        }
    }

    flagged
}

#[cfg(test)]
mod tests {
    use super::*;
    use models::{Nature, PaymentMethod};
    use rust_decimal_macros::dec;

    fn txn(id: &str, date: &str, amount: Decimal, direction: Direction, raw: &str) -> Transaction {
        Transaction {
            id: id.to_string(),
            date: NaiveDate::parse_from_str(date, "%Y-%m-%d").unwrap(),
            value_date: None,
            description: clean_description(raw),
            raw_description: raw.to_string(),
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

    #[test]
    fn test_txn_id_is_deterministic() {
        let date = NaiveDate::from_ymd_opt(2025, 1, 1).unwrap();
        let a = make_txn_id(date, dec!(450.00), "UPI-ZOMATO-1", Direction::Expense, 0);
        let b = make_txn_id(date, dec!(450.0), "upi zomato 1", Direction::Expense, 0);
        assert_eq!(a, b);
        assert!(a.starts_with("TXN-"));
        assert_eq!(a.len(), 28);
        assert_ne!(a, make_txn_id(date, dec!(450.00), "UPI-ZOMATO-1", Direction::Expense, 1));
        assert_ne!(a, make_txn_id(date, dec!(450.00), "UPI-ZOMATO-1", Direction::Income, 0));
    }

    #[test]
    fn test_ensure_unique_ids() {
        let mut batch = vec![
            txn("A", "2025-01-01", dec!(1), Direction::Expense, "x"),
            txn("A", "2025-01-01", dec!(1), Direction::Expense, "x"),
            txn("A-2", "2025-01-01", dec!(1), Direction::Expense, "x"),
        ];
        assert_eq!(ensure_unique_ids(&mut batch), 1);
        assert_eq!(batch[0].id, "A");
        assert_eq!(batch[1].id, "A-3");
        assert_eq!(batch[2].id, "A-2");
    }

    #[test]
    fn test_zomato_duplicate_across_days() {
        let mut batch = vec![
            txn("T1", "2025-01-01", dec!(450.00), Direction::Expense, "UPI-ZOMATO-1234567890"),
            txn("T2", "2025-01-02", dec!(450.00), Direction::Expense, "UPI-ZOMATO-9876543210"),
        ];
        let flagged = detect_duplicates(&mut batch, &[], &DuplicateSettings::default());
        assert_eq!(flagged, 1);
        assert!(!batch[0].is_duplicate);
        assert!(batch[1].is_duplicate);
        assert_eq!(batch[1].duplicate_of_id.as_deref(), Some("T1"));
    }

    #[test]
    fn test_each_condition_blocks_flag() {
        let settings = DuplicateSettings::default();
        let base = txn(
            "T1",
            "2025-01-01",
            dec!(450.00),
            Direction::Expense,
            "UPI-ZOMATO-1234567890",
        );

        let other_dir = txn(
            "T2",
            "2025-01-01",
            dec!(450.00),
            Direction::Income,
            "UPI-ZOMATO-1234567890",
        );
        assert!(!is_duplicate_pair(&base, &other_dir, &settings));

        let other_amount = txn(
            "T2",
            "2025-01-01",
            dec!(450.02),
            Direction::Expense,
            "UPI-ZOMATO-1234567890",
        );
        assert!(!is_duplicate_pair(&base, &other_amount, &settings));

        let far_date = txn(
            "T2",
            "2025-01-03",
            dec!(450.00),
            Direction::Expense,
            "UPI-ZOMATO-1234567890",
        );
        assert!(!is_duplicate_pair(&base, &far_date, &settings));

        let other_desc = txn(
            "T2",
            "2025-01-01",
            dec!(450.00),
            Direction::Expense,
            "UPI-SWIGGY-1234567890",
        );
        assert!(!is_duplicate_pair(&base, &other_desc, &settings));

        let penny = txn("T2", "2025-01-01", dec!(450.01), Direction::Expense, "UPI-ZOMATO-55");
        assert!(is_duplicate_pair(&base, &penny, &settings));
    }

    #[test]
    fn test_against_prior_history() {
        let prior = vec![txn(
            "OLD",
            "2024-12-31",
            dec!(99.00),
            Direction::Expense,
            "NETFLIX SUBSCRIPTION",
        )];
        let mut batch = vec![txn(
            "NEW",
            "2025-01-01",
            dec!(99.00),
            Direction::Expense,
            "NETFLIX SUBSCRIPTION",
        )];
        assert_eq!(detect_duplicates(&mut batch, &prior, &DuplicateSettings::default()), 1);
        assert_eq!(batch[0].duplicate_of_id.as_deref(), Some("OLD"));
        assert_eq!(find_existing_txn_ids(&prior, &batch), Vec::<String>::new());
    }

    #[test]
    fn test_reimported_row_flagged_against_its_prior_copy() {
        let prior = vec![
            txn("T1", "2025-01-01", dec!(450.00), Direction::Expense, "UPI-ZOMATO-1234567890"),
            txn("T2", "2025-01-01", dec!(99.00), Direction::Expense, "NETFLIX SUBSCRIPTION"),
        ];
        let mut batch = prior.clone();
        // Reconciliation may have flipped the re-imported copy.
        batch[1].direction = Direction::Income;

        assert_eq!(detect_duplicates(&mut batch, &prior, &DuplicateSettings::default()), 2);
        assert!(batch.iter().all(|t| t.is_duplicate));
        assert_eq!(batch[0].duplicate_of_id.as_deref(), Some("T1"));
        assert_eq!(batch[1].duplicate_of_id.as_deref(), Some("T2"));
    }

    #[test]
    fn test_same_id_within_batch_not_compared() {
        let mut batch = vec![
            txn("T1", "2025-01-01", dec!(450.00), Direction::Expense, "UPI-ZOMATO-1234567890"),
            txn("T1", "2025-01-01", dec!(450.00), Direction::Expense, "UPI-ZOMATO-1234567890"),
        ];
        assert_eq!(detect_duplicates(&mut batch, &[], &DuplicateSettings::default()), 0);
        assert!(batch.iter().all(|t| !t.is_duplicate));
    }

    #[test]
    fn test_jaccard_empty_sets() {
        let empty = BTreeSet::new();
        assert_eq!(jaccard(&empty, &empty), 0.0);
    }
}
