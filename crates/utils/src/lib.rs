pub mod description;
pub mod normalize;
pub mod rules;
pub mod transactions;

// Re-export commonly used items
pub use crate::description::{
    clean_description, counterparty, normalize_for_matching, payment_method,
};
pub use crate::normalize::{
    parse_amount, parse_date, parse_date_or_serial, parse_date_with_pivot, try_parse_amount,
};
pub use crate::rules::{Classification, RuleBook, RuleInput};
pub use crate::transactions::{
    detect_duplicates, ensure_unique_ids, find_existing_txn_ids, make_txn_id,
};
