use std::fmt;

use chrono::NaiveDate;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

// Settings models
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconcileSettings {
	/// Pass/fail tolerance on aggregate debit and credit.
	pub absolute_tolerance: Decimal,
	/// Fraction of the stated debit total below which no correction is attempted.
	pub relative_band: Decimal,
	/// A single flip must reduce the combined error by more than this.
	pub min_improvement: Decimal,
	pub max_corrections: usize,
	/// Tolerance for `opening + credit - debit = closing` and running balances.
	pub balance_tolerance: Decimal,
}

impl Default for ReconcileSettings {
	fn default() -> Self {
		Self {
			absolute_tolerance: dec!(0.01),
			relative_band: dec!(0.05),
			min_improvement: dec!(1),
			max_corrections: 50,
			balance_tolerance: dec!(0.01),
		}
	}
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DuplicateSettings {
	pub similarity_threshold: f64,
	pub amount_tolerance: Decimal,
	pub date_window_days: i64,
	pub min_token_len: usize,
}

impl Default for DuplicateSettings {
	fn default() -> Self {
		Self {
			similarity_threshold: 0.85,
			amount_tolerance: dec!(0.01),
			date_window_days: 1,
			min_token_len: 3,
		}
	}
}

/// A keyword rule supplied from the settings file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KeywordRuleSetting {
	pub name: String,
	pub keywords: Vec<String>,
	pub category: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RuleSettings {
	pub extra_expense: Vec<KeywordRuleSetting>,
	pub extra_income: Vec<KeywordRuleSetting>,
	pub extra_merchants: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ParserSettings {
	pub reconcile: ReconcileSettings,
	pub duplicates: DuplicateSettings,
	pub rules: RuleSettings,
	/// Two-digit years above the pivot land in the 1900s.
	pub two_digit_year_pivot: u32,
}

impl Default for ParserSettings {
	fn default() -> Self {
		Self {
			reconcile: ReconcileSettings::default(),
			duplicates: DuplicateSettings::default(),
			rules: RuleSettings::default(),
			two_digit_year_pivot: 50,
		}
	}
}

// Transaction models
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Direction {
	Income,
	Expense,
}

impl Direction {
	pub fn flipped(self) -> Self {
		match self {
			Direction::Income => Direction::Expense,
			Direction::Expense => Direction::Income,
		}
	}

	pub fn as_str(self) -> &'static str {
		match self {
			Direction::Income => "INCOME",
			Direction::Expense => "EXPENSE",
		}
	}
}

impl fmt::Display for Direction {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

/// What kind of economic event a transaction is, independent of its display category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Nature {
	Consumption,
	Transfer,
	CashOut,
	InvestmentInflow,
	InvestmentOutflow,
	InvestmentReturn,
	PassiveIncome,
	Salary,
	Uncategorized,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum IncomeSource {
	Salary,
	Interest,
	Dividends,
	Refund,
	Transfer,
	#[serde(rename = "MF_Redemption")]
	MfRedemption,
	Freelance,
	Rental,
	Other,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PaymentMethod {
	#[serde(rename = "UPI")]
	Upi,
	#[serde(rename = "NEFT")]
	Neft,
	#[serde(rename = "IMPS")]
	Imps,
	#[serde(rename = "RTGS")]
	Rtgs,
	#[serde(rename = "ATM")]
	Atm,
	Cheque,
	#[serde(rename = "Card/POS")]
	Card,
	Other,
}

impl PaymentMethod {
	pub fn is_bank_rail(self) -> bool {
		matches!(
			self,
			PaymentMethod::Upi | PaymentMethod::Neft | PaymentMethod::Imps | PaymentMethod::Rtgs
		)
	}
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Transaction {
	pub id: String,
	pub date: NaiveDate,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub value_date: Option<NaiveDate>,
	/// Display name: rail prefixes, references and UPI handles removed.
	pub description: String,
	/// Narration exactly as printed on the statement.
	pub raw_description: String,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub cheque_no: Option<String>,
	pub amount: Decimal,
	pub direction: Direction,
	pub category: String,
	pub nature: Nature,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub income_source: Option<IncomeSource>,
	pub payment_method: PaymentMethod,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub post_balance: Option<Decimal>,
	#[serde(default)]
	pub is_duplicate: bool,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub duplicate_of_id: Option<String>,
	/// Set when reconciliation flipped the direction read from the columns.
	#[serde(default)]
	pub direction_corrected: bool,
}

impl Transaction {
	/// Amount with sign semantics applied: positive for income, negative for expense.
	pub fn signed_amount(&self) -> Decimal {
		match self.direction {
			Direction::Income => self.amount,
			Direction::Expense => -self.amount,
		}
	}
}

/// Totals and metadata printed by the bank on the statement itself.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatementSummary {
	pub opening_balance: Option<Decimal>,
	pub closing_balance: Option<Decimal>,
	pub total_debit: Option<Decimal>,
	pub total_credit: Option<Decimal>,
	pub account_number: Option<String>,
	pub customer_name: Option<String>,
	pub statement_period: Option<String>,
}

impl StatementSummary {
	pub fn has_totals(&self) -> bool {
		self.total_debit.is_some() && self.total_credit.is_some()
	}

	/// `opening + credit - debit - closing`, when all four values were printed.
	pub fn balance_drift(&self) -> Option<Decimal> {
		Some(
			self.opening_balance? + self.total_credit? - self.total_debit?
				- self.closing_balance?,
		)
	}
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationReport {
	pub is_valid: bool,
	pub errors: Vec<String>,
	pub warnings: Vec<String>,
	pub computed_debit: Decimal,
	pub computed_credit: Decimal,
	pub corrections_applied: usize,
	pub global_swap_applied: bool,
	pub duplicate_count: usize,
	pub skipped_rows: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParseResult {
	pub transactions: Vec<Transaction>,
	pub summary: StatementSummary,
	pub validation: ValidationReport,
}
