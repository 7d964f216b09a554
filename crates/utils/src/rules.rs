use models::{Direction, IncomeSource, KeywordRuleSetting, Nature, PaymentMethod, RuleSettings};
use serde::{Deserialize, Serialize};

use crate::description::{contains_any, matches_word};

/// Rule tables for classifying transactions.
/// Every table is an ordered list of rules; the first matching rule wins.

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Rule<T> {
    pub name: String,
    pub conditions: Vec<Condition>,
    pub condition_operator: ConditionOperator,
    pub outcome: T,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Condition {
    /// Normalized narration contains one of the keywords at a word boundary
    DescriptionContainsAny { values: Vec<String> },

    /// Normalized narration contains none of the keywords
    DescriptionContainsNone { values: Vec<String> },

    DirectionIs { direction: Direction },

    /// UPI, NEFT, IMPS or RTGS
    PaymentMethodIsBankRail,

    /// Counterparty reads like an individual rather than a business
    CounterpartyIsPerson,

    /// Narration mentions a merchant from the consumption tables
    KnownMerchant,

    CategoryIn { values: Vec<String> },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ConditionOperator {
    And,
    Or,
}

/// What a rule gets to look at. `text` is already normalized for matching.
#[derive(Debug, Clone)]
pub struct RuleInput<'a> {
    pub text: &'a str,
    pub counterparty: Option<&'a str>,
    pub direction: Direction,
    pub payment_method: PaymentMethod,
    pub category: Option<&'a str>,
}

impl<T> Rule<T> {
    pub fn new(name: &str, conditions: Vec<Condition>, outcome: T) -> Self {
        Self {
            name: name.to_string(),
            conditions,
            condition_operator: ConditionOperator::And,
            outcome,
        }
    }

    /// Evaluates if the rule matches a transaction
    pub fn matches(&self, input: &RuleInput, book: &RuleBook) -> bool {
        if self.conditions.is_empty() {
            return false; // No conditions means no match
        }

        match self.condition_operator {
            ConditionOperator::And => self.conditions.iter().all(|c| c.evaluate(input, book)),
            ConditionOperator::Or => self.conditions.iter().any(|c| c.evaluate(input, book)),
        }
    }
}

impl Condition {
    pub fn evaluate(&self, input: &RuleInput, book: &RuleBook) -> bool {
        match self {
            Condition::DescriptionContainsAny { values } => contains_any(input.text, values),
            Condition::DescriptionContainsNone { values } => !contains_any(input.text, values),
            Condition::DirectionIs { direction } => input.direction == *direction,
            Condition::PaymentMethodIsBankRail => input.payment_method.is_bank_rail(),
            Condition::CounterpartyIsPerson => input
                .counterparty
                .map(|name| book.looks_like_person(name))
                .unwrap_or(false),
            Condition::KnownMerchant => book.is_known_merchant(input.text),
            Condition::CategoryIn { values } => input
                .category
                .map(|c| values.iter().any(|v| v.eq_ignore_ascii_case(c)))
                .unwrap_or(false),
        }
    }
}

/// Result of running every table against one transaction.
#[derive(Debug, Clone, PartialEq)]
pub struct Classification {
    pub category: String,
    pub nature: Nature,
    pub income_source: Option<IncomeSource>,
}

pub const DEFAULT_EXPENSE_CATEGORY: &str = "Other";
pub const DEFAULT_INCOME_CATEGORY: &str = "Other Income";

const CASH_KEYWORDS: &[&str] = &[
    "atm",
    "cash wdl",
    "cash withdrawal",
    "atw",
    "nwd",
    "self withdrawal",
];
const BROKER_KEYWORDS: &[&str] = &[
    "zerodha", "groww", "upstox", "kuvera", "paytm money", "angel one", "angel broking",
    "icici direct", "hdfc securities", "kotak securities", "mutual fund", "camsonline",
    "cams", "kfintech", "karvy", "bse star", "nse clearing", "indian clearing", "sip",
];
const RETURN_KEYWORDS: &[&str] = &["redemption", "redeem", "dividend", "maturity", "payout"];
const DIVIDEND_KEYWORDS: &[&str] = &["dividend", "divd", "div pay"];
const INTEREST_KEYWORDS: &[&str] = &[
    "interest",
    "int pd",
    "int cr",
    "int credit",
    "sb int",
    "fd int",
];
const SALARY_KEYWORDS: &[&str] = &["salary", "sal cr", "payroll", "wages", "stipend"];
const SELF_TRANSFER_KEYWORDS: &[&str] =
    &["self transfer", "own account", "to self", "from self", "sweep"];
const BUSINESS_MARKERS: &[&str] = &[
    "ltd", "limited", "pvt", "private", "llp", "inc", "corp", "corporation", "company", "co",
    "services", "solutions", "technologies", "enterprises", "traders", "store", "stores",
    "mart", "bank", "payments", "retail", "foods", "restaurant", "hotel", "hospital",
    "pharmacy", "clinic", "insurance", "finance", "industries", "agency", "and", "the",
];

fn words(list: &[&str]) -> Vec<String> {
    list.iter().map(|s| s.to_string()).collect()
}

fn keyword_rule<T>(name: &str, keywords: &[&str], outcome: T) -> Rule<T> {
    Rule::new(
        name,
        vec![Condition::DescriptionContainsAny { values: words(keywords) }],
        outcome,
    )
}

fn builtin_expense_categories() -> Vec<Rule<String>> {
    let table: &[(&str, &[&str], &str)] = &[
        ("atm", &["atm", "cash wdl", "cash withdrawal", "atw", "nwd"], "ATM"),
        (
            "investments",
            &[
                "zerodha", "groww", "upstox", "kuvera", "mutual fund", "sip", "camsonline",
                "kfintech", "indian clearing", "nps", "ppf",
            ],
            "Investments",
        ),
        (
            "insurance",
            &[
                "insurance", "insur", "lic premium", "lic of india", "policy premium",
                "hdfc life", "icici pru",
            ],
            "Insurance",
        ),
        (
            "loans",
            &["emi", "loan", "bajaj finance", "home loan", "car loan", "nach"],
            "Loans & EMI",
        ),
        (
            "groceries",
            &[
                "bigbasket", "big basket", "blinkit", "grofers", "zepto", "dmart", "d mart",
                "reliance fresh", "more retail", "grocery", "supermarket", "jiomart", "instamart",
            ],
            "Groceries",
        ),
        (
            "food",
            &[
                "zomato", "swiggy", "dominos", "domino", "pizza", "mcdonald", "kfc", "starbucks",
                "cafe", "restaurant", "eatsure", "dunzo", "burger", "biryani", "chaayos",
            ],
            "Food & Dining",
        ),
        (
            "transport",
            &[
                "uber", "ola", "rapido", "irctc", "redbus", "metro", "fuel", "petrol", "diesel",
                "indian oil", "iocl", "hpcl", "bpcl", "fastag", "indigo", "air india", "makemytrip",
            ],
            "Transport",
        ),
        (
            "entertainment",
            &[
                "netflix", "spotify", "hotstar", "prime video", "bookmyshow", "pvr", "inox",
                "youtube", "sonyliv", "zee5", "steam",
            ],
            "Entertainment",
        ),
        (
            "shopping",
            &[
                "amazon", "flipkart", "myntra", "ajio", "nykaa", "meesho", "croma",
                "reliance digital", "tata cliq", "decathlon", "ikea",
            ],
            "Shopping",
        ),
        (
            "utilities",
            &[
                "electricity", "bescom", "tata power", "adani electricity", "water bill",
                "gas bill", "indane", "bharat gas", "airtel", "jio", "vodafone", "bsnl",
                "broadband", "recharge", "dth", "tata play", "bill pay", "billpay",
            ],
            "Utilities",
        ),
        (
            "housing",
            &["rent", "maintenance", "society", "nobroker", "housing", "landlord"],
            "Housing",
        ),
        (
            "healthcare",
            &[
                "pharmacy", "apollo", "medplus", "netmeds", "pharmeasy", "1mg", "hospital",
                "clinic", "diagnostic", "lab", "doctor", "medical",
            ],
            "Healthcare",
        ),
        (
            "transfers",
            &["neft", "imps", "rtgs", "upi", "transfer", "trf"],
            "Transfers",
        ),
    ];

    table
        .iter()
        .map(|(name, keywords, category)| keyword_rule(name, keywords, category.to_string()))
        .collect()
}

fn builtin_income_categories() -> Vec<Rule<String>> {
    let table: &[(&str, &[&str], &str)] = &[
        ("salary", SALARY_KEYWORDS, "Salary"),
        ("dividends", DIVIDEND_KEYWORDS, "Dividends"),
        ("interest", INTEREST_KEYWORDS, "Interest"),
        (
            "investment_returns",
            &[
                "redemption", "redeem", "mutual fund", "zerodha", "groww", "maturity",
                "camsonline", "kfintech",
            ],
            "Investment Returns",
        ),
        ("refund", &["refund", "reversal", "cashback", "chargeback"], "Refund"),
        (
            "freelance",
            &["freelance", "consulting", "invoice", "upwork", "fiverr"],
            "Freelance Income",
        ),
        ("rental", &["rent received", "rental", "rent from"], "Rental Income"),
        ("transfer", &["neft", "imps", "rtgs", "upi", "transfer", "trf"], "Transfer"),
    ];

    table
        .iter()
        .map(|(name, keywords, category)| keyword_rule(name, keywords, category.to_string()))
        .collect()
}

fn builtin_natures() -> Vec<Rule<Nature>> {
    use Condition::*;
    let income = || DirectionIs { direction: Direction::Income };
    let expense = || DirectionIs { direction: Direction::Expense };
    let any = |list: &[&str]| DescriptionContainsAny { values: words(list) };

    vec![
        Rule::new("cash_out", vec![expense(), any(CASH_KEYWORDS)], Nature::CashOut),
        Rule::new(
            "investment_return",
            vec![income(), any(BROKER_KEYWORDS), any(RETURN_KEYWORDS)],
            Nature::InvestmentReturn,
        ),
        Rule::new(
            "investment_inflow",
            vec![income(), any(BROKER_KEYWORDS)],
            Nature::InvestmentInflow,
        ),
        Rule::new(
            "investment_outflow",
            vec![expense(), any(BROKER_KEYWORDS)],
            Nature::InvestmentOutflow,
        ),
        Rule::new("dividend", vec![income(), any(DIVIDEND_KEYWORDS)], Nature::InvestmentReturn),
        Rule::new("interest", vec![income(), any(INTEREST_KEYWORDS)], Nature::PassiveIncome),
        Rule::new("salary", vec![income(), any(SALARY_KEYWORDS)], Nature::Salary),
        Rule::new(
            "person_transfer",
            vec![PaymentMethodIsBankRail, CounterpartyIsPerson],
            Nature::Transfer,
        ),
        Rule::new("self_transfer", vec![any(SELF_TRANSFER_KEYWORDS)], Nature::Transfer),
        Rule::new("merchant", vec![KnownMerchant], Nature::Consumption),
    ]
}

fn builtin_income_sources() -> Vec<Rule<IncomeSource>> {
    vec![
        keyword_rule(
            "refund",
            &["refund", "reversal", "cashback", "chargeback"],
            IncomeSource::Refund,
        ),
        keyword_rule(
            "freelance",
            &["freelance", "consulting", "invoice", "upwork", "fiverr"],
            IncomeSource::Freelance,
        ),
        keyword_rule("rental", &["rent received", "rental", "rent from"], IncomeSource::Rental),
        keyword_rule("dividend", DIVIDEND_KEYWORDS, IncomeSource::Dividends),
        keyword_rule("interest", INTEREST_KEYWORDS, IncomeSource::Interest),
    ]
}

/// Categories whose keywords double as the merchant table for nature rules.
const MERCHANT_CATEGORIES: &[&str] = &[
    "Groceries",
    "Food & Dining",
    "Transport",
    "Entertainment",
    "Shopping",
    "Utilities",
    "Healthcare",
];

#[derive(Debug, Clone)]
pub struct RuleBook {
    pub income_categories: Vec<Rule<String>>,
    pub expense_categories: Vec<Rule<String>>,
    pub natures: Vec<Rule<Nature>>,
    pub income_sources: Vec<Rule<IncomeSource>>,
    pub merchants: Vec<String>,
}

impl Default for RuleBook {
    fn default() -> Self {
        Self::builtin()
    }
}

impl RuleBook {
    pub fn builtin() -> Self {
        let expense_categories = builtin_expense_categories();
        let merchants = merchant_keywords(&expense_categories);
        Self {
            income_categories: builtin_income_categories(),
            expense_categories,
            natures: builtin_natures(),
            income_sources: builtin_income_sources(),
            merchants,
        }
    }

    /// Built-in tables with user rules placed ahead of them so they win.
    pub fn with_settings(settings: &RuleSettings) -> Self {
        let mut book = Self::builtin();
        let to_rules = |list: &[KeywordRuleSetting]| -> Vec<Rule<String>> {
            list.iter()
                .filter(|r| !r.keywords.is_empty())
                .map(|r| {
                    Rule::new(
                        &r.name,
                        vec![Condition::DescriptionContainsAny { values: r.keywords.clone() }],
                        r.category.clone(),
                    )
                })
                .collect()
        };

        let mut expense = to_rules(&settings.extra_expense);
        book.merchants.extend(
            expense
                .iter()
                .flat_map(|r| r.conditions.iter())
                .flat_map(|c| match c {
                    Condition::DescriptionContainsAny { values } => values.clone(),
                    _ => Vec::new(),
                }),
        );
        expense.append(&mut book.expense_categories);
        book.expense_categories = expense;

        let mut income = to_rules(&settings.extra_income);
        income.append(&mut book.income_categories);
        book.income_categories = income;

        book.merchants
            .extend(settings.extra_merchants.iter().map(|m| m.to_lowercase()));
        book
    }

    pub fn is_known_merchant(&self, text: &str) -> bool {
        contains_any(text, &self.merchants)
    }

    /// Two to four purely alphabetic words, none of them a business marker,
    /// and not a merchant we already know.
    pub fn looks_like_person(&self, name: &str) -> bool {
        let lowered = name.to_lowercase();
        let parts: Vec<&str> = lowered.split_whitespace().collect();
        if !(2..=4).contains(&parts.len()) {
            return false;
        }
        if !parts
            .iter()
            .all(|p| p.chars().all(|c| c.is_alphabetic() || c == '.'))
        {
            return false;
        }
        if BUSINESS_MARKERS.iter().any(|m| matches_word(&lowered, m)) {
            return false;
        }
        !self.is_known_merchant(&lowered)
    }

    pub fn category(&self, input: &RuleInput) -> String {
        let (table, fallback) = match input.direction {
            Direction::Income => (&self.income_categories, DEFAULT_INCOME_CATEGORY),
            Direction::Expense => (&self.expense_categories, DEFAULT_EXPENSE_CATEGORY),
        };
        first_match(table, input, self)
            .cloned()
            .unwrap_or_else(|| fallback.to_string())
    }

    pub fn nature(&self, input: &RuleInput) -> Nature {
        first_match(&self.natures, input, self)
            .copied()
            .unwrap_or(Nature::Uncategorized)
    }

    /// Income source for income rows; expense rows never get one.
    pub fn income_source(&self, input: &RuleInput, nature: Nature) -> Option<IncomeSource> {
        if input.direction != Direction::Income {
            return None;
        }
        let source = match nature {
            Nature::Salary => IncomeSource::Salary,
            Nature::InvestmentReturn => {
                if contains_any(input.text, &words(DIVIDEND_KEYWORDS)) {
                    IncomeSource::Dividends
                } else {
                    IncomeSource::MfRedemption
                }
            }
            Nature::PassiveIncome => IncomeSource::Interest,
            Nature::Transfer => IncomeSource::Transfer,
            _ => first_match(&self.income_sources, input, self)
                .copied()
                .unwrap_or(IncomeSource::Other),
        };
        Some(source)
    }

    /// Runs category, nature and income source tables in that order.
    pub fn classify(&self, input: &RuleInput) -> Classification {
        let category = self.category(input);
        let with_category = RuleInput {
            category: Some(&category),
            ..input.clone()
        };
        let nature = self.nature(&with_category);
        let income_source = self.income_source(&with_category, nature);
        Classification {
            category,
            nature,
            income_source,
        }
    }
}

fn first_match<'r, T>(rules: &'r [Rule<T>], input: &RuleInput, book: &RuleBook) -> Option<&'r T> {
    rules
        .iter()
        .find(|rule| rule.matches(input, book))
        .map(|rule| &rule.outcome)
}

fn merchant_keywords(expense: &[Rule<String>]) -> Vec<String> {
    expense
        .iter()
        .filter(|r| MERCHANT_CATEGORIES.contains(&r.outcome.as_str()))
        .flat_map(|r| r.conditions.iter())
        .flat_map(|c| match c {
            Condition::DescriptionContainsAny { values } => values.clone(),
            _ => Vec::new(),
        })
        .collect()
}
