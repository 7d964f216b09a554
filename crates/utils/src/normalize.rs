//! Amount and date normalisation for statement cells.
//!
//! Both parsers are forgiving but deterministic: the same input string always
//! yields the same output, and neither ever panics on garbage.

use chrono::{Duration, NaiveDate};
use once_cell::sync::Lazy;
use regex::Regex;
use rust_decimal::Decimal;
use std::str::FromStr;

/// Two-digit years above this land in the 1900s, the rest in the 2000s.
pub const DEFAULT_YEAR_PIVOT: u32 = 50;

static CURRENCY_RE: Lazy<Regex> =
    Lazy::new(|| {
        Regex::new(r"(?i)(rs\.?|inr|usd|eur|gbp|[₹$€£])").expect("valid currency regex")
    });

static TIME_SUFFIX_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)[ T]+\d{1,2}:\d{2}(:\d{2}(\.\d+)?)?\s*(am|pm)?\s*(z|[+-]\d{2}:?\d{2})?$")
        .expect("valid time regex")
});

static ISO_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(\d{4})[-/.](\d{1,2})[-/.](\d{1,2})$").expect("valid iso regex"));

// Day first, month as number or name, then a 2 or 4 digit year.
static DMY_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(\d{1,2})(?:st|nd|rd|th)?[-/. ]+([A-Za-z]{3,9}|\d{1,2})[-/., ]+(\d{4}|\d{2})$")
        .expect("valid dmy regex")
});

const FALLBACK_FORMATS: &[&str] = &["%B %d, %Y", "%b %d, %Y", "%B %d %Y", "%b %d %Y", "%Y%m%d"];

/// Parses a statement amount into a decimal.
///
/// Strips currency markers and thousands separators (western `1,234,567.89`
/// and Indian `1,23,456.78` grouping alike). Parentheses, a leading or
/// trailing minus and a `Dr` suffix make the value negative. Blank or
/// unparseable input yields zero so an empty debit cell simply means "no debit".
pub fn parse_amount(raw: &str) -> Decimal {
    try_parse_amount(raw).unwrap_or(Decimal::ZERO)
}

/// Like [`parse_amount`] but distinguishes "nothing parseable" from zero.
pub fn try_parse_amount(raw: &str) -> Option<Decimal> {
    let trimmed = raw.trim();
    if trimmed.is_empty() || trimmed.chars().all(|c| c == '-') {
        return None;
    }

    let (body, mut negative) = strip_dr_cr(trimmed);
    let without_currency = CURRENCY_RE.replace_all(body, "");
    let mut s: String = without_currency.chars().filter(|c| !c.is_whitespace()).collect();

    if s.starts_with('(') && s.ends_with(')') && s.len() > 2 {
        negative = !negative;
        s = s[1..s.len() - 1].to_string();
    }
    if let Some(rest) = s.strip_prefix('-') {
        negative = !negative;
        s = rest.to_string();
    } else if let Some(rest) = s.strip_suffix('-') {
        negative = !negative;
        s = rest.to_string();
    } else if let Some(rest) = s.strip_prefix('+') {
        s = rest.to_string();
    }

    let normalized = normalize_separators(&s);
    if normalized.is_empty()
        || !normalized.chars().all(|c| c.is_ascii_digit() || c == '.')
        || normalized.matches('.').count() > 1
    {
        return None;
    }

    let value = Decimal::from_str(&normalized).ok()?;
    Some(if negative { -value } else { value })
}

fn strip_dr_cr(s: &str) -> (&str, bool) {
    if s.len() > 2 && s.is_char_boundary(s.len() - 2) {
        let (head, tail) = s.split_at(s.len() - 2);
        if tail.eq_ignore_ascii_case("dr") {
            return (head.trim_end().trim_end_matches('.'), true);
        }
        if tail.eq_ignore_ascii_case("cr") {
            return (head.trim_end().trim_end_matches('.'), false);
        }
    }
    (s, false)
}

/// Resolves which of `,` and `.` is the decimal separator and drops the other.
fn normalize_separators(s: &str) -> String {
    match (s.rfind(','), s.rfind('.')) {
        // 1.234,56
        (Some(comma), Some(dot)) if comma > dot => s.replace('.', "").replace(',', "."),
        (Some(_), Some(_)) => s.replace(',', ""),
        (Some(comma), None) => {
            let decimals = s.len() - comma - 1;
            if decimals == 2 && s.matches(',').count() == 1 {
                s.replace(',', ".")
            } else {
                s.replace(',', "")
            }
        }
        (None, _) => s.to_string(),
    }
}

/// Parses a statement date with the default two-digit year pivot.
///
/// Accepts `01-Feb-2026`, `01/02/2026`, `01-02-2026`, `2026-02-01`, the same
/// with two-digit years, an optional trailing time of day, and a few
/// month-name-first spellings as a generic fallback. Returns `None` on failure.
pub fn parse_date(raw: &str) -> Option<NaiveDate> {
    parse_date_with_pivot(raw, DEFAULT_YEAR_PIVOT)
}

pub fn parse_date_with_pivot(raw: &str, pivot: u32) -> Option<NaiveDate> {
    let s = raw.trim();
    if s.is_empty() {
        return None;
    }
    let s = TIME_SUFFIX_RE.replace(s, "");
    let s = s.trim();

    if let Some(caps) = ISO_RE.captures(s) {
        let year: i32 = caps[1].parse().ok()?;
        let month: u32 = caps[2].parse().ok()?;
        let day: u32 = caps[3].parse().ok()?;
        return NaiveDate::from_ymd_opt(year, month, day);
    }

    if let Some(caps) = DMY_RE.captures(s) {
        let day: u32 = caps[1].parse().ok()?;
        let month = match caps[2].parse::<u32>() {
            Ok(m) => m,
            Err(_) => month_from_name(&caps[2])?,
        };
        let year_token = &caps[3];
        let year: i32 = if year_token.len() == 2 {
            expand_two_digit_year(year_token.parse().ok()?, pivot)
        } else {
            year_token.parse().ok()?
        };
        return NaiveDate::from_ymd_opt(year, month, day);
    }

    FALLBACK_FORMATS
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(s, fmt).ok())
}

/// Spreadsheet cells sometimes carry the raw Excel serial instead of a date.
pub fn parse_date_or_serial(raw: &str, pivot: u32) -> Option<NaiveDate> {
    let s = raw.trim();
    if let Ok(serial) = s.parse::<f64>() {
        // 20000..80000 covers 1954..2119 and keeps plain amounts out.
        if (20000.0..80000.0).contains(&serial) {
            return excel_serial_to_date(serial);
        }
        return None;
    }
    parse_date_with_pivot(s, pivot)
}

/// Excel serial date conversion using the 1899-12-30 base.
pub fn excel_serial_to_date(serial: f64) -> Option<NaiveDate> {
    if !serial.is_finite() || serial < 1.0 {
        return None;
    }
    let base = NaiveDate::from_ymd_opt(1899, 12, 30)?;
    base.checked_add_signed(Duration::days(serial.floor() as i64))
}

pub fn expand_two_digit_year(yy: u32, pivot: u32) -> i32 {
    if yy > pivot {
        1900 + yy as i32
    } else {
        2000 + yy as i32
    }
}

fn month_from_name(name: &str) -> Option<u32> {
    let prefix: String = name.chars().take(3).collect::<String>().to_ascii_lowercase();
    let month = match prefix.as_str() {
        "jan" => 1,
        "feb" => 2,
        "mar" => 3,
        "apr" => 4,
        "may" => 5,
        "jun" => 6,
        "jul" => 7,
        "aug" => 8,
        "sep" => 9,
        "oct" => 10,
        "nov" => 11,
        "dec" => 12,
        _ => return None,
    };
    Some(month)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn ymd(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_parse_amount_grouping() {
        assert_eq!(parse_amount("1,23,456.78"), dec!(123456.78));
        assert_eq!(parse_amount("1,234,567.89"), dec!(1234567.89));
        assert_eq!(parse_amount("₹ 2,500.00"), dec!(2500.00));
        assert_eq!(parse_amount("Rs. 450"), dec!(450));
        assert_eq!(parse_amount("INR 99.5"), dec!(99.5));
        assert_eq!(parse_amount("1.234,56"), dec!(1234.56));
    }

    #[test]
    fn test_parse_amount_signs() {
        assert_eq!(parse_amount("(450.00)"), dec!(-450.00));
        assert_eq!(parse_amount("-12.5"), dec!(-12.5));
        assert_eq!(parse_amount("10,500.00 Cr"), dec!(10500.00));
        assert_eq!(parse_amount("75.00 Dr"), dec!(-75.00));
    }

    #[test]
    fn test_parse_amount_blank_is_zero() {
        assert_eq!(parse_amount(""), Decimal::ZERO);
        assert_eq!(parse_amount("   "), Decimal::ZERO);
        assert_eq!(parse_amount("-"), Decimal::ZERO);
        assert_eq!(parse_amount("abc"), Decimal::ZERO);
        assert_eq!(parse_amount("12.3.4"), Decimal::ZERO);
        assert_eq!(try_parse_amount(""), None);
        assert_eq!(try_parse_amount("0.00"), Some(Decimal::ZERO));
    }

    #[test]
    fn test_parse_date_formats() {
        assert_eq!(parse_date("01-Feb-2026"), Some(ymd(2026, 2, 1)));
        assert_eq!(parse_date("01/02/2026"), Some(ymd(2026, 2, 1)));
        assert_eq!(parse_date("01-02-2026"), Some(ymd(2026, 2, 1)));
        assert_eq!(parse_date("2026-02-01"), Some(ymd(2026, 2, 1)));
        assert_eq!(parse_date("01 February 2026"), Some(ymd(2026, 2, 1)));
        assert_eq!(parse_date("2026-02-01 00:00:00"), Some(ymd(2026, 2, 1)));
        assert_eq!(parse_date("01/02/2026 10:15 AM"), Some(ymd(2026, 2, 1)));
        assert_eq!(parse_date("Feb 1, 2026"), Some(ymd(2026, 2, 1)));
    }

    #[test]
    fn test_two_digit_year_pivot() {
        assert_eq!(parse_date("05-Mar-25"), Some(ymd(2025, 3, 5)));
        assert_eq!(parse_date("05/03/99"), Some(ymd(1999, 3, 5)));
        assert_eq!(parse_date("05/03/50"), Some(ymd(2050, 3, 5)));
        assert_eq!(parse_date_with_pivot("05/03/40", 30), Some(ymd(1940, 3, 5)));
    }

    #[test]
    fn test_parse_date_rejects_garbage() {
        assert_eq!(parse_date("not-a-date"), None);
        assert_eq!(parse_date(""), None);
        assert_eq!(parse_date("31/02/2026"), None);
        assert_eq!(parse_date("Opening Balance"), None);
    }

    #[test]
    fn test_excel_serial() {
        assert_eq!(parse_date_or_serial("45658", 50), Some(ymd(2025, 1, 1)));
        assert_eq!(parse_date_or_serial("450.00", 50), None);
        assert_eq!(parse_date_or_serial("01-Jan-2025", 50), Some(ymd(2025, 1, 1)));
    }
}
