//! Narration cleanup and text matching helpers shared by the classifier and
//! the duplicate detector.

use models::PaymentMethod;
use once_cell::sync::Lazy;
use regex::Regex;

const RAIL_PREFIXES: &[&str] = &[
    "UPI-", "UPI/", "UPI ", "NEFT-", "NEFT/", "NEFT ", "IMPS-", "IMPS/", "IMPS ", "RTGS-",
    "RTGS/", "RTGS ", "POS ", "POS/", "ACH-", "ACH/", "ECS-", "ECS/", "NACH-", "NACH/",
];

static SEGMENT_SPLIT_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[-/|*:]+").expect("valid segment regex"));
static IFSC_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z]{4}0[A-Za-z0-9]{6}$").expect("valid ifsc regex"));
static WHITESPACE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").expect("valid ws regex"));

pub fn collapse_whitespace(s: &str) -> String {
    WHITESPACE_RE.replace_all(s.trim(), " ").into_owned()
}

fn strip_rail_prefix(raw: &str) -> &str {
    let trimmed = raw.trim_start();
    for prefix in RAIL_PREFIXES {
        if trimmed.len() >= prefix.len()
            && trimmed.is_char_boundary(prefix.len())
            && trimmed[..prefix.len()].eq_ignore_ascii_case(prefix)
        {
            return &trimmed[prefix.len()..];
        }
    }
    trimmed
}

/// Segments of a narration worth showing to a human: reference numbers,
/// IFSC codes and VPA handles are dropped, repeats are collapsed.
fn meaningful_segments(raw: &str) -> Vec<String> {
    let body = strip_rail_prefix(raw);
    let mut out: Vec<String> = Vec::new();
    for segment in SEGMENT_SPLIT_RE.split(body) {
        let words: Vec<&str> = segment
            .split_whitespace()
            .filter(|w| !is_reference_token(w))
            .map(|w| w.split('@').next().unwrap_or(w))
            .filter(|w| !w.is_empty())
            .collect();
        if words.is_empty() {
            continue;
        }
        let joined = words.join(" ");
        if !joined.chars().any(|c| c.is_alphabetic()) {
            continue;
        }
        if out.iter().any(|s| s.eq_ignore_ascii_case(&joined)) {
            continue;
        }
        out.push(joined);
    }
    out
}

fn is_reference_token(token: &str) -> bool {
    let digits = token.chars().filter(|c| c.is_ascii_digit()).count();
    if digits >= 10 && digits * 2 >= token.len() {
        return true;
    }
    if token.starts_with('@') {
        return true;
    }
    IFSC_RE.is_match(token)
}

/// Produces a human-readable description from a raw bank narration.
///
/// `UPI-ZOMATO-1234567890` becomes `Zomato`. Falls back to the whitespace
/// collapsed raw text when nothing meaningful survives.
pub fn clean_description(raw: &str) -> String {
    let segments = meaningful_segments(raw);
    if segments.is_empty() {
        return collapse_whitespace(raw);
    }
    title_case(&segments.join(" "))
}

/// The first meaningful segment of a narration, usually the payee or payer.
pub fn counterparty(raw: &str) -> Option<String> {
    meaningful_segments(raw).into_iter().next()
}

fn title_case(s: &str) -> String {
    s.split_whitespace()
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => {
                    first.to_uppercase().collect::<String>() + &chars.as_str().to_lowercase()
                }
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// Lowercases and replaces every non-alphanumeric run with a single space so
/// keyword matching sees `upi-swiggy/123` as `upi swiggy 123`.
pub fn normalize_for_matching(raw: &str) -> String {
    let mapped: String = raw
        .chars()
        .map(|c| {
            if c.is_alphanumeric() {
                c.to_ascii_lowercase()
            } else {
                ' '
            }
        })
        .collect();
    collapse_whitespace(&mapped)
}

/// True when `keyword` occurs in normalized `text` starting at a word boundary.
/// Multi-word keywords match as phrases, and a keyword may be a word prefix
/// (`insur` hits `insurance`).
pub fn matches_keyword(text: &str, keyword: &str) -> bool {
    let kw = normalize_for_matching(keyword);
    if kw.is_empty() {
        return false;
    }
    let mut start = 0;
    while let Some(pos) = text[start..].find(&kw) {
        let abs = start + pos;
        let at_boundary = abs == 0 || text.as_bytes()[abs - 1] == b' ';
        if at_boundary {
            return true;
        }
        start = abs + kw.len().max(1);
        if start >= text.len() {
            break;
        }
    }
    false
}

/// Whole-word variant of [`matches_keyword`].
pub fn matches_word(text: &str, word: &str) -> bool {
    let kw = normalize_for_matching(word);
    if kw.is_empty() {
        return false;
    }
    let padded = format!(" {} ", text);
    padded.contains(&format!(" {} ", kw))
}

pub fn contains_any(text: &str, keywords: &[String]) -> bool {
    keywords.iter().any(|kw| matches_keyword(text, kw))
}

const METHOD_TABLE: &[(&[&str], PaymentMethod)] = &[
    (&["upi"], PaymentMethod::Upi),
    (&["neft"], PaymentMethod::Neft),
    (&["imps"], PaymentMethod::Imps),
    (&["rtgs"], PaymentMethod::Rtgs),
    (
        &["atm", "atw", "nwd", "cash wdl", "cash withdrawal"],
        PaymentMethod::Atm,
    ),
    (
        &["chq", "cheque", "clg", "clearing"],
        PaymentMethod::Cheque,
    ),
    (&["pos", "card", "ecom", "vps", "debit card"], PaymentMethod::Card),
];

/// Payment rail implied by the raw narration.
pub fn payment_method(raw: &str) -> PaymentMethod {
    let text = normalize_for_matching(raw);
    METHOD_TABLE
        .iter()
        .find(|(words, _)| words.iter().any(|w| matches_word(&text, w)))
        .map(|(_, method)| *method)
        .unwrap_or(PaymentMethod::Other)
}
