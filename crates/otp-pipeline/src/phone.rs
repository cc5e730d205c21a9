//! Phone number canonicalization for local-format mobile numbers.
//!
//! Accepts `08…`, `+628…`, `628…` and `8…` encodings of the same subscriber
//! and produces the `0`-prefixed local form, or rejects the input.

use crate::error::PipelineError;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;

/// Four-digit operator prefixes accepted after canonicalization.
const OPERATOR_PREFIXES: [&str; 40] = [
    "0811", "0812", "0813", "0814", "0815", "0816", "0817", "0818", "0819", //
    "0821", "0822", "0823", "0831", "0832", "0833", "0838", //
    "0851", "0852", "0853", "0855", "0856", "0857", "0858", "0859", //
    "0877", "0878", "0881", "0882", "0883", "0884", "0885", "0886", //
    "0887", "0888", "0889", "0895", "0896", "0897", "0898", "0899",
];

const MIN_LEN: usize = 10;
const MAX_LEN: usize = 15;

/// A validated, `0`-prefixed local phone number.
///
/// Deserialization goes through [`normalize`], so every value holds at least
/// the four prefix digits.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct CanonicalPhone(String);

impl CanonicalPhone {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The four-digit operator prefix.
    pub fn prefix(&self) -> &str {
        &self.0[..4]
    }
}

impl fmt::Display for CanonicalPhone {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for CanonicalPhone {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl From<CanonicalPhone> for String {
    fn from(phone: CanonicalPhone) -> Self {
        phone.0
    }
}

impl TryFrom<String> for CanonicalPhone {
    type Error = PipelineError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        normalize_or_err(&value)
    }
}

/// The accepted operator prefixes.
pub fn operator_prefixes() -> &'static [&'static str] {
    &OPERATOR_PREFIXES
}

/// Canonicalize `input`, or `None` if it is not a valid number.
pub fn normalize(input: &str) -> Option<CanonicalPhone> {
    let mut cleaned: String = input
        .trim()
        .chars()
        .filter(|c| !c.is_whitespace() && !matches!(c, '-' | '(' | ')' | '.'))
        .collect();

    // A bare "62" only counts as a country code on numbers longer than a
    // local number could be.
    if let Some(rest) = cleaned.strip_prefix("+62") {
        cleaned = format!("0{rest}");
    } else if cleaned.starts_with("62") && cleaned.chars().count() > MIN_LEN {
        cleaned = format!("0{}", &cleaned[2..]);
    }

    let digits: String = cleaned.chars().filter(|c| c.is_ascii_digit()).collect();

    if digits.starts_with('0') {
        return accept(digits);
    }
    if digits.len() >= 9 {
        // Both the `8…` form and any other leading digit get a local zero.
        return accept(format!("0{digits}"));
    }
    None
}

/// Like [`normalize`], reporting rejection as a validation error.
pub fn normalize_or_err(input: &str) -> Result<CanonicalPhone, PipelineError> {
    normalize(input)
        .ok_or_else(|| PipelineError::Validation(format!("Invalid phone number: {input:?}")))
}

fn accept(candidate: String) -> Option<CanonicalPhone> {
    let valid = (MIN_LEN..=MAX_LEN).contains(&candidate.len())
        && OPERATOR_PREFIXES.contains(&&candidate[..4]);
    valid.then_some(CanonicalPhone(candidate))
}

/// Phones parsed from free-form pasted text.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PhoneList {
    /// Canonical phones in first-seen order, without duplicates
    pub accepted: Vec<CanonicalPhone>,
    /// Tokens that looked like numbers but failed validation
    pub rejected: Vec<String>,
}

/// Split pasted text into phones.
///
/// Tokens are separated by whitespace, `,`, `;` or `|`. The `done` and `/end`
/// terminators and tokens without any digit are ignored.
pub fn parse_phone_list(text: &str) -> PhoneList {
    let mut list = PhoneList::default();
    let mut seen = HashSet::new();

    let tokens = text
        .split(|c: char| c.is_whitespace() || matches!(c, ',' | ';' | '|'))
        .filter(|t| !t.is_empty())
        .filter(|t| !t.eq_ignore_ascii_case("done") && !t.eq_ignore_ascii_case("/end"))
        .filter(|t| t.chars().any(|c| c.is_ascii_digit()));

    for token in tokens {
        match normalize(token) {
            Some(phone) => {
                if seen.insert(phone.clone()) {
                    list.accepted.push(phone);
                }
            }
            None => list.rejected.push(token.to_string()),
        }
    }
    list
}
