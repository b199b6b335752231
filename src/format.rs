//! Value formatting
//!
//! Turns a resolved data value into the text written into the document.
//! The rendering is chosen by an ordered decision table
//! ([`ValueFormatter::classify`]):
//!
//! | Order | Input | Rendering |
//! |-------|-------|-----------|
//! | 1 | null | empty |
//! | 2 | boolean | true token / empty |
//! | 3 | string matching a date pattern | `DD.MM.YYYY` |
//! | 4 | numeric value + money hint | two decimals, grouped thousands |
//! | 5 | anything else | plain string form |
//!
//! The first row that matches wins, and every row is total: formatting never
//! fails.

use crate::config::FormatConfig;
use chrono::{NaiveDate, NaiveDateTime};
use regex::Regex;
use rust_decimal::{Decimal, RoundingStrategy};
use serde_json::Value;
use std::str::FromStr;
use std::sync::LazyLock;

static ISO_DATE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(\d{4})-(\d{2})-(\d{2})").expect("valid regex"));

static DOTTED_DATE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(\d{1,2})\.\s*(\d{1,2})\.\s*(\d{4})").expect("valid regex")
});

/// Outcome of the decision table
#[derive(Debug, Clone, PartialEq)]
pub enum Rendering {
    Blank,
    Flag(bool),
    Date(NaiveDate),
    Money(Decimal),
    Plain(String),
}

/// Formats values according to a [`FormatConfig`]
#[derive(Debug, Clone)]
pub struct ValueFormatter {
    true_token: String,
    currency_hints: Vec<String>,
    thousands_separator: String,
    decimal_separator: String,
}

impl Default for ValueFormatter {
    fn default() -> Self {
        Self::new(&FormatConfig::default())
    }
}

impl ValueFormatter {
    pub fn new(config: &FormatConfig) -> Self {
        Self {
            true_token: config.true_token.clone(),
            currency_hints: config
                .currency_hints
                .iter()
                .map(|h| h.to_lowercase())
                .collect(),
            thousands_separator: config.thousands_separator.clone(),
            decimal_separator: config.decimal_separator.clone(),
        }
    }

    /// Format `value`; `hint` is the field or path name used for the money heuristic
    pub fn format(&self, hint: &str, value: &Value) -> String {
        self.render(self.classify(hint, value))
    }

    /// Pick the rendering for a value
    pub fn classify(&self, hint: &str, value: &Value) -> Rendering {
        match value {
            Value::Null => Rendering::Blank,
            Value::Bool(b) => Rendering::Flag(*b),
            Value::String(s) => {
                if let Some(date) = parse_date(s) {
                    return Rendering::Date(date);
                }
                if self.is_money_hint(hint) {
                    if let Some(amount) = parse_decimal(s) {
                        return Rendering::Money(amount);
                    }
                }
                Rendering::Plain(s.clone())
            }
            Value::Number(n) => {
                let text = n.to_string();
                if self.is_money_hint(hint) {
                    if let Some(amount) = parse_decimal(&text) {
                        return Rendering::Money(amount);
                    }
                }
                Rendering::Plain(text)
            }
            Value::Array(_) | Value::Object(_) => Rendering::Plain(value.to_string()),
        }
    }

    pub fn render(&self, rendering: Rendering) -> String {
        match rendering {
            Rendering::Blank => String::new(),
            Rendering::Flag(true) => self.true_token.clone(),
            Rendering::Flag(false) => String::new(),
            Rendering::Date(date) => format_date(date),
            Rendering::Money(amount) => self.format_money(amount),
            Rendering::Plain(s) => s,
        }
    }

    fn is_money_hint(&self, hint: &str) -> bool {
        let hint = hint.to_lowercase();
        self.currency_hints.iter().any(|h| hint.contains(h.as_str()))
    }

    /// Two fractional digits, thousands grouped
    pub fn format_money(&self, amount: Decimal) -> String {
        let mut rounded = amount.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero);
        rounded.rescale(2);
        let text = rounded.abs().to_string();
        let (int_part, frac_part) = text.split_once('.').unwrap_or((text.as_str(), "00"));

        let mut grouped = String::new();
        let digits: Vec<char> = int_part.chars().collect();
        for (i, c) in digits.iter().enumerate() {
            if i > 0 && (digits.len() - i) % 3 == 0 {
                grouped.push_str(&self.thousands_separator);
            }
            grouped.push(*c);
        }

        let sign = if rounded.is_sign_negative() && !rounded.is_zero() {
            "-"
        } else {
            ""
        };
        format!("{}{}{}{}", sign, grouped, self.decimal_separator, frac_part)
    }
}

/// Format with the default configuration
pub fn format_value(hint: &str, value: &Value) -> String {
    ValueFormatter::default().format(hint, value)
}

/// `DD.MM.YYYY`
pub fn format_date(date: NaiveDate) -> String {
    date.format("%d.%m.%Y").to_string()
}

/// `DD.MM.YYYY HH:MM`
pub fn format_datetime(at: NaiveDateTime) -> String {
    at.format("%d.%m.%Y %H:%M").to_string()
}

/// Try the date patterns in order; the first one that yields a valid date wins
pub fn parse_date(s: &str) -> Option<NaiveDate> {
    let s = s.trim();
    [&*ISO_DATE, &*DOTTED_DATE]
        .iter()
        .enumerate()
        .find_map(|(i, re)| {
            let caps = re.captures(s)?;
            let a: u32 = caps[1].parse().ok()?;
            let b: u32 = caps[2].parse().ok()?;
            let c: u32 = caps[3].parse().ok()?;
            if i == 0 {
                NaiveDate::from_ymd_opt(a as i32, b, c)
            } else {
                NaiveDate::from_ymd_opt(c as i32, b, a)
            }
        })
}

/// Parse a number-looking string as a decimal
pub fn parse_decimal(s: &str) -> Option<Decimal> {
    let s = s.trim();
    if s.is_empty() {
        return None;
    }
    Decimal::from_str(s)
        .or_else(|_| Decimal::from_scientific(s))
        .ok()
}
