//! Derived values
//!
//! Optional data preparation that runs before the engine: sums over item
//! arrays, differences between sums, array lengths and the generation
//! timestamp are written into one object of the data tree so templates can
//! map them like any other value.
//!
//! ```text
//! { "items": [{"net": "100", "gross": "121"}, ...],
//!   "computed": { "total_net": "100.00", "total_gross": "121.00",
//!                 "vat": "21.00", "item_count": 1,
//!                 "generated_date": "15.02.2025", ... } }
//! ```
//!
//! Keys already present in the target object are left untouched.

use crate::config::DerivedConfig;
use crate::error::{Error, Result};
use crate::expr::Path;
use crate::format::{format_date, format_datetime, parse_decimal};
use chrono::NaiveDateTime;
use rust_decimal::{Decimal, RoundingStrategy};
use serde_json::{Map, Value};
use tracing::debug;

/// Write the configured derived values into `data[config.target]`.
///
/// `data` must be an object; the target is created when missing and must be
/// an object when present.
pub fn enrich(data: &mut Value, config: &DerivedConfig, now: NaiveDateTime) -> Result<()> {
    let mut derived = Map::new();

    for rule in &config.totals {
        let items = Path::parse(&rule.items)?;
        let field = Path::parse(&rule.field)?;
        let total = sum(items.lookup(data), &field);
        derived.insert(rule.name.clone(), Value::String(money_string(total)));
    }

    for rule in &config.counts {
        let items = Path::parse(&rule.items)?;
        let count = match items.lookup(data) {
            Some(Value::Array(values)) => values.len(),
            _ => 0,
        };
        derived.insert(rule.name.clone(), Value::from(count));
    }

    let Value::Object(root) = data else {
        return Err(Error::Other("derived values need an object at the data root".into()));
    };
    let target = root
        .entry(config.target.clone())
        .or_insert_with(|| Value::Object(Map::new()));
    let Value::Object(target) = target else {
        return Err(Error::Other(format!(
            "'{}' exists in the data and is not an object",
            config.target
        )));
    };

    for (name, value) in derived {
        insert_new(target, name, value);
    }

    // differences read the effective totals, so preserved values take part
    for rule in &config.differences {
        let minuend = decimal_entry(target, &rule.minuend)?;
        let subtrahend = decimal_entry(target, &rule.subtrahend)?;
        insert_new(
            target,
            rule.name.clone(),
            Value::String(money_string(minuend - subtrahend)),
        );
    }

    if config.timestamp {
        insert_new(target, "generated_date".into(), Value::String(format_date(now.date())));
        insert_new(
            target,
            "generated_time".into(),
            Value::String(now.format("%H:%M").to_string()),
        );
        insert_new(target, "generated_at".into(), Value::String(format_datetime(now)));
    }

    Ok(())
}

fn insert_new(target: &mut Map<String, Value>, name: String, value: Value) {
    if target.contains_key(&name) {
        debug!(key = %name, "derived value already present, kept");
        return;
    }
    debug!(key = %name, value = %value, "derived");
    target.insert(name, value);
}

/// Sum `field` over an array; elements without a numeric value count as zero
fn sum(items: Option<&Value>, field: &Path) -> Decimal {
    let Some(Value::Array(items)) = items else {
        return Decimal::ZERO;
    };
    items
        .iter()
        .filter_map(|item| field.lookup(item))
        .filter_map(numeric)
        .sum()
}

fn numeric(value: &Value) -> Option<Decimal> {
    match value {
        Value::Number(n) => parse_decimal(&n.to_string()),
        Value::String(s) => parse_decimal(s),
        _ => None,
    }
}

fn decimal_entry(target: &Map<String, Value>, name: &str) -> Result<Decimal> {
    let value = target
        .get(name)
        .ok_or_else(|| Error::Config(format!("difference refers to unknown total '{}'", name)))?;
    numeric(value)
        .ok_or_else(|| Error::Config(format!("'{}' is not a number: {}", name, value)))
}

/// Two fractional digits, no grouping
fn money_string(amount: Decimal) -> String {
    let mut rounded = amount.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero);
    rounded.rescale(2);
    rounded.to_string()
}
