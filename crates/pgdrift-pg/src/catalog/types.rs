//! Text-to-value converters for built-in Postgres types.

use std::collections::HashMap;
use std::sync::OnceLock;

use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime};
use pgdrift_core::Value;
use rust_decimal::Decimal;

/// Converts the text form of one column value.
pub type Converter = fn(&str) -> Value;

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.f";
const TIMESTAMPTZ_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.f%#z";

static CONVERTERS: OnceLock<HashMap<&'static str, Converter>> = OnceLock::new();

fn converters() -> &'static HashMap<&'static str, Converter> {
    CONVERTERS.get_or_init(|| {
        let families: [(&[&'static str], Converter); 9] = [
            (&["bool"], convert_bool),
            (&["int2", "int4", "int8", "oid", "xid", "cid"], convert_int),
            (&["float4", "float8"], convert_float),
            (&["numeric"], convert_numeric),
            (&["json", "jsonb"], convert_json),
            (&["date"], convert_date),
            (&["time"], convert_time),
            (&["timestamp"], convert_timestamp),
            (&["timestamptz"], convert_timestamptz),
        ];

        families
            .into_iter()
            .flat_map(|(names, converter)| names.iter().map(move |name| (*name, converter)))
            .collect()
    })
}

/// Whether `type_name` has a dedicated converter.
pub fn is_known(type_name: &str) -> bool {
    converters().contains_key(type_name)
}

/// Convert `text` according to `type_name`.
///
/// Types without a converter, and text a converter cannot parse, come back
/// as [`Value::String`] unchanged. For converted types the empty string is NULL.
pub fn convert(type_name: &str, text: &str) -> Value {
    match converters().get(type_name) {
        Some(converter) => converter(text),
        None => Value::String(text.to_string()),
    }
}

fn passthrough(text: &str) -> Value {
    Value::String(text.to_string())
}

/// Run `parse`, treating "" as NULL and a parse failure as pass-through.
fn parsed<T>(text: &str, parse: impl FnOnce(&str) -> Option<T>, wrap: fn(T) -> Value) -> Value {
    if text.is_empty() {
        return Value::Null;
    }
    parse(text).map(wrap).unwrap_or_else(|| passthrough(text))
}

fn convert_bool(text: &str) -> Value {
    parsed(
        text,
        |s| match s {
            "t" | "true" => Some(true),
            "f" | "false" => Some(false),
            _ => None,
        },
        Value::Bool,
    )
}

fn convert_int(text: &str) -> Value {
    parsed(text, |s| s.parse::<i64>().ok(), Value::Int)
}

fn convert_float(text: &str) -> Value {
    parsed(text, |s| s.parse::<f64>().ok(), Value::Float)
}

/// Values a `Decimal` cannot hold exactly (NaN, more than 28 digits) stay as text.
fn convert_numeric(text: &str) -> Value {
    parsed(text, |s| Decimal::from_str_exact(s).ok(), Value::Decimal)
}

fn convert_json(text: &str) -> Value {
    parsed(
        text,
        |s| serde_json::from_str::<serde_json::Value>(s).ok(),
        Value::from,
    )
}

fn convert_date(text: &str) -> Value {
    parsed(
        text,
        |s| NaiveDate::parse_from_str(s, "%Y-%m-%d").ok(),
        Value::Date,
    )
}

fn convert_time(text: &str) -> Value {
    parsed(
        text,
        |s| NaiveTime::parse_from_str(s, "%H:%M:%S%.f").ok(),
        Value::Time,
    )
}

fn convert_timestamp(text: &str) -> Value {
    parsed(
        text,
        |s| NaiveDateTime::parse_from_str(s, TIMESTAMP_FORMAT).ok(),
        Value::Timestamp,
    )
}

fn convert_timestamptz(text: &str) -> Value {
    parsed(
        text,
        |s| DateTime::parse_from_str(s, TIMESTAMPTZ_FORMAT).ok(),
        Value::TimestampTz,
    )
}
