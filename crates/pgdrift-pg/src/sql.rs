//! Small helpers for building the few statements we issue.

use pgdrift_core::{Row, Value};

use crate::error::{PgError, PgResult};

/// Quote a string as a SQL literal.
pub fn quote_literal(s: &str) -> String {
    format!("'{}'", s.replace('\'', "''"))
}

/// Render a value as a SQL literal, e.g. to resume from a saved cursor.
///
/// Integers and booleans stay bare. Everything else is quoted and left for
/// Postgres to coerce to the column's type, so a `real` or `numeric` key is
/// compared at its own precision.
pub fn value_literal(value: &Value) -> String {
    match value {
        Value::Null => "NULL".to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Int(i) => i.to_string(),
        Value::Float(f) if f.is_finite() => quote_literal(&f.to_string()),
        Value::Float(f) if f.is_nan() => quote_literal("NaN"),
        Value::Float(f) if *f > 0.0 => quote_literal("Infinity"),
        Value::Float(_) => quote_literal("-Infinity"),
        Value::Decimal(d) => quote_literal(&d.to_string()),
        Value::String(s) => quote_literal(s),
        Value::Date(d) => quote_literal(&d.format("%Y-%m-%d").to_string()),
        Value::Time(t) => quote_literal(&t.format("%H:%M:%S%.f").to_string()),
        Value::Timestamp(ts) => quote_literal(&ts.format("%Y-%m-%d %H:%M:%S%.f").to_string()),
        Value::TimestampTz(ts) => quote_literal(&ts.to_rfc3339()),
        Value::Array(_) | Value::Object(_) => {
            quote_literal(&serde_json::to_string(value).unwrap_or_default())
        }
    }
}

/// Read an integer column that the query is expected to produce.
pub(crate) fn int_field(row: &Row, column: &str) -> PgResult<i64> {
    match row.get(column) {
        Some(Value::Int(i)) => Ok(*i),
        Some(_) => Err(PgError::UnexpectedValue {
            column: column.to_string(),
            expected: "an integer",
        }),
        None => Err(PgError::MissingColumn(column.to_string())),
    }
}
