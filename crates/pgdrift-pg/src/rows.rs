//! Turning query results into ordered [`Row`]s.
//!
//! Results are read in Postgres' text form and typed with the same
//! converters the replication stream uses. Column types come from the
//! prepared statement; a type without a converter keeps its text, so no
//! non-NULL value is ever read back as NULL.

use pgdrift_core::{Row, Value};
use tokio_postgres::types::Type;
use tokio_postgres::{Column, SimpleQueryMessage, SimpleQueryRow};

use crate::catalog::types;
use crate::error::{PgError, PgResult};

/// The rows of a simple-query response, typed by the statement's `columns`.
pub fn convert_rows(columns: &[Column], messages: &[SimpleQueryMessage]) -> PgResult<Vec<Row>> {
    messages
        .iter()
        .filter_map(|msg| match msg {
            SimpleQueryMessage::Row(row) => Some(convert_row(columns, row)),
            _ => None,
        })
        .collect()
}

/// Convert one text-format row, keeping the column order of the query.
pub fn convert_row(columns: &[Column], row: &SimpleQueryRow) -> PgResult<Row> {
    if columns.len() != row.len() {
        return Err(PgError::Conversion(format!(
            "row has {} columns but the statement describes {}",
            row.len(),
            columns.len()
        )));
    }

    let mut fields = Vec::with_capacity(columns.len());
    for (index, column) in columns.iter().enumerate() {
        fields.push((column.name(), column.type_(), row.try_get(index)?));
    }
    Ok(typed_row(fields))
}

fn typed_row<'a>(fields: impl IntoIterator<Item = (&'a str, &'a Type, Option<&'a str>)>) -> Row {
    fields
        .into_iter()
        .map(|(name, ty, text)| {
            let value = match text {
                Some(text) => types::convert(ty.name(), text),
                None => Value::Null,
            };
            (name.to_string(), value)
        })
        .collect()
}
