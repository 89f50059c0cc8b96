//! Catalog tables we cache: column layouts and type names.

use std::collections::HashMap;

use pgdrift_core::{Row, Value};

use super::CatalogTable;
use crate::error::{PgError, PgResult};
use crate::sql::int_field;

/// One user column of a relation, in attribute order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogColumn {
    pub type_id: u32,
    pub name: String,
}

/// `pg_attribute`: relation id to its live columns.
pub struct Attributes;

impl CatalogTable for Attributes {
    type Entry = Vec<CatalogColumn>;

    const NAME: &'static str = "pg_attribute";
    const QUERY: &'static str = "SELECT attrelid::int8 AS attrelid, atttypid::int8 AS atttypid, \
         attname::text AS attname FROM pg_attribute \
         WHERE attnum > 0 AND NOT attisdropped ORDER BY attrelid, attnum";

    fn load(rows: Vec<Row>) -> PgResult<HashMap<u32, Self::Entry>> {
        let mut relations: HashMap<u32, Vec<CatalogColumn>> = HashMap::new();
        for row in &rows {
            relations
                .entry(oid_field(row, "attrelid")?)
                .or_default()
                .push(CatalogColumn {
                    type_id: oid_field(row, "atttypid")?,
                    name: text_field(row, "attname")?,
                });
        }
        Ok(relations)
    }
}

/// `pg_type`: type id to type name.
pub struct TypeNames;

impl CatalogTable for TypeNames {
    type Entry = String;

    const NAME: &'static str = "pg_type";
    const QUERY: &'static str = "SELECT oid::int8 AS oid, typname::text AS typname FROM pg_type";

    fn load(rows: Vec<Row>) -> PgResult<HashMap<u32, Self::Entry>> {
        rows.iter()
            .map(|row| -> PgResult<(u32, String)> {
                Ok((oid_field(row, "oid")?, text_field(row, "typname")?))
            })
            .collect()
    }
}

fn oid_field(row: &Row, column: &str) -> PgResult<u32> {
    u32::try_from(int_field(row, column)?).map_err(|_| PgError::UnexpectedValue {
        column: column.to_string(),
        expected: "an oid",
    })
}

fn text_field(row: &Row, column: &str) -> PgResult<String> {
    match row.get(column) {
        Some(Value::String(s)) => Ok(s.clone()),
        Some(_) => Err(PgError::UnexpectedValue {
            column: column.to_string(),
            expected: "text",
        }),
        None => Err(PgError::MissingColumn(column.to_string())),
    }
}
