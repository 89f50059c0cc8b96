//! Schema and type registry backed by the system catalogs.
//!
//! Both maps are loaded on first use and reloaded wholesale whenever a
//! lookup misses, so a relation created after startup is picked up by the
//! next miss instead of needing a restart.

mod schema;
pub mod types;

use std::collections::HashMap;

use pgdrift_core::{Row, Value};
use tracing::debug;

use crate::error::{PgError, PgResult};
use crate::executor::QueryExecutor;
use crate::replication::pgoutput::{ColumnInfo, ColumnValue, TupleData};

pub use schema::{Attributes, CatalogColumn, TypeNames};

/// A catalog table that can be cached as a map keyed by oid.
pub trait CatalogTable {
    type Entry: Clone;

    const NAME: &'static str;
    const QUERY: &'static str;

    fn load(rows: Vec<Row>) -> PgResult<HashMap<u32, Self::Entry>>;
}

/// Lazily loaded copy of one catalog table, rebuilt from scratch on a miss.
pub struct CatalogCache<T: CatalogTable> {
    entries: Option<HashMap<u32, T::Entry>>,
    loads: usize,
}

impl<T: CatalogTable> Default for CatalogCache<T> {
    fn default() -> Self {
        Self {
            entries: None,
            loads: 0,
        }
    }
}

impl<T: CatalogTable> CatalogCache<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up `oid`, reloading the whole table first if it is not cached.
    pub async fn get<E>(&mut self, executor: &E, oid: u32) -> PgResult<Option<&T::Entry>>
    where
        E: QueryExecutor + ?Sized,
    {
        let cached = self.entries.as_ref().is_some_and(|e| e.contains_key(&oid));
        if !cached {
            self.reload(executor).await?;
        }
        Ok(self.entries.as_ref().and_then(|e| e.get(&oid)))
    }

    pub async fn reload<E>(&mut self, executor: &E) -> PgResult<()>
    where
        E: QueryExecutor + ?Sized,
    {
        let rows = executor.execute(T::QUERY).await?;
        let entries = T::load(rows)?;
        self.loads += 1;
        debug!(table = T::NAME, entries = entries.len(), loads = self.loads, "Loaded catalog");
        self.entries = Some(entries);
        Ok(())
    }

    /// How many times the table has been loaded.
    pub fn loads(&self) -> usize {
        self.loads
    }
}

pub type SchemaRegistry = CatalogCache<Attributes>;
pub type TypeRegistry = CatalogCache<TypeNames>;

/// A replication tuple converted to typed values.
#[derive(Debug, Clone, PartialEq)]
pub struct ConvertedTuple {
    pub row: Row,
    /// Columns sent as unchanged TOAST values. They are absent from `row`.
    pub unchanged_columns: Vec<String>,
}

/// Column layouts and type converters for one database.
pub struct Catalog<E> {
    executor: E,
    schema: SchemaRegistry,
    types: TypeRegistry,
}

impl<E: QueryExecutor> Catalog<E> {
    pub fn new(executor: E) -> Self {
        Self {
            executor,
            schema: SchemaRegistry::new(),
            types: TypeRegistry::new(),
        }
    }

    /// Ordered (type id, name) columns of a relation.
    pub async fn columns_for(&mut self, relation_id: u32) -> PgResult<Vec<CatalogColumn>> {
        self.schema
            .get(&self.executor, relation_id)
            .await?
            .cloned()
            .ok_or(PgError::UnknownRelation(relation_id))
    }

    /// The name of a type, if `pg_type` has it.
    pub async fn type_name(&mut self, type_id: u32) -> PgResult<Option<String>> {
        Ok(self.types.get(&self.executor, type_id).await?.cloned())
    }

    /// Convert the text form of a value of type `type_id`.
    pub async fn convert(&mut self, type_id: u32, text: &str) -> PgResult<Value> {
        Ok(match self.type_name(type_id).await? {
            Some(name) => types::convert(&name, text),
            None => Value::String(text.to_string()),
        })
    }

    /// Convert a tuple whose layout came from a Relation message.
    pub async fn convert_tuple(
        &mut self,
        columns: &[ColumnInfo],
        tuple: &TupleData,
    ) -> PgResult<ConvertedTuple> {
        let layout: Vec<(&str, u32)> = columns
            .iter()
            .map(|c| (c.name.as_str(), c.type_oid))
            .collect();
        self.convert_with(&layout, tuple).await
    }

    /// Convert a tuple using the relation's columns from `pg_attribute`.
    pub async fn convert_row(
        &mut self,
        relation_id: u32,
        tuple: &TupleData,
    ) -> PgResult<ConvertedTuple> {
        let columns = self.columns_for(relation_id).await?;
        let layout: Vec<(&str, u32)> = columns
            .iter()
            .map(|c| (c.name.as_str(), c.type_id))
            .collect();
        self.convert_with(&layout, tuple).await
    }

    async fn convert_with(
        &mut self,
        layout: &[(&str, u32)],
        tuple: &TupleData,
    ) -> PgResult<ConvertedTuple> {
        if layout.len() != tuple.columns.len() {
            return Err(PgError::Replication(format!(
                "tuple has {} columns but the relation has {}",
                tuple.columns.len(),
                layout.len()
            )));
        }

        let mut row = Row::with_capacity(layout.len());
        let mut unchanged_columns = Vec::new();
        for (&(name, type_id), value) in layout.iter().zip(&tuple.columns) {
            let value = match value {
                ColumnValue::Null => Value::Null,
                ColumnValue::Unchanged => {
                    unchanged_columns.push(name.to_string());
                    continue;
                }
                ColumnValue::Text(text) => self.convert(type_id, text).await?,
                ColumnValue::Binary(bytes) => Value::String(format!("\\x{}", hex::encode(bytes))),
            };
            row.insert(name, value);
        }

        Ok(ConvertedTuple {
            row,
            unchanged_columns,
        })
    }
}
