//! Extraction by a strictly increasing column.
//!
//! Only rows whose ordering column is above the watermark are read, so
//! updates to rows already seen are never picked up again.

use async_trait::async_trait;
use pgdrift_core::{quote_ident, Row, TableRef, Value};
use tracing::debug;

use super::{Strategy, CAPTURED_AT_COLUMN, XMIN_COLUMN};
use crate::error::{PgError, PgResult};
use crate::executor::QueryExecutor;
use crate::sql::value_literal;

pub struct Increment<E> {
    executor: E,
    table: TableRef,
    column: String,
    limit: u32,
    watermark: Option<Value>,
    /// The last page was short; the next call ends the pass.
    drained: bool,
}

impl<E: QueryExecutor> Increment<E> {
    pub fn new(executor: E, table: TableRef, column: impl Into<String>, limit: u32) -> Self {
        Self {
            executor,
            table,
            column: column.into(),
            limit: limit.max(1),
            watermark: None,
            drained: false,
        }
    }

    /// Only read rows whose column is above `value`.
    pub fn with_watermark(mut self, value: Value) -> Self {
        self.watermark = Some(value);
        self
    }

    /// The largest column value seen so far.
    pub fn watermark(&self) -> Option<&Value> {
        self.watermark.as_ref()
    }

    fn query(&self) -> String {
        let column = quote_ident(&self.column);
        let where_clause = match &self.watermark {
            Some(value) => format!(" WHERE {} > {}", column, value_literal(value)),
            None => String::new(),
        };

        format!(
            "SELECT *, xmin::text::bigint AS {}, now() AS {} FROM {}{} ORDER BY {} LIMIT {}",
            XMIN_COLUMN,
            CAPTURED_AT_COLUMN,
            self.table.quoted(),
            where_clause,
            column,
            self.limit
        )
    }
}

#[async_trait]
impl<E: QueryExecutor> Strategy for Increment<E> {
    fn table(&self) -> &TableRef {
        &self.table
    }

    async fn next_batch(&mut self) -> PgResult<Option<Vec<Row>>> {
        if self.drained {
            self.drained = false;
            return Ok(None);
        }

        let rows = self.executor.execute(&self.query()).await?;
        let Some(last) = rows.last() else {
            return Ok(None);
        };

        // Rows come back in ascending order, so the last one holds the maximum.
        // NULLs sort last and can never be compared past.
        let watermark = last.require(&self.column)?;
        if watermark.is_null() {
            return Err(PgError::UnexpectedValue {
                column: self.column.clone(),
                expected: "a non-null ordering value",
            });
        }
        self.watermark = Some(watermark.clone());
        self.drained = rows.len() < self.limit as usize;
        debug!(
            table = %self.table,
            rows = rows.len(),
            watermark = ?self.watermark,
            "Advanced watermark"
        );

        Ok(Some(rows))
    }
}
