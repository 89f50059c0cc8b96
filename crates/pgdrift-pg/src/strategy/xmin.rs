//! Extraction by transaction-visibility windows over the row `xmin`.
//!
//! Each pass reads the lower bound of the current snapshot. Every transaction
//! below it has finished, so rows whose `xmin` lies in `[start, end)` form a
//! closed set that can be paged through by primary key. Closing the window
//! moves `start` up to `end`.

use async_trait::async_trait;
use pgdrift_core::{quote_ident, Row, TableRef, Value};
use tracing::{debug, info};

use super::{Strategy, CAPTURED_AT_COLUMN, SNAPSHOT_COLUMN, XMIN_COLUMN};
use crate::error::{PgError, PgResult};
use crate::executor::QueryExecutor;
use crate::sql::{int_field, value_literal};

/// Transaction ids are 32 bits wide and wrap around at this value.
pub const XID_MODULUS: u64 = 1 << 32;

const SNAPSHOT_QUERY: &str =
    "SELECT txid_snapshot_xmin(txid_current_snapshot()) % 4294967296 AS snapshot";

#[derive(Debug, Clone, PartialEq)]
enum Phase {
    /// Between passes.
    Idle,
    /// Reading the rows of an open window.
    Paging {
        cursor: Option<Value>,
        fetched: u64,
        count: u64,
        wrapped: bool,
    },
    /// Reading every row visible below `target`.
    Backfilling { target: u64, cursor: Option<Value> },
    /// The last page has been handed out; the next call ends the pass.
    Drained,
}

pub struct XminWindow<E> {
    executor: E,
    table: TableRef,
    pk: String,
    limit: u32,
    window_start: u64,
    window_end: Option<u64>,
    phase: Phase,
}

impl<E: QueryExecutor> XminWindow<E> {
    pub fn new(executor: E, table: TableRef, pk: impl Into<String>, limit: u32) -> Self {
        Self {
            executor,
            table,
            pk: pk.into(),
            limit: limit.max(1),
            window_start: 0,
            window_end: None,
            phase: Phase::Idle,
        }
    }

    /// Start from this transaction id instead of 0.
    pub fn with_initial_xmin(mut self, xmin: u32) -> Self {
        self.window_start = xmin as u64;
        self
    }

    /// Lower bound of the next window.
    pub fn window_start(&self) -> u64 {
        self.window_start
    }

    /// Upper bound of the most recently opened window.
    pub fn window_end(&self) -> Option<u64> {
        self.window_end
    }

    async fn snapshot(&self) -> PgResult<u64> {
        let rows = self.executor.execute(SNAPSHOT_QUERY).await?;
        let row = rows
            .first()
            .ok_or_else(|| PgError::MissingColumn("snapshot".into()))?;
        u64::try_from(int_field(row, "snapshot")?).map_err(|_| PgError::UnexpectedValue {
            column: "snapshot".into(),
            expected: "a transaction id",
        })
    }

    fn window_filter(&self, end: u64) -> String {
        format!(
            "xmin::text::bigint >= {} AND xmin::text::bigint < {}",
            self.window_start, end
        )
    }

    fn count_query(&self, end: u64) -> String {
        format!(
            "SELECT count(*) AS count FROM {} WHERE {}",
            self.table.quoted(),
            self.window_filter(end)
        )
    }

    /// One page in primary key order, annotated with `xmin`, the window bound and read time.
    fn page_query(&self, filter: Option<String>, bound: u64, cursor: Option<&Value>) -> String {
        let pk = quote_ident(&self.pk);
        let mut conditions: Vec<String> = filter.into_iter().collect();
        if let Some(cursor) = cursor {
            conditions.push(format!("{} > {}", pk, value_literal(cursor)));
        }
        let where_clause = if conditions.is_empty() {
            String::new()
        } else {
            format!(" WHERE {}", conditions.join(" AND "))
        };

        format!(
            "SELECT *, xmin::text::bigint AS {}, {} AS {}, now() AS {} FROM {}{} ORDER BY {} LIMIT {}",
            XMIN_COLUMN,
            bound,
            SNAPSHOT_COLUMN,
            CAPTURED_AT_COLUMN,
            self.table.quoted(),
            where_clause,
            pk,
            self.limit
        )
    }

    fn last_key(&self, rows: &[Row]) -> PgResult<Option<Value>> {
        let Some(row) = rows.last() else {
            return Ok(None);
        };
        match row.require(&self.pk)? {
            // `pk > NULL` matches nothing, so the rest of the window would be skipped.
            Value::Null => Err(PgError::UnexpectedValue {
                column: self.pk.clone(),
                expected: "a non-null key",
            }),
            key => Ok(Some(key.clone())),
        }
    }

    /// Move past the current window.
    fn close_window(&mut self, wrapped: bool) {
        let end = self.window_end.unwrap_or(self.window_start);
        // Ids below the wrap point belong to the next epoch, which starts at 0.
        self.window_start = if wrapped { 0 } else { end };
        debug!(table = %self.table, window_start = self.window_start, "Closed xmin window");
    }

    /// Take a snapshot and open a window, or end the pass if there is nothing to read.
    async fn open_window(&mut self) -> PgResult<bool> {
        let snapshot = self.snapshot().await?;
        if snapshot == self.window_start {
            debug!(table = %self.table, snapshot, "No transactions since last window");
            return Ok(false);
        }

        let wrapped = snapshot < self.window_start;
        let end = if wrapped { XID_MODULUS } else { snapshot };
        if wrapped {
            info!(
                table = %self.table,
                window_start = self.window_start,
                snapshot,
                "Transaction ids wrapped around"
            );
        }
        self.window_end = Some(end);

        let rows = self.executor.execute(&self.count_query(end)).await?;
        let count = match rows.first() {
            Some(row) => int_field(row, "count")?.max(0) as u64,
            None => 0,
        };
        debug!(
            table = %self.table,
            window_start = self.window_start,
            window_end = end,
            count,
            "Opened xmin window"
        );

        if count == 0 {
            // Nothing to read, so the start only moves if it has to leave the old epoch.
            if wrapped {
                self.close_window(true);
            }
            return Ok(false);
        }

        self.phase = Phase::Paging {
            cursor: None,
            fetched: 0,
            count,
            wrapped,
        };
        Ok(true)
    }
}

#[async_trait]
impl<E: QueryExecutor> Strategy for XminWindow<E> {
    fn table(&self) -> &TableRef {
        &self.table
    }

    async fn next_batch(&mut self) -> PgResult<Option<Vec<Row>>> {
        if matches!(self.phase, Phase::Drained) {
            self.phase = Phase::Idle;
            return Ok(None);
        }
        if !matches!(self.phase, Phase::Paging { .. }) && !self.open_window().await? {
            return Ok(None);
        }

        let Phase::Paging {
            cursor,
            fetched,
            count,
            wrapped,
        } = self.phase.clone()
        else {
            return Ok(None);
        };

        let end = self.window_end.unwrap_or(XID_MODULUS);
        let query = self.page_query(Some(self.window_filter(end)), end, cursor.as_ref());
        let rows = self.executor.execute(&query).await?;

        let fetched = fetched + rows.len() as u64;
        let exhausted = rows.len() < self.limit as usize || fetched >= count;
        if exhausted {
            self.close_window(wrapped);
            self.phase = if rows.is_empty() {
                Phase::Idle
            } else {
                Phase::Drained
            };
        } else {
            self.phase = Phase::Paging {
                cursor: self.last_key(&rows)?,
                fetched,
                count,
                wrapped,
            };
        }

        if rows.is_empty() {
            return Ok(None);
        }
        Ok(Some(rows))
    }

    /// Page through every row by primary key, keeping those written below the
    /// snapshot taken at the start. Incremental passes then resume from that snapshot.
    async fn backfill_batch(&mut self) -> PgResult<Option<Vec<Row>>> {
        let (target, cursor) = match &self.phase {
            Phase::Backfilling { target, cursor } => (*target, cursor.clone()),
            Phase::Drained => {
                self.phase = Phase::Idle;
                return Ok(None);
            }
            _ => {
                let target = self.snapshot().await?;
                info!(table = %self.table, snapshot = target, "Starting backfill");
                (target, None)
            }
        };

        let query = self.page_query(None, target, cursor.as_ref());
        let rows = self.executor.execute(&query).await?;
        let page_len = rows.len();
        let next_cursor = self.last_key(&rows)?;

        let mut visible = Vec::with_capacity(page_len);
        for row in rows {
            if (int_field(&row, XMIN_COLUMN)? as u64) < target {
                visible.push(row);
            }
        }

        if page_len < self.limit as usize {
            self.window_start = target;
            self.window_end = Some(target);
            info!(table = %self.table, window_start = target, "Backfill complete");
            self.phase = if page_len == 0 {
                Phase::Idle
            } else {
                Phase::Drained
            };
            if page_len == 0 {
                return Ok(None);
            }
        } else {
            self.phase = Phase::Backfilling {
                target,
                cursor: next_cursor,
            };
        }

        Ok(Some(visible))
    }
}
