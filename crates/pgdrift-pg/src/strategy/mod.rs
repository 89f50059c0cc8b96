//! Polling-based change extraction.
//!
//! A [`Strategy`] yields one pass of changed rows at a time, a page per call
//! to [`Strategy::next_batch`]. `Ok(None)` ends the pass; the following call
//! starts a new one from wherever the previous pass left its state.

mod increment;
mod xmin;

use async_trait::async_trait;
use pgdrift_core::{Row, TableRef};

use crate::error::PgResult;

pub use increment::Increment;
pub use xmin::{XminWindow, XID_MODULUS};

/// Column holding the transaction id that last wrote the row.
pub const XMIN_COLUMN: &str = "xmin";
/// Column holding the upper bound of the window a row was read in.
pub const SNAPSHOT_COLUMN: &str = "snapshot_xmin";
/// Column holding the time the row was read.
pub const CAPTURED_AT_COLUMN: &str = "etl_ts";

#[async_trait]
pub trait Strategy: Send {
    fn table(&self) -> &TableRef;

    /// The next page of the current pass, or `None` once the pass is over.
    async fn next_batch(&mut self) -> PgResult<Option<Vec<Row>>>;

    /// The next page of a one-shot backfill, or `None` once it is complete.
    ///
    /// Strategies without a backfill mode have nothing to do here.
    async fn backfill_batch(&mut self) -> PgResult<Option<Vec<Row>>> {
        Ok(None)
    }

    /// Run one full pass and collect its rows.
    async fn execute(&mut self) -> PgResult<Vec<Row>> {
        let mut rows = Vec::new();
        while let Some(batch) = self.next_batch().await? {
            rows.extend(batch);
        }
        Ok(rows)
    }

    /// Run the whole backfill and collect its rows.
    async fn backfill(&mut self) -> PgResult<Vec<Row>> {
        let mut rows = Vec::new();
        while let Some(batch) = self.backfill_batch().await? {
            rows.extend(batch);
        }
        Ok(rows)
    }
}

#[async_trait]
impl<S: Strategy + ?Sized> Strategy for Box<S> {
    fn table(&self) -> &TableRef {
        (**self).table()
    }

    async fn next_batch(&mut self) -> PgResult<Option<Vec<Row>>> {
        (**self).next_batch().await
    }

    async fn backfill_batch(&mut self) -> PgResult<Option<Vec<Row>>> {
        (**self).backfill_batch().await
    }
}
