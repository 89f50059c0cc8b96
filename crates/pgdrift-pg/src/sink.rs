//! Where polled rows go.

use async_trait::async_trait;
use pgdrift_core::PolledRow;
use tokio::sync::mpsc;

use crate::error::{PgError, PgResult};

/// Receives every row a [`Poller`](crate::Poller) produces, in order.
#[async_trait]
pub trait RowSink: Send {
    async fn emit(&mut self, row: PolledRow) -> PgResult<()>;
}

/// A bounded channel; a full channel holds the poller back.
#[async_trait]
impl RowSink for mpsc::Sender<PolledRow> {
    async fn emit(&mut self, row: PolledRow) -> PgResult<()> {
        self.send(row)
            .await
            .map_err(|_| PgError::Sink("receiver dropped".into()))
    }
}

#[async_trait]
impl RowSink for Vec<PolledRow> {
    async fn emit(&mut self, row: PolledRow) -> PgResult<()> {
        self.push(row);
        Ok(())
    }
}
