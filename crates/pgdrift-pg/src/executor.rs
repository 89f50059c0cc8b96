//! Running SQL with retries and lazily (re)opened connections.

use std::sync::Arc;

use async_trait::async_trait;
use pgdrift_core::Row;
use tokio::sync::Mutex;
use tokio_postgres::Client;
use tracing::debug;

use crate::connect::connect_postgres;
use crate::error::{PgError, PgResult};
use crate::retry::{retry, RetryPolicy};
use crate::rows::convert_rows;

/// Something that can run a query and hand back its rows in order.
#[async_trait]
pub trait QueryExecutor: Send + Sync {
    async fn execute(&self, query: &str) -> PgResult<Vec<Row>>;
}

#[async_trait]
impl<E: QueryExecutor + ?Sized> QueryExecutor for Arc<E> {
    async fn execute(&self, query: &str) -> PgResult<Vec<Row>> {
        (**self).execute(query).await
    }
}

/// A [`QueryExecutor`] over a single Postgres connection.
///
/// The connection is opened on first use and reopened after [`refresh`]
/// or after the server closes it. Calls are serialized on the connection.
/// Retryable failures are retried per the [`RetryPolicy`], refreshing the
/// connection before every retry.
///
/// [`refresh`]: PgExecutor::refresh
pub struct PgExecutor {
    connection_string: String,
    retry: RetryPolicy,
    client: Mutex<Option<Client>>,
}

impl PgExecutor {
    pub fn new(connection_string: impl Into<String>, retry: RetryPolicy) -> Self {
        Self {
            connection_string: connection_string.into(),
            retry,
            client: Mutex::new(None),
        }
    }

    /// Drop the current connection; the next call opens a new one.
    pub async fn refresh(&self) {
        if self.client.lock().await.take().is_some() {
            debug!("Discarded database connection");
        }
    }

    async fn execute_once(&self, query: &str) -> PgResult<Vec<Row>> {
        let mut guard = self.client.lock().await;
        if guard.as_ref().map_or(true, Client::is_closed) {
            debug!("Opening database connection");
            *guard = Some(connect_postgres(&self.connection_string).await?);
        }
        let client = guard
            .as_ref()
            .ok_or_else(|| PgError::Connection("no connection".into()))?;

        debug!(query, "Executing query");
        // Described for its column types; the rows themselves are read as text.
        let statement = client.prepare(query).await?;
        let messages = client.simple_query(query).await?;
        convert_rows(statement.columns(), &messages)
    }
}

#[async_trait]
impl QueryExecutor for PgExecutor {
    async fn execute(&self, query: &str) -> PgResult<Vec<Row>> {
        retry(
            &self.retry,
            move || self.execute_once(query),
            move || self.refresh(),
        )
        .await
    }
}
