use std::error::Error as _;

use thiserror::Error;
use tokio_postgres::types::{WasNull, WrongType};

#[derive(Debug, Error)]
pub enum PgError {
    #[error("postgres error: {0}")]
    Postgres(String),

    #[error("connection failed: {0}")]
    Connection(String),

    #[error("malformed '{tag}' message: {reason}")]
    MalformedMessage { tag: String, reason: String },

    #[error("relation {0} not found in catalog")]
    UnknownRelation(u32),

    #[error("query result is missing column '{0}'")]
    MissingColumn(String),

    #[error("column '{column}' is not {expected}")]
    UnexpectedValue {
        column: String,
        expected: &'static str,
    },

    #[error("replication slot '{0}' does not exist")]
    SlotNotFound(String),

    #[error("failed to create replication slot: {0}")]
    SlotCreationFailed(String),

    #[error("replication error: {0}")]
    Replication(String),

    #[error("downstream sink rejected row: {0}")]
    Sink(String),

    #[error("could not convert result: {0}")]
    Conversion(String),

    #[error("invalid LSN format: {0}")]
    InvalidLsn(String),

    #[error(transparent)]
    Core(#[from] pgdrift_core::Error),
}

impl PgError {
    /// Whether the error came from the database or the connection to it.
    ///
    /// Only these are worth a retry on a fresh connection; everything else
    /// (decode failures, missing columns) would fail the same way again.
    pub fn is_retryable(&self) -> bool {
        matches!(self, PgError::Postgres(_) | PgError::Connection(_))
    }

    pub(crate) fn malformed(tag: u8, reason: impl Into<String>) -> Self {
        PgError::MalformedMessage {
            tag: (tag as char).escape_default().to_string(),
            reason: reason.into(),
        }
    }
}

impl From<tokio_postgres::Error> for PgError {
    fn from(e: tokio_postgres::Error) -> Self {
        // Extract database error details if available
        if let Some(db_err) = e.as_db_error() {
            let msg = format!(
                "{}: {} (code: {})",
                db_err.severity(),
                db_err.message(),
                db_err.code().code()
            );
            return PgError::Postgres(msg);
        }

        let source = e.source();
        if e.is_closed() || source.is_some_and(|s| s.is::<std::io::Error>()) {
            PgError::Connection(e.to_string())
        } else if source.is_some_and(|s| s.is::<WrongType>() || s.is::<WasNull>()) {
            // Raised client-side while reading a row; a new connection would not help.
            PgError::Conversion(e.to_string())
        } else {
            PgError::Postgres(e.to_string())
        }
    }
}

pub type PgResult<T> = Result<T, PgError>;
