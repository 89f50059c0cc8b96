use thiserror::Error;

/// Errors that can occur in pgdrift-core.
#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid table reference '{0}': expected 'schema.table' or 'table'")]
    InvalidTableRef(String),

    #[error("missing required column: {0}")]
    MissingColumn(String),

    #[error("serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
