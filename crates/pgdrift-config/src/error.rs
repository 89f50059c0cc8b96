use thiserror::Error;

/// Errors that can occur when parsing or validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to parse TOML: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("missing required field: {field}")]
    MissingField { field: String },

    #[error("invalid table '{value}': expected 'schema.table' or 'table'")]
    InvalidTable { value: String },

    #[error("table '{table}' is configured more than once")]
    DuplicateTable { table: String },

    #[error("limit for '{table}' must be positive")]
    InvalidLimit { table: String },

    #[error("polling interval for '{table}' is invalid: min {min}s, max {max}s")]
    InvalidInterval { table: String, min: u64, max: u64 },

    #[error("no tables configured")]
    NoTables,
}

pub type ConfigResult<T> = Result<T, ConfigError>;
