mod error;
mod pipeline;
mod validation;

pub use error::{ConfigError, ConfigResult};
pub use pipeline::{PipelineConfig, PostgresConfig, RetryConfig, StrategyConfig, TableConfig};
pub use validation::{validate_pipeline, validate_table};
