use std::time::Duration;

use serde::Deserialize;

use crate::error::{ConfigError, ConfigResult};

/// Pipeline configuration as parsed from pgdrift.toml.
#[derive(Debug, Deserialize)]
pub struct PipelineConfig {
    pub postgres: PostgresConfig,
    /// Retry policy for database calls.
    #[serde(default)]
    pub retry: RetryConfig,
    /// Tables to extract from.
    #[serde(default)]
    pub tables: Vec<TableConfig>,
}

impl PipelineConfig {
    /// Parse a pipeline config from a TOML string.
    pub fn parse(toml_str: &str) -> ConfigResult<Self> {
        let config: PipelineConfig = toml::from_str(toml_str)?;
        Ok(config)
    }

    /// Find a table by its configured name.
    pub fn table(&self, name: &str) -> Option<&TableConfig> {
        self.tables.iter().find(|t| t.table == name)
    }
}

#[derive(Debug, Deserialize)]
pub struct PostgresConfig {
    /// May contain ${VAR} references, resolved by the caller.
    pub connection_string: String,
}

/// Retry policy for database calls.
#[derive(Debug, Clone, Deserialize)]
pub struct RetryConfig {
    /// Retries after the first failed attempt.
    #[serde(default)]
    pub count: u32,
    /// Fixed delay between attempts, in milliseconds.
    #[serde(default = "default_retry_delay_ms")]
    pub delay_ms: u64,
}

impl RetryConfig {
    pub fn delay(&self) -> Duration {
        Duration::from_millis(self.delay_ms)
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            count: 0,
            delay_ms: default_retry_delay_ms(),
        }
    }
}

fn default_retry_delay_ms() -> u64 {
    10_000
}

/// Extraction settings for one table.
#[derive(Debug, Deserialize)]
pub struct TableConfig {
    /// "schema.table" or "table".
    pub table: String,
    /// Which strategy to use and its settings.
    #[serde(flatten)]
    pub strategy: StrategyConfig,
    /// Page size for every query.
    #[serde(default = "default_limit")]
    pub limit: u32,
    /// Shortest delay between polls, in seconds.
    #[serde(default = "default_min_interval")]
    pub min_interval_secs: u64,
    /// Longest delay between polls, in seconds.
    #[serde(default = "default_max_interval")]
    pub max_interval_secs: u64,
}

impl TableConfig {
    pub fn table_ref(&self) -> ConfigResult<pgdrift_core::TableRef> {
        pgdrift_core::TableRef::parse(&self.table).map_err(|_| ConfigError::InvalidTable {
            value: self.table.clone(),
        })
    }

    pub fn min_interval(&self) -> Duration {
        Duration::from_secs(self.min_interval_secs)
    }

    pub fn max_interval(&self) -> Duration {
        Duration::from_secs(self.max_interval_secs)
    }
}

fn default_limit() -> u32 {
    1000
}

fn default_min_interval() -> u64 {
    60
}

fn default_max_interval() -> u64 {
    60
}

fn default_key_column() -> String {
    "id".to_string()
}

/// Strategy selection, tagged by the `strategy` key.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "strategy", rename_all = "lowercase")]
pub enum StrategyConfig {
    /// Transaction-visibility windows over the row xmin.
    Xmin {
        /// Primary key column used for ordering and paging.
        #[serde(default = "default_key_column")]
        pk: String,
        /// Transaction-id floor of the first window.
        #[serde(default)]
        initial_xmin: u32,
        /// Run a one-shot backfill before incremental polling.
        #[serde(default)]
        backfill: bool,
    },
    /// Strictly increasing column watermark.
    Increment {
        /// Ordering column.
        #[serde(default = "default_key_column")]
        column: String,
        /// Starting watermark, as a SQL literal (e.g. "0" or "2024-01-01").
        #[serde(default)]
        initial_value: Option<String>,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    const EXAMPLE: &str = r#"
        [postgres]
        connection_string = "${DATABASE_URL}"

        [retry]
        count = 3
        delay_ms = 250

        [[tables]]
        table = "public.orders"
        strategy = "xmin"
        pk = "order_id"
        limit = 500
        backfill = true
        min_interval_secs = 5
        max_interval_secs = 30

        [[tables]]
        table = "events"
        strategy = "increment"
        initial_value = "100"
    "#;

    #[test]
    fn test_parse_example() {
        let config = PipelineConfig::parse(EXAMPLE).unwrap();
        assert_eq!(config.postgres.connection_string, "${DATABASE_URL}");
        assert_eq!(config.retry.count, 3);
        assert_eq!(config.retry.delay(), Duration::from_millis(250));
        assert_eq!(config.tables.len(), 2);

        let orders = config.table("public.orders").unwrap();
        assert_eq!(orders.limit, 500);
        assert_eq!(orders.min_interval(), Duration::from_secs(5));
        assert_eq!(
            orders.strategy,
            StrategyConfig::Xmin {
                pk: "order_id".into(),
                initial_xmin: 0,
                backfill: true,
            }
        );

        let events = config.table("events").unwrap();
        assert_eq!(events.limit, 1000);
        assert_eq!(events.table_ref().unwrap().schema, "public");
        assert_eq!(
            events.strategy,
            StrategyConfig::Increment {
                column: "id".into(),
                initial_value: Some("100".into()),
            }
        );
    }

    #[test]
    fn test_retry_defaults() {
        let config = PipelineConfig::parse(
            r#"
            [postgres]
            connection_string = "host=localhost"
            "#,
        )
        .unwrap();
        assert_eq!(config.retry.count, 0);
        assert_eq!(config.retry.delay_ms, 10_000);
        assert!(config.tables.is_empty());
    }

    #[test]
    fn test_unknown_strategy_rejected() {
        let result = PipelineConfig::parse(
            r#"
            [postgres]
            connection_string = "host=localhost"

            [[tables]]
            table = "t"
            strategy = "cdc"
            "#,
        );
        assert!(matches!(result, Err(ConfigError::ParseError(_))));
    }
}
