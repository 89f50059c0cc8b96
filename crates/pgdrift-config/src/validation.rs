use std::collections::HashSet;

use crate::error::{ConfigError, ConfigResult};
use crate::pipeline::{PipelineConfig, StrategyConfig, TableConfig};

/// Validate a single table configuration.
pub fn validate_table(config: &TableConfig) -> ConfigResult<()> {
    config.table_ref()?;

    match &config.strategy {
        StrategyConfig::Xmin { pk, .. } if pk.trim().is_empty() => {
            return Err(ConfigError::MissingField {
                field: format!("tables.{}.pk", config.table),
            });
        }
        StrategyConfig::Increment { column, .. } if column.trim().is_empty() => {
            return Err(ConfigError::MissingField {
                field: format!("tables.{}.column", config.table),
            });
        }
        _ => {}
    }

    if config.limit == 0 {
        return Err(ConfigError::InvalidLimit {
            table: config.table.clone(),
        });
    }

    if config.max_interval_secs == 0 || config.min_interval_secs > config.max_interval_secs {
        return Err(ConfigError::InvalidInterval {
            table: config.table.clone(),
            min: config.min_interval_secs,
            max: config.max_interval_secs,
        });
    }

    Ok(())
}

/// Validate the whole pipeline: every table, and no table configured twice.
pub fn validate_pipeline(config: &PipelineConfig) -> ConfigResult<()> {
    if config.postgres.connection_string.trim().is_empty() {
        return Err(ConfigError::MissingField {
            field: "postgres.connection_string".into(),
        });
    }

    if config.tables.is_empty() {
        return Err(ConfigError::NoTables);
    }

    let mut seen = HashSet::new();
    for table in &config.tables {
        validate_table(table)?;
        let table_ref = table.table_ref()?;
        if !seen.insert(table_ref.to_string()) {
            return Err(ConfigError::DuplicateTable {
                table: table_ref.to_string(),
            });
        }
    }

    Ok(())
}
