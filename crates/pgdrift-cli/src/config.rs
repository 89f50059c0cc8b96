use std::fs;
use std::path::Path;

use anyhow::{Context, Result};

use pgdrift_config::{validate_pipeline, PipelineConfig, TableConfig};

/// Resolve environment variables in a string.
/// Supports ${VAR_NAME} syntax; unset variables resolve to an empty string.
pub fn resolve_env(s: &str) -> String {
    let mut result = s.to_string();

    while let Some(start) = result.find("${") {
        if let Some(end) = result[start..].find('}') {
            let var_name = &result[start + 2..start + end];
            let value = std::env::var(var_name).unwrap_or_default();
            result = format!("{}{}{}", &result[..start], value, &result[start + end + 1..]);
        } else {
            break;
        }
    }

    result
}

/// Read, resolve and validate a pipeline config file.
pub fn load_config(path: &Path) -> Result<PipelineConfig> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let mut config = PipelineConfig::parse(&content)
        .with_context(|| format!("Failed to parse {}", path.display()))?;
    config.postgres.connection_string = resolve_env(&config.postgres.connection_string);

    validate_pipeline(&config).with_context(|| format!("Invalid config: {}", path.display()))?;
    Ok(config)
}

/// The configured tables named in `filter`, or all of them when it is empty.
pub fn select_tables<'a>(config: &'a PipelineConfig, filter: &[String]) -> Result<Vec<&'a TableConfig>> {
    if filter.is_empty() {
        return Ok(config.tables.iter().collect());
    }

    filter
        .iter()
        .map(|name| {
            config
                .table(name)
                .with_context(|| format!("Table '{}' is not configured", name))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use tempfile::TempDir;

    const CONFIG: &str = r#"
        [postgres]
        connection_string = "postgres://${PGDRIFT_TEST_USER}@localhost/app"

        [[tables]]
        table = "orders"
        strategy = "xmin"

        [[tables]]
        table = "audit.events"
        strategy = "increment"
        column = "event_id"
    "#;

    #[test]
    #[serial]
    fn test_resolve_env() {
        std::env::set_var("PGDRIFT_TEST_VAR", "hello");

        assert_eq!(resolve_env("${PGDRIFT_TEST_VAR}"), "hello");
        assert_eq!(
            resolve_env("prefix_${PGDRIFT_TEST_VAR}_suffix"),
            "prefix_hello_suffix"
        );
        assert_eq!(resolve_env("no_vars"), "no_vars");
        assert_eq!(resolve_env("${PGDRIFT_TEST_UNSET_VAR}x"), "x");
        assert_eq!(resolve_env("dangling ${"), "dangling ${");

        std::env::remove_var("PGDRIFT_TEST_VAR");
    }

    #[test]
    #[serial]
    fn test_load_config_resolves_connection_string() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("pgdrift.toml");
        fs::write(&path, CONFIG).unwrap();
        std::env::set_var("PGDRIFT_TEST_USER", "etl");

        let config = load_config(&path).unwrap();
        assert_eq!(config.postgres.connection_string, "postgres://etl@localhost/app");
        assert_eq!(config.tables.len(), 2);

        std::env::remove_var("PGDRIFT_TEST_USER");
    }

    #[test]
    fn test_load_config_rejects_invalid() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("pgdrift.toml");
        fs::write(
            &path,
            r#"
            [postgres]
            connection_string = "host=localhost"
            "#,
        )
        .unwrap();

        let err = load_config(&path).unwrap_err();
        assert!(err.to_string().contains("Invalid config"));

        let missing = load_config(&dir.path().join("absent.toml")).unwrap_err();
        assert!(missing.to_string().contains("Failed to read config file"));
    }

    #[test]
    fn test_select_tables() {
        let config = PipelineConfig::parse(CONFIG).unwrap();

        assert_eq!(select_tables(&config, &[]).unwrap().len(), 2);

        let picked = select_tables(&config, &["audit.events".to_string()]).unwrap();
        assert_eq!(picked.len(), 1);
        assert_eq!(picked[0].table, "audit.events");

        assert!(select_tables(&config, &["missing".to_string()]).is_err());
    }
}
