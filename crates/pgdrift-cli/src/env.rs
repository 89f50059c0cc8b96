use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing::{debug, info};

/// The dotenv file for an environment: `.env`, or `.env.{name}`.
pub fn env_file_name(env: Option<&str>) -> String {
    match env {
        Some(name) => format!(".env.{}", name),
        None => ".env".to_string(),
    }
}

/// Find `file_name` in `start` or the closest ancestor that has one.
pub fn find_in_ancestors(start: &Path, file_name: &str) -> Option<PathBuf> {
    start
        .ancestors()
        .map(|dir| dir.join(file_name))
        .find(|path| path.exists())
}

/// Load the environment's dotenv file from the current directory or any parent.
///
/// A missing `.env` is fine since the config may not reference any variables,
/// but an explicitly requested `.env.{name}` must exist.
pub fn load_dotenv_from_ancestors(env: Option<&str>) -> Result<Option<PathBuf>> {
    let cwd = std::env::current_dir().context("Failed to get current directory")?;
    let file_name = env_file_name(env);

    let Some(env_path) = find_in_ancestors(&cwd, &file_name) else {
        if env.is_some() {
            anyhow::bail!(
                "No {} file found.\n\nSearched from {} to filesystem root.",
                file_name,
                cwd.display()
            );
        }
        debug!(cwd = %cwd.display(), "No .env file found");
        return Ok(None);
    };

    dotenvy::from_path(&env_path)
        .with_context(|| format!("Failed to load {}", env_path.display()))?;
    info!("Loaded {}", env_path.display());
    Ok(Some(env_path))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_env_file_name() {
        assert_eq!(env_file_name(None), ".env");
        assert_eq!(env_file_name(Some("prod")), ".env.prod");
    }

    #[test]
    fn test_find_prefers_closest_file() {
        let parent_dir = TempDir::new().unwrap();
        let child_dir = parent_dir.path().join("subdir");
        fs::create_dir(&child_dir).unwrap();

        fs::write(parent_dir.path().join(".env"), "A=parent").unwrap();
        assert_eq!(
            find_in_ancestors(&child_dir, ".env"),
            Some(parent_dir.path().join(".env"))
        );

        fs::write(child_dir.join(".env"), "A=child").unwrap();
        assert_eq!(
            find_in_ancestors(&child_dir, ".env"),
            Some(child_dir.join(".env"))
        );
        assert_eq!(find_in_ancestors(&child_dir, ".env.missing"), None);
    }

    #[test]
    #[serial]
    fn test_load_dotenv_from_parent_directory() {
        let parent_dir = TempDir::new().unwrap();
        let child_dir = parent_dir.path().join("subdir");
        fs::create_dir(&child_dir).unwrap();
        fs::write(parent_dir.path().join(".env"), "PGDRIFT_TEST_PARENT=world").unwrap();

        let original_dir = std::env::current_dir().unwrap();
        std::env::set_current_dir(&child_dir).unwrap();
        std::env::remove_var("PGDRIFT_TEST_PARENT");

        let loaded = load_dotenv_from_ancestors(None).unwrap();
        assert!(loaded.is_some());
        assert_eq!(std::env::var("PGDRIFT_TEST_PARENT").unwrap(), "world");

        std::env::set_current_dir(original_dir).unwrap();
        std::env::remove_var("PGDRIFT_TEST_PARENT");
    }

    #[test]
    #[serial]
    fn test_load_named_environment() {
        let temp_dir = TempDir::new().unwrap();
        fs::write(temp_dir.path().join(".env"), "PGDRIFT_TEST_NAMED=default").unwrap();
        fs::write(temp_dir.path().join(".env.staging"), "PGDRIFT_TEST_NAMED=staging").unwrap();

        let original_dir = std::env::current_dir().unwrap();
        std::env::set_current_dir(temp_dir.path()).unwrap();
        std::env::remove_var("PGDRIFT_TEST_NAMED");

        load_dotenv_from_ancestors(Some("staging")).unwrap();
        assert_eq!(std::env::var("PGDRIFT_TEST_NAMED").unwrap(), "staging");

        std::env::set_current_dir(original_dir).unwrap();
        std::env::remove_var("PGDRIFT_TEST_NAMED");
    }

    #[test]
    #[serial]
    fn test_missing_files() {
        let temp_dir = TempDir::new().unwrap();

        let original_dir = std::env::current_dir().unwrap();
        std::env::set_current_dir(temp_dir.path()).unwrap();

        let named = load_dotenv_from_ancestors(Some("nowhere-to-be-found"));
        let err_msg = named.unwrap_err().to_string();
        assert!(err_msg.contains("No .env.nowhere-to-be-found file found"));

        std::env::set_current_dir(original_dir).unwrap();
    }
}
