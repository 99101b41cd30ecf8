//! Semantic validation for parsed configuration values.

use anyhow::{bail, Result};

use crate::config::types::{StoreBackendKind, SynctrackConfig};

/// Validate a parsed configuration.
///
/// # Errors
///
/// Returns an error listing all validation failures found in the config.
pub fn validate_config(config: &SynctrackConfig) -> Result<()> {
    let mut errors = Vec::new();

    match config.store.backend {
        StoreBackendKind::Sqlite => match &config.store.path {
            None => errors.push("store.path is required for the sqlite backend".to_string()),
            Some(path) if path.as_os_str().is_empty() => {
                errors.push("store.path must not be empty".to_string());
            }
            Some(_) => {}
        },
    }

    if config.history.default_page_size == 0 {
        errors.push("history.default_page_size must be at least 1".to_string());
    }

    if errors.is_empty() {
        Ok(())
    } else {
        bail!("Config validation failed:\n  - {}", errors.join("\n  - "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::types::{HistoryConfig, StoreConfig};
    use std::path::PathBuf;

    fn valid() -> SynctrackConfig {
        SynctrackConfig {
            store: StoreConfig {
                backend: StoreBackendKind::Sqlite,
                path: Some(PathBuf::from("./synctrack.db")),
            },
            history: HistoryConfig::default(),
        }
    }

    #[test]
    fn test_valid_config_passes() {
        assert!(validate_config(&valid()).is_ok());
    }

    #[test]
    fn test_sqlite_requires_path() {
        let mut config = valid();
        config.store.path = None;
        let err = validate_config(&config).unwrap_err().to_string();
        assert!(err.contains("store.path is required"));
    }

    #[test]
    fn test_empty_path_rejected() {
        let mut config = valid();
        config.store.path = Some(PathBuf::new());
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_all_errors_reported() {
        let mut config = valid();
        config.store.path = None;
        config.history.default_page_size = 0;
        let err = validate_config(&config).unwrap_err().to_string();
        assert!(err.contains("store.path"));
        assert!(err.contains("default_page_size"));
    }
}
