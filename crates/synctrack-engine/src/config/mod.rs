//! Configuration file loading.

pub mod parser;
pub mod types;
pub mod validator;

use std::path::Path;

use anyhow::Result;

pub use types::{HistoryConfig, StoreBackendKind, StoreConfig, SynctrackConfig};

/// Parse and validate the configuration file at `path`.
///
/// # Errors
///
/// Returns an error if the file cannot be read, fails to parse, or fails
/// validation.
pub fn load(path: &Path) -> Result<SynctrackConfig> {
    let config = parser::parse_config(path)?;
    validator::validate_config(&config)?;
    Ok(config)
}
