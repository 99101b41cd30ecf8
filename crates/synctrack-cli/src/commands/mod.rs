pub mod jobs;
pub mod progress;
pub mod state;

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context as _, Result};
use serde::Serialize;
use synctrack_engine::config::{self, StoreBackendKind};
use synctrack_engine::{JobHistory, StateTracker};
use synctrack_state::SqliteStore;

/// Engine services opened from a config file.
pub struct Context {
    pub history: JobHistory,
    pub tracker: StateTracker,
}

impl Context {
    /// Load `config_path` and open the store it names.
    pub fn open(config_path: &Path) -> Result<Self> {
        let config = config::load(config_path)
            .with_context(|| format!("Failed to load config: {}", config_path.display()))?;

        let store = match config.store.backend {
            StoreBackendKind::Sqlite => {
                // Presence of the path is checked by the validator.
                let path = config
                    .store
                    .path
                    .as_deref()
                    .context("store.path is required for the sqlite backend")?;
                let store = SqliteStore::open(path)
                    .with_context(|| format!("Failed to open store: {}", path.display()))?;
                tracing::debug!(path = %path.display(), "Opened sqlite store");
                Arc::new(store)
            }
        };

        let history = JobHistory::new(store.clone())
            .with_default_page_size(config.history.default_page_size);
        let tracker = StateTracker::new(store, history.clone());
        Ok(Self { history, tracker })
    }
}

/// Print `value` as pretty JSON on stdout.
pub fn print_json<T: Serialize>(value: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(value)?;
    println!("{json}");
    Ok(())
}
