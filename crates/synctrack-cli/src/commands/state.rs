use std::path::Path;

use anyhow::{Context as _, Result};
use synctrack_types::job::ConnectionId;
use synctrack_types::state::ConnectionState;

use super::{print_json, Context};

/// Execute `state get`: print the connection's checkpoint.
pub fn get(ctx: &Context, connection: &str) -> Result<()> {
    let state = ctx.tracker.get_state(&ConnectionId::new(connection))?;
    print_json(&state)
}

/// Execute `state set`: replace the checkpoint from a JSON document.
///
/// Without `force` the write is refused while a sync is running.
pub fn set(ctx: &Context, connection: &str, file: &Path, force: bool) -> Result<()> {
    let new_state = read_state(file)?;
    let connection_id = ConnectionId::new(connection);

    let written = if force {
        ctx.tracker.create_or_update_state(&connection_id, new_state)?
    } else {
        ctx.tracker
            .create_or_update_state_safe(&connection_id, new_state)?
    };
    print_json(&written)
}

fn read_state(file: &Path) -> Result<ConnectionState> {
    let content = std::fs::read_to_string(file)
        .with_context(|| format!("Failed to read state file: {}", file.display()))?;
    serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse state file: {}", file.display()))
}
