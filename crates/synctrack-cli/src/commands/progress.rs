use anyhow::Result;
use synctrack_types::job::ConnectionId;

use super::{print_json, Context};

/// Execute `progress`: print the live view of a connection's running sync.
pub fn execute(ctx: &Context, connection: &str) -> Result<()> {
    let connection_id = ConnectionId::new(connection);
    let progress = ctx.history.get_connection_sync_progress(&connection_id)?;
    if progress.is_idle() {
        tracing::info!(connection_id = connection, "No sync running");
    }
    print_json(&progress)
}
