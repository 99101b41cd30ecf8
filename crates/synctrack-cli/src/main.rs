mod commands;
mod logging;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use synctrack_types::job::JobId;

#[derive(Parser)]
#[command(
    name = "synctrack",
    version,
    about = "Job history, sync progress, and connection state"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Path to synctrack config YAML
    #[arg(long, default_value = "synctrack.yaml", global = true)]
    config: PathBuf,

    /// Log level (error, warn, info, debug, trace)
    #[arg(long, default_value = "info", global = true)]
    log_level: String,
}

#[derive(Subcommand)]
enum Commands {
    /// Inspect job history
    Jobs {
        #[command(subcommand)]
        command: JobsCommand,
    },
    /// Show live progress of a connection's running sync
    Progress {
        /// Connection id
        connection: String,
    },
    /// Read or write a connection's checkpoint
    State {
        #[command(subcommand)]
        command: StateCommand,
    },
}

#[derive(Subcommand)]
enum JobsCommand {
    /// List jobs, newest first unless --order-by is given
    List(commands::jobs::ListArgs),
    /// Show one job with its attempts and stats
    Show {
        job_id: JobId,
    },
    /// Show a connection's newest replication job that was not cancelled
    Last {
        /// Connection id
        connection: String,
        /// Newest sync or refresh job in any status instead
        #[arg(long)]
        sync_only: bool,
    },
}

#[derive(Subcommand)]
enum StateCommand {
    /// Print the current checkpoint
    Get {
        /// Connection id
        connection: String,
    },
    /// Replace the checkpoint from a JSON file
    Set {
        /// Connection id
        connection: String,
        /// Path to a connection state JSON document
        file: PathBuf,
        /// Write even if a sync is running
        #[arg(long)]
        force: bool,
    },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    logging::init(&cli.log_level);

    let ctx = commands::Context::open(&cli.config)?;
    match cli.command {
        Commands::Jobs { command } => match command {
            JobsCommand::List(args) => commands::jobs::list(&ctx, args),
            JobsCommand::Show { job_id } => commands::jobs::show(&ctx, job_id),
            JobsCommand::Last {
                connection,
                sync_only,
            } => commands::jobs::last(&ctx, &connection, sync_only),
        },
        Commands::Progress { connection } => commands::progress::execute(&ctx, &connection),
        Commands::State { command } => match command {
            StateCommand::Get { connection } => commands::state::get(&ctx, &connection),
            StateCommand::Set {
                connection,
                file,
                force,
            } => commands::state::set(&ctx, &connection, &file, force),
        },
    }
}
