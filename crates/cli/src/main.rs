//! Cadence CLI: the main entry point.
//!
//! Commands:
//! - `init`      Write default config and seed the agent data directory
//! - `run`       Run the tick and heartbeat loops against a dry-run session
//! - `schedule`  Validate and evaluate a cron expression
//! - `heartbeat` List heartbeat jobs and which are due this minute

use std::path::PathBuf;

use clap::{Parser, Subcommand};

mod commands;
mod dry_run;

#[derive(Parser)]
#[command(
    name = "cadence",
    about = "Cadence — scheduling and context management for autonomous agents",
    version,
    author
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Write default configuration and seed the data directory
    Init,

    /// Run the agent loops with a dry-run session
    Run {
        /// Override the data directory
        #[arg(long)]
        data_dir: Option<PathBuf>,
    },

    /// Validate a cron expression and check it against a time
    Schedule {
        /// Five-field cron expression, e.g. "*/15 * * * *"
        expr: String,

        /// RFC 3339 timestamp to evaluate (defaults to now)
        #[arg(long)]
        at: Option<String>,
    },

    /// List jobs in a heartbeat file
    Heartbeat {
        /// Heartbeat file (defaults to the configured one)
        #[arg(short, long)]
        file: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Initialize tracing
    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter)),
        )
        .with_target(false)
        .init();

    match cli.command {
        Commands::Init => commands::init::run().await?,
        Commands::Run { data_dir } => commands::run::run(data_dir).await?,
        Commands::Schedule { expr, at } => commands::schedule::run(&expr, at.as_deref())?,
        Commands::Heartbeat { file } => commands::heartbeat::run(file).await?,
    }

    Ok(())
}
