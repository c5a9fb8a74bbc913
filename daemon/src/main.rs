//! extsupd: supervises external extension server processes.

mod commands;
mod options;

use anyhow::{Context, Result, anyhow};
use clap::Parser;
use extsup_engine::{JsonConfigStore, Supervisor};
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

use options::{Cli, Command};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(&cli.log_filter())?;

    info!(
        version = env!("CARGO_PKG_VERSION"),
        config_file = %cli.config_file.display(),
        "extsupd starting"
    );

    let store = Arc::new(JsonConfigStore::new(cli.config_file.clone()));
    let supervisor = Supervisor::new(store);

    match cli.command {
        Command::Run => commands::run(&supervisor).await,
        Command::List => commands::list(&supervisor).await,
        Command::Add(args) => commands::add(&supervisor, args).await,
        Command::Remove { id } => commands::remove(&supervisor, &id).await,
        Command::Check { id } => commands::check(&supervisor, &id).await,
    }
}

// Logs go to stderr; stdout is reserved for JSON output.
fn init_tracing(filter: &str) -> Result<()> {
    let filter =
        EnvFilter::try_new(filter).with_context(|| format!("invalid log filter '{filter}'"))?;
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|e| anyhow!(e))
}
