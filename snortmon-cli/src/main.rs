//! snortmon CLI -- operator commands for the Snort alert store
//!
//! Reads the same snortmon.toml as the daemon and works directly on the
//! configured storage backend.

mod cli;
mod commands;
mod error;
mod output;

use std::path::Path;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use snortmon_core::config::SnortmonConfig;
use snortmon_storage::{Stores, open_stores};

use crate::cli::{Cli, Commands};
use crate::error::CliError;
use crate::output::OutputWriter;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // Logs go to stderr so stdout stays clean for --output json
    let filter = cli.log_level.as_deref().unwrap_or("warn");
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_new(filter).unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(std::io::stderr)
        .compact()
        .init();

    let writer = OutputWriter::new(cli.output);

    if let Err(err) = run(cli, &writer).await {
        eprintln!("error: {err}");
        std::process::exit(err.exit_code());
    }
}

async fn run(cli: Cli, writer: &OutputWriter) -> Result<(), CliError> {
    match cli.command {
        Commands::Config(args) => commands::config::execute(args, &cli.config, writer).await,
        Commands::Ingest(args) => {
            let (config, stores) = load(&cli.config).await?;
            commands::ingest::execute(args, &config, stores, writer).await
        }
        Commands::Rules(args) => {
            let (config, stores) = load(&cli.config).await?;
            commands::rules::execute(args, &config, stores, writer).await
        }
        Commands::Events(args) => {
            let (_, stores) = load(&cli.config).await?;
            commands::events::execute(args, stores, writer).await
        }
    }
}

/// Load and validate the configuration, then open the configured stores.
async fn load(config_path: &Path) -> Result<(SnortmonConfig, Stores), CliError> {
    let config = SnortmonConfig::load(config_path).await?;
    let storage = config.storage.clone();
    tracing::debug!(backend = %storage.backend, path = %storage.database_path, "opening storage");
    let stores = tokio::task::spawn_blocking(move || open_stores(&storage))
        .await
        .map_err(|e| CliError::Command(format!("storage open task failed: {e}")))??;
    Ok((config, stores))
}
