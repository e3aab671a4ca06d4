mod args_parse;
mod backup;
mod list;
mod mongo_tools;
mod restore;
mod service_configuration;

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use pitr_chronology::{ChronologyManager, CloudStore};
use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::args_parse::{Cli, Commands};
use crate::mongo_tools::{MongoToolsDumpEngine, MongoToolsRestoreEngine};
use crate::service_configuration::{LoadConfiguration, ToolConfiguration};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging; RUST_LOG overrides the default level
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    // Load the optional YAML config, then overlay flags and environment
    let load_config = match &cli.global.config_file {
        Some(path) => LoadConfiguration::from_file(path)?,
        None => LoadConfiguration::default(),
    };
    let tool_config = load_config.resolve(&cli.global)?;
    let manager = build_manager(tool_config)?;

    match cli.command {
        Commands::Dump => backup::handle_dump(&manager).await?,
        Commands::OplogDump => backup::handle_oplog_dump(&manager).await?,
        Commands::Prune => backup::handle_prune(&manager).await?,
        Commands::PitrRestore(args) => restore::handle_pitr_restore(&manager, args).await?,
        Commands::Restore(args) => restore::handle_restore(&manager, args).await?,
        Commands::List(args) => list::handle_command(&manager, args).await?,
    }

    Ok(())
}

fn build_manager(config: ToolConfiguration) -> Result<ChronologyManager> {
    let provider = config.backend.provider();
    let store = CloudStore::new(config.backend).context("Failed to initialize object store")?;
    info!(
        provider,
        prefix = %config.chronology.prefix,
        database = ?config.chronology.database,
        keep_recent_n = config.chronology.keep_recent_n,
        "initialized backup chronology"
    );
    Ok(ChronologyManager::new(
        config.chronology,
        Arc::new(store),
        Arc::new(MongoToolsDumpEngine::new(config.mongo.clone())),
        Arc::new(MongoToolsRestoreEngine::new(config.mongo)),
    ))
}
