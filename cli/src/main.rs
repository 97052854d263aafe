//! minterindex CLI: ingest a Minter node into a relational store.
//!
//! # Commands
//! ```text
//! minterindex run    [--config <path>]
//! minterindex status [--config <path>]
//! minterindex info
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::info;

use minterindex_core::{ChainStore, IndexerConfig};
use minterindex_node::{HttpNodeClient, NodeApi, NodeConfig};
use minterindex_sync::IndexerBuilder;

mod config;
mod logging;

use config::AppConfig;
use logging::init_tracing;

const DEFAULT_CONFIG: &str = "minterindex.yaml";

#[derive(Parser)]
#[command(
    name = "minterindex",
    about = "Minter blockchain indexer",
    long_about = "
Polls a Minter node and writes blocks, transactions, tags, rewards, slashes,
validators and coins to SQLite or PostgreSQL.

ENVIRONMENT VARIABLES:
  MINTERINDEX_CONFIG   Path to the YAML config (default: minterindex.yaml)
",
    version
)]
struct Cli {
    /// Raise the log level to debug
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Path to the YAML config file
    #[arg(short, long, global = true, env = "MINTERINDEX_CONFIG", default_value = DEFAULT_CONFIG)]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Connect to the store and node and run the ingestion loop
    Run,

    /// Print the last stored height and the node head
    Status,

    /// Print built-in defaults
    Info,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    if let Commands::Info = cli.command {
        return cmd_info();
    }

    // The default path may be absent; an explicit one may not.
    let optional = cli.config.as_os_str() == DEFAULT_CONFIG;
    let mut app = AppConfig::load(&cli.config, optional)?;
    if cli.verbose {
        app.log.level = "debug".into();
    }
    init_tracing(&app.log);

    match cli.command {
        Commands::Run => cmd_run(app).await,
        Commands::Status => cmd_status(app).await,
        Commands::Info => cmd_info(),
    }
}

async fn cmd_run(app: AppConfig) -> Result<()> {
    let store = open_store(&app).await?;
    let node = HttpNodeClient::new(app.node.clone()).context("building node client")?;

    info!(
        node = %app.node.url,
        backend = %app.storage.backend,
        from_height = app.indexer.from_height,
        "starting indexer"
    );

    let mut ingestion = IndexerBuilder::with_config(app.indexer)
        .node(Arc::new(node))
        .store(store)
        .build()
        .context("building ingestion loop")?;

    ingestion.run().await.context("ingestion loop failed")?;
    info!(state = %ingestion.state(), "indexer stopped");
    Ok(())
}

async fn cmd_status(app: AppConfig) -> Result<()> {
    let store = open_store(&app).await?;
    let node = HttpNodeClient::new(app.node.clone()).context("building node client")?;

    let stored = store.last_height().await.context("reading last stored height")?;
    println!("store ({}): last height {stored}", app.storage.backend);

    match node.status().await {
        Ok(head) => {
            println!("node ({}): head {head}", app.node.url);
            println!("lag: {} blocks", head.saturating_sub(stored));
        }
        Err(e) => println!("node ({}): unreachable: {e}", app.node.url),
    }
    Ok(())
}

fn cmd_info() -> Result<()> {
    let indexer = IndexerConfig::default();
    let node = NodeConfig::default();

    println!("minterindex v{}", env!("CARGO_PKG_VERSION"));
    println!("  Node URL:                 {}", node.url);
    println!("  Node request timeout:     {} ms", node.timeout_ms);
    println!("  Start height:             {}", indexer.from_height);
    println!("  Poll interval:            {} ms", indexer.poll_interval_ms);
    println!("  Validator queue:          {} jobs", indexer.validator_queue_capacity);
    println!("  Coin queue:               {} jobs", indexer.coin_queue_capacity);
    println!("  Validator retries:        {}", indexer.validator_max_retries);
    println!(
        "  Height backoff:           {}..{} ms (x{})",
        indexer.retry.initial_backoff_ms, indexer.retry.max_backoff_ms, indexer.retry.multiplier
    );
    println!("  Storage backends:         memory, sqlite, postgres");
    println!("  Config file:              {DEFAULT_CONFIG} (or $MINTERINDEX_CONFIG)");
    Ok(())
}

async fn open_store(app: &AppConfig) -> Result<Arc<dyn ChainStore>> {
    minterindex_storage::open(&app.storage)
        .await
        .with_context(|| format!("opening {} store", app.storage.backend))
}
