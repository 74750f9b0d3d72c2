//! smokestore CLI - Main Entry Point
//!
//! Inspects a smokestore directory: checkpoints, DOM queries, screenshot
//! diffs and console summaries.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use smokestore_cli::commands::{checkpoints, console, dom, screenshot};
use smokestore_cli::output::{self, print_error};
use smokestore_core::{StorageConfig, StorageManager};

/// smokestore - artifact storage for browser smoke tests
#[derive(Parser)]
#[command(name = "smokestore")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Store directory (overrides the configuration file)
    #[arg(long, env = "SMOKESTORE_DIR", global = true)]
    store: Option<PathBuf>,

    /// Configuration file
    #[arg(long, env = "SMOKESTORE_CONFIG", global = true)]
    config: Option<PathBuf>,

    /// Output format
    #[arg(long, default_value = "json", global = true)]
    format: output::OutputFormat,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List, inspect, compare and delete checkpoints
    #[command(subcommand)]
    Checkpoints(checkpoints::CheckpointCommands),

    /// Query DOM snapshots
    #[command(subcommand)]
    Dom(dom::DomCommands),

    /// Screenshot metadata, thumbnails and diffs
    #[command(subcommand)]
    Screenshot(screenshot::ScreenshotCommands),

    /// Console log summaries and queries
    #[command(subcommand)]
    Console(console::ConsoleCommands),

    /// Record counts and sizes per store
    Stats,

    /// Print the effective configuration
    Config,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // Initialize logging
    let log_level = if cli.verbose { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level)),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    if let Err(e) = run(cli).await {
        print_error(&format!("{:#}", e));
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let config_path = cli.config.unwrap_or_else(smokestore_core::default_config_path);
    let mut config = StorageConfig::load(&config_path)?;
    if let Some(store) = cli.store {
        config.base_dir = store;
    }

    if let Commands::Config = cli.command {
        return output::print_item(&config, cli.format);
    }

    let manager = StorageManager::open(config).await?;

    match cli.command {
        Commands::Checkpoints(cmd) => checkpoints::execute(cmd, &manager, cli.format).await?,
        Commands::Dom(cmd) => dom::execute(cmd, &manager, cli.format).await?,
        Commands::Screenshot(cmd) => screenshot::execute(cmd, &manager, cli.format).await?,
        Commands::Console(cmd) => console::execute(cmd, &manager, cli.format).await?,
        Commands::Stats => output::print_item(&manager.get_storage_stats().await?, cli.format)?,
        Commands::Config => {}
    }

    Ok(())
}
