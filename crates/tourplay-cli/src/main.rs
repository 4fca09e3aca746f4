//! Tourplay CLI - Headless driver for the playback controller
//!
//! Features:
//! - Device snapshot classification
//! - Catalog inspection
//! - Scripted trace replay against a simulated surface

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

mod commands;
mod output;
mod trace;

/// Tourplay CLI - Adaptive playback toolkit
#[derive(Parser)]
#[command(name = "tourplay")]
#[command(author = "Tourplay Developers")]
#[command(version)]
#[command(about = "Adaptive playback controller toolkit", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Output format (text, json)
    #[arg(short, long, default_value = "text", global = true)]
    format: String,

    /// Emit logs as JSON
    #[arg(long, global = true)]
    log_json: bool,

    /// Controller configuration (JSON)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Classify a device environment snapshot
    Classify {
        /// Path to an environment snapshot (JSON)
        snapshot: PathBuf,
    },

    /// List the quality catalog and resolved sources
    Catalog,

    /// Replay a playback trace through the controller
    Simulate {
        /// Path to a trace file (JSON)
        trace: PathBuf,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize tracing; RUST_LOG wins over --verbose
    let level = if cli.verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    if cli.log_json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
    }

    tourplay_core::init();
    let config = commands::load_config(cli.config.as_deref())?;

    match cli.command {
        Commands::Classify { snapshot } => {
            commands::classify(&snapshot, &config, &cli.format)?;
        }
        Commands::Catalog => {
            commands::catalog(&config, &cli.format)?;
        }
        Commands::Simulate { trace } => {
            commands::simulate(&trace, config, &cli.format)?;
        }
    }

    Ok(())
}
