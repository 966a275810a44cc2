//! DSC CLI - Command line interface for deep skill chaining
//!
//! Trains a skill chaining agent on the point-mass task and inspects the
//! artifacts a run leaves behind.

// Clippy pedantic allows - these are intentional design choices
#![allow(clippy::doc_markdown)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::must_use_candidate)]

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod commands;
mod settings;

use commands::{config, inspect, train};

#[derive(Parser)]
#[command(name = "dsc")]
#[command(author, version, about = "DSC - Deep Skill Chaining CLI", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Configuration file (defaults to DSC_CONFIG, ./dsc.toml, ~/.config/dsc/dsc.toml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Train an agent on the point-mass task
    Train(train::TrainArgs),

    /// Summarize a saved run
    Inspect(inspect::InspectArgs),

    /// Configuration management
    #[command(subcommand)]
    Config(config::ConfigCommands),
}

fn main() -> Result<()> {
    // Load environment from dsc.env file (before parsing args)
    let env_file = dsc_core::util::load_env_file();

    let cli = Cli::parse();

    // Initialize logging based on verbosity
    let log_level = if cli.verbose { "debug" } else { "info" };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                format!("dsc_cli={log_level},dsc_rl={log_level},dsc_core={log_level}").into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    if let Some(path) = &env_file {
        tracing::debug!("Loaded environment from {}", path.display());
    }

    let config_path = cli.config.as_deref();
    match cli.command {
        Commands::Train(args) => train::run(&args, config_path),
        Commands::Inspect(args) => inspect::run(&args),
        Commands::Config(cmd) => config::run(cmd, config_path),
    }
}
