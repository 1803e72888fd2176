//! Patchcord CLI - command-line front end for the patchcord engine.

mod commands;
mod patch_dsl;
mod session;
mod templates;

use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::{Parser, Subcommand};
use patchcord_config::{DEFAULT_LOG_FILTER, EngineConfig, default_config_path};

#[derive(Parser)]
#[command(name = "patchcord")]
#[command(author, version, about = "Patchcord patch editor engine", long_about = None)]
struct Cli {
    /// Configuration file (defaults to the user config directory)
    #[arg(long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build a patch from a pipe-chain description and show its order
    Patch(commands::patch::PatchArgs),

    /// Run a synthetic patch against the loopback server
    Simulate(commands::simulate::SimulateArgs),

    /// List built-in module templates
    Templates(commands::templates::TemplatesArgs),

    /// Show or initialize the configuration file
    Config(commands::config::ConfigArgs),
}

fn init_tracing(filter: &str) {
    use tracing_subscriber::EnvFilter;

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| filter.into()))
        .with_writer(std::io::stderr)
        .init();
    tracing_log::LogTracer::init().ok();
}

/// Loads the configuration and starts logging with its filter.
fn load_config(path: &Path) -> anyhow::Result<EngineConfig> {
    let config = EngineConfig::load_or_default(path)
        .with_context(|| format!("loading {}", path.display()))?;
    init_tracing(&config.log_filter);
    tracing::debug!(path = %path.display(), "config_loaded");
    Ok(config)
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config_path = cli.config.unwrap_or_else(default_config_path);

    match cli.command {
        Commands::Patch(args) => commands::patch::run(args, &load_config(&config_path)?),
        Commands::Simulate(args) => commands::simulate::run(args, &load_config(&config_path)?),
        Commands::Templates(args) => {
            init_tracing(DEFAULT_LOG_FILTER);
            commands::templates::run(args)
        }
        // Works even when the file is broken.
        Commands::Config(args) => {
            init_tracing(DEFAULT_LOG_FILTER);
            commands::config::run(args, &config_path)
        }
    }
}
