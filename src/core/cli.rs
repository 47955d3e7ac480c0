//! Command-line argument parsing

use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(name = "hub", about = "Unified realtime messaging hub", version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,

    #[command(flatten)]
    pub config: CliConfig,
}

#[derive(Debug, Clone, Default, clap::Args)]
pub struct CliConfig {
    /// Bind host
    #[arg(long, global = true)]
    pub host: Option<String>,

    /// Bind port
    #[arg(long, global = true)]
    pub port: Option<u16>,

    /// Path to a TOML config file
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Override the data directory
    #[arg(long, global = true)]
    pub data_dir: Option<PathBuf>,

    /// Enable debug mode
    #[arg(long, global = true)]
    pub debug: bool,

    /// Disable authentication (all connections are treated as guests with full access)
    #[arg(long, global = true)]
    pub no_auth: bool,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Start the hub server (default)
    Start,
    /// Offline maintenance commands
    System {
        #[command(subcommand)]
        command: SystemCommands,
    },
}

#[derive(Debug, Subcommand)]
pub enum SystemCommands {
    /// Delete the persisted incident log / breaker config store
    Prune {
        #[arg(long)]
        yes: bool,
    },
}

pub fn parse() -> (CliConfig, Option<Commands>) {
    let cli = Cli::parse();
    (cli.config, cli.command)
}
