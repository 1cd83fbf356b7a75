//! CLI interface for parity-hft
//!
//! Provides subcommands for:
//! - `run`: Trade (or paper trade with `--simulate`) until interrupted
//! - `config`: Show the effective configuration

mod run;

pub use run::RunArgs;

use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(name = "parity-hft")]
#[command(about = "Digit-parity reversal trading client for Deriv-style tick streams")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Path to configuration file
    #[arg(short, long, default_value = "config.toml")]
    pub config: String,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Start a trading session
    Run(RunArgs),
    /// Show the effective configuration (credential omitted)
    Config,
}
