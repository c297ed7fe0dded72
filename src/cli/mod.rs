//! Command-line interface

pub mod commands;
pub mod output;

use clap::{Parser, Subcommand};
use commands::{CacheCommand, HistoryCommand, ListCommand, RunCommand, ValidateCommand};
use std::ffi::OsString;

/// Event-driven gate-then-deploy pipeline orchestrator
#[derive(Debug, Parser, Clone)]
#[command(name = "shipyard")]
#[command(version)]
#[command(about = "Runs gate and deploy pipelines in response to repository events", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

/// Available commands
#[derive(Debug, Subcommand, Clone)]
pub enum Command {
    /// Dispatch an event to the configured pipelines
    Run(RunCommand),

    /// Validate an orchestrator configuration
    Validate(ValidateCommand),

    /// List configured pipelines
    List(ListCommand),

    /// Show run history
    History(HistoryCommand),

    /// Show persisted cache entries
    Cache(CacheCommand),
}

impl Cli {
    /// Parse CLI arguments from environment
    pub fn from_args() -> Self {
        Self::parse()
    }

    /// Parse CLI arguments from a slice
    pub fn try_parse_from<I, T>(itr: I) -> Result<Self, clap::Error>
    where
        I: IntoIterator<Item = T>,
        T: Into<OsString> + Clone,
    {
        <Self as Parser>::try_parse_from(itr)
    }
}
