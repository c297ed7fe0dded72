//! CLI command definitions

use clap::Args;

/// Dispatch one event
#[derive(Debug, Args, Clone)]
pub struct RunCommand {
    /// Path to orchestrator YAML file
    #[arg(short, long)]
    pub config: String,

    /// Path to the event (JSON or YAML)
    #[arg(short, long)]
    pub event: String,

    /// Variable overrides (key=value)
    #[arg(long, value_parser = parse_key_value)]
    pub var: Vec<(String, String)>,

    /// Don't save runs to history
    #[arg(long)]
    pub no_history: bool,

    /// Keep the cache in memory for this invocation only
    #[arg(long)]
    pub no_cache: bool,
}

/// Validate a configuration
#[derive(Debug, Args, Clone)]
pub struct ValidateCommand {
    /// Path to orchestrator YAML file
    #[arg(short, long)]
    pub config: String,

    /// Output in JSON format
    #[arg(long)]
    pub json: bool,
}

/// List configured pipelines
#[derive(Debug, Args, Clone)]
pub struct ListCommand {
    /// Path to orchestrator YAML file
    #[arg(short, long)]
    pub config: String,
}

/// Show run history
#[derive(Debug, Args, Clone)]
pub struct HistoryCommand {
    /// Pipeline name to filter by
    #[arg(short, long)]
    pub pipeline: Option<String>,

    /// Number of recent runs to show
    #[arg(short, long, default_value_t = 10)]
    pub limit: usize,

    /// Output in JSON format
    #[arg(long)]
    pub json: bool,

    /// Show a single run
    #[arg(long)]
    pub run_id: Option<String>,
}

/// Show persisted cache entries
#[derive(Debug, Args, Clone)]
pub struct CacheCommand {
    /// Output in JSON format
    #[arg(long)]
    pub json: bool,
}

/// Parse key=value pairs
pub fn parse_key_value(s: &str) -> Result<(String, String), String> {
    match s.split_once('=') {
        Some((key, value)) if !key.is_empty() => Ok((key.to_string(), value.to_string())),
        _ => Err(format!("Invalid key=value pair: {}", s)),
    }
}
