use anyhow::{Context, Result};
use shipyard::adapters::{ExecutorRegistry, ProcessRunner};
use shipyard::cache::{CacheStore, InMemoryCacheStore};
use shipyard::cli::commands::{CacheCommand, HistoryCommand, ListCommand, RunCommand, ValidateCommand};
use shipyard::cli::output::*;
use shipyard::cli::{Cli, Command};
use shipyard::core::{config::OrchestratorConfig, Event, RunStatus};
use shipyard::execution::Orchestrator;
use shipyard::persistence::{HistoryStore, InMemoryHistory};
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::from_args();

    // Initialize logging; RUST_LOG wins over --verbose
    let default_level = if cli.verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let subscriber = FmtSubscriber::builder().with_env_filter(filter).finish();
    tracing::subscriber::set_global_default(subscriber)
        .context("Failed to set logging subscriber")?;

    match &cli.command {
        Command::Run(cmd) => run_event(cmd).await?,
        Command::Validate(cmd) => validate_config(cmd)?,
        Command::List(cmd) => list_pipelines(cmd)?,
        Command::History(cmd) => show_history(cmd).await?,
        Command::Cache(cmd) => show_cache(cmd).await?,
    }

    Ok(())
}

async fn run_event(cmd: &RunCommand) -> Result<()> {
    let mut config =
        OrchestratorConfig::from_file(&cmd.config).context("Failed to load configuration")?;
    for (key, value) in &cmd.var {
        config.variables.insert(key.clone(), value.clone());
        println!("{} Variable override: {} = {}", INFO, style(key).cyan(), style(value).dim());
    }

    let event = Event::from_file(&cmd.event).context("Failed to load event")?;
    println!(
        "{} {} event on {} ({})",
        INFO,
        style(event.trigger_kind).bold(),
        style(&event.git_ref).cyan(),
        style(event.short_sha()).dim()
    );

    let registry = ExecutorRegistry::with_defaults(Arc::new(ProcessRunner::new()));
    let cache = open_cache(cmd.no_cache).await?;
    let history = open_history(cmd.no_history).await?;

    let orchestrator = Orchestrator::from_config(&config, registry, cache)?.with_history(history);
    orchestrator.executor().add_event_handler(|event| {
        println!("{}", format_execution_event(event));
    });
    let orchestrator = Arc::new(orchestrator);

    let interrupt = {
        let orchestrator = orchestrator.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                let cancelled = orchestrator.cancel_all("interrupted");
                warn!("Interrupted, cancelling {} active run(s)", cancelled);
            }
        })
    };

    println!();
    let runs = orchestrator.dispatch(event).await;
    interrupt.abort();

    if runs.is_empty() {
        println!("\n{} No pipeline accepted the event", INFO);
        return Ok(());
    }

    println!("\n{} Runs:", INFO);
    for run in &runs {
        println!("  {}", format_run(run));
    }

    if runs.iter().any(|run| run.overall_status != RunStatus::Success) {
        std::process::exit(1);
    }

    Ok(())
}

#[cfg(feature = "sqlite")]
async fn open_cache(ephemeral: bool) -> Result<Arc<dyn CacheStore>> {
    if ephemeral {
        return Ok(Arc::new(InMemoryCacheStore::new()));
    }
    let store = shipyard::cache::SqliteCacheStore::with_default_path()
        .await
        .context("Failed to open cache")?;
    Ok(Arc::new(store))
}

#[cfg(not(feature = "sqlite"))]
async fn open_cache(_ephemeral: bool) -> Result<Arc<dyn CacheStore>> {
    Ok(Arc::new(InMemoryCacheStore::new()))
}

#[cfg(feature = "sqlite")]
async fn open_history(ephemeral: bool) -> Result<Arc<dyn HistoryStore>> {
    if ephemeral {
        return Ok(Arc::new(InMemoryHistory::new()));
    }
    Ok(Arc::new(
        shipyard::persistence::SqliteHistoryStore::with_default_path().await?,
    ))
}

#[cfg(not(feature = "sqlite"))]
async fn open_history(_ephemeral: bool) -> Result<Arc<dyn HistoryStore>> {
    Ok(Arc::new(InMemoryHistory::new()))
}

fn validate_config(cmd: &ValidateCommand) -> Result<()> {
    println!("{} Validating configuration...", INFO);

    match OrchestratorConfig::from_file(&cmd.config) {
        Ok(config) => {
            let registry = ExecutorRegistry::with_defaults(Arc::new(ProcessRunner::new()));
            if let Err(e) = registry.check_pipelines(&config.to_pipelines()) {
                println!("{} Validation failed:", CROSS);
                println!("  {}", style(e).red());
                std::process::exit(1);
            }

            println!("{} Configuration is valid!", CHECK);
            println!("  Pipelines: {}", style(config.pipelines.len()).cyan());
            println!("  Variables: {}", style(config.variables.len()).cyan());

            if cmd.json {
                let json = serde_json::to_string_pretty(&config)?;
                println!("\n{}", json);
            }
            Ok(())
        }
        Err(e) => {
            println!("{} Validation failed:", CROSS);
            println!("  {}", style(e).red());
            std::process::exit(1);
        }
    }
}

fn list_pipelines(cmd: &ListCommand) -> Result<()> {
    let config = OrchestratorConfig::from_file(&cmd.config).context("Failed to load configuration")?;
    let pipelines = config.to_pipelines();

    println!("{} Configured pipelines:", INFO);
    for pipeline in &pipelines {
        println!("{}", format_pipeline(pipeline));
    }

    Ok(())
}

async fn show_history(cmd: &HistoryCommand) -> Result<()> {
    let store = open_history(false).await?;

    if let Some(run_id) = &cmd.run_id {
        let run_id = uuid::Uuid::parse_str(run_id).context("Invalid run ID format")?;
        match store.load_run(run_id).await? {
            Some(summary) => {
                println!("{}", serde_json::to_string_pretty(&summary)?);
            }
            None => {
                println!("{} Run not found", WARN);
            }
        }
        return Ok(());
    }

    let runs = store.list_runs(cmd.pipeline.as_deref(), cmd.limit).await?;
    if runs.is_empty() {
        println!("{} No runs found", INFO);
        return Ok(());
    }

    if cmd.json {
        let data = serde_json::json!({ "runs": runs });
        println!("{}", serde_json::to_string_pretty(&data)?);
    } else {
        println!("{} Run history (showing latest {}):", INFO, cmd.limit);
        for summary in &runs {
            println!("  {}", format_run_summary(summary));
        }
    }

    Ok(())
}

async fn show_cache(cmd: &CacheCommand) -> Result<()> {
    let cache = open_cache(false).await?;
    let entries = cache.entries().await?;
    info!("{} cache entries", entries.len());

    if entries.is_empty() {
        println!("{} Cache is empty", INFO);
        return Ok(());
    }

    if cmd.json {
        let data = serde_json::json!({ "entries": entries });
        println!("{}", serde_json::to_string_pretty(&data)?);
    } else {
        println!("{} Cache entries:", INFO);
        for entry in &entries {
            println!("{}", format_cache_entry(entry));
        }
    }

    Ok(())
}
