//! Persistence layer for run history

#[cfg(feature = "sqlite")]
pub mod store;

#[cfg(feature = "sqlite")]
pub use store::SqliteHistoryStore;

use crate::core::{
    event::TriggerKind,
    run::Run,
    state::{RunStatus, StageStatus},
};
use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

/// Summary of a finished run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunSummary {
    pub run_id: Uuid,

    pub pipeline_name: String,

    pub status: RunStatus,

    pub trigger_kind: TriggerKind,

    #[serde(rename = "ref")]
    pub git_ref: String,

    pub commit_sha: String,

    pub started_at: Option<DateTime<Utc>>,

    pub ended_at: Option<DateTime<Utc>>,

    /// Work stages that ran to success; the notify stage is not counted
    pub succeeded_stages: usize,

    pub failed_stages: usize,

    pub skipped_stages: usize,

    /// Whether the run report was delivered; `None` if it was never attempted
    #[serde(default)]
    pub notified: Option<bool>,
}

impl RunSummary {
    /// Create a summary from a run
    pub fn from_run(run: &Run) -> Self {
        let count = |status: StageStatus| {
            run.stage_results
                .iter()
                .filter(|s| !s.is_notify() && s.status == status)
                .count()
        };
        let notified = run
            .stage_results
            .iter()
            .find(|s| s.is_notify())
            .map(|s| s.status == StageStatus::Success);
        Self {
            run_id: run.id,
            pipeline_name: run.pipeline_name.clone(),
            status: run.overall_status,
            trigger_kind: run.triggering_event.trigger_kind,
            git_ref: run.triggering_event.git_ref.clone(),
            commit_sha: run.triggering_event.commit_sha.clone(),
            started_at: run.started_at,
            ended_at: run.ended_at,
            succeeded_stages: count(StageStatus::Success),
            failed_stages: count(StageStatus::Failure),
            skipped_stages: count(StageStatus::Skipped),
            notified,
        }
    }

    /// Run duration in seconds, once both endpoints are known
    pub fn duration_secs(&self) -> Option<i64> {
        match (self.started_at, self.ended_at) {
            (Some(start), Some(end)) => Some(end.signed_duration_since(start).num_seconds()),
            _ => None,
        }
    }
}

/// Trait for run history backends
#[async_trait::async_trait]
pub trait HistoryStore: Send + Sync {
    /// Save (or replace) a run summary
    async fn save_run(&self, summary: &RunSummary) -> Result<()>;

    /// Load a run by ID
    async fn load_run(&self, run_id: Uuid) -> Result<Option<RunSummary>>;

    /// Most recent runs first, optionally for one pipeline
    async fn list_runs(&self, pipeline_name: Option<&str>, limit: usize) -> Result<Vec<RunSummary>>;

    /// All pipeline names with recorded runs
    async fn list_pipelines(&self) -> Result<Vec<String>>;
}

/// In-memory history (for testing or ephemeral use)
pub struct InMemoryHistory {
    runs: tokio::sync::RwLock<HashMap<Uuid, RunSummary>>,
}

impl InMemoryHistory {
    pub fn new() -> Self {
        Self {
            runs: tokio::sync::RwLock::new(HashMap::new()),
        }
    }
}

impl Default for InMemoryHistory {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl HistoryStore for InMemoryHistory {
    async fn save_run(&self, summary: &RunSummary) -> Result<()> {
        self.runs.write().await.insert(summary.run_id, summary.clone());
        Ok(())
    }

    async fn load_run(&self, run_id: Uuid) -> Result<Option<RunSummary>> {
        Ok(self.runs.read().await.get(&run_id).cloned())
    }

    async fn list_runs(&self, pipeline_name: Option<&str>, limit: usize) -> Result<Vec<RunSummary>> {
        let runs = self.runs.read().await;
        let mut result: Vec<RunSummary> = runs
            .values()
            .filter(|r| pipeline_name.map_or(true, |name| r.pipeline_name == name))
            .cloned()
            .collect();
        result.sort_by(|a, b| b.started_at.cmp(&a.started_at));
        result.truncate(limit);
        Ok(result)
    }

    async fn list_pipelines(&self) -> Result<Vec<String>> {
        let runs = self.runs.read().await;
        let mut names: Vec<String> = runs.values().map(|r| r.pipeline_name.clone()).collect();
        names.sort();
        names.dedup();
        Ok(names)
    }
}

/// Open a SQLite pool; `:memory:` databases get a single connection so every
/// query sees the same database
#[cfg(feature = "sqlite")]
pub async fn connect_sqlite(db_path: &str) -> std::result::Result<sqlx::SqlitePool, sqlx::Error> {
    use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
    use std::str::FromStr;

    let options = SqliteConnectOptions::from_str(&format!("sqlite:{}", db_path))?
        .create_if_missing(true);
    let max_connections = if db_path == ":memory:" { 1 } else { 4 };
    SqlitePoolOptions::new()
        .max_connections(max_connections)
        .connect_with(options)
        .await
}
