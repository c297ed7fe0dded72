//! SQLite-based run history store

use crate::core::{event::TriggerKind, state::RunStatus};
use crate::persistence::{connect_sqlite, HistoryStore, RunSummary};
use anyhow::{Context, Result};
use chrono::{DateTime, NaiveDateTime, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};
use uuid::Uuid;

const SELECT_COLUMNS: &str = "SELECT id, pipeline_name, status, trigger_kind, git_ref, commit_sha, \
     started_at, ended_at, succeeded_stages, failed_stages, skipped_stages, notified FROM runs";

/// SQLite run history
pub struct SqliteHistoryStore {
    pool: SqlitePool,
}

impl SqliteHistoryStore {
    /// Create a new SQLite store
    pub async fn new(db_path: &str) -> Result<Self> {
        let pool = connect_sqlite(db_path)
            .await
            .context("Failed to connect to database")?;

        let store = Self { pool };
        store.init().await?;

        Ok(store)
    }

    /// Create store with default path
    pub async fn with_default_path() -> Result<Self> {
        let data_dir = dirs::data_local_dir().unwrap_or_else(|| std::path::PathBuf::from("."));
        let db_dir = data_dir.join("shipyard");
        std::fs::create_dir_all(&db_dir)?;

        let db_path = db_dir.join("history.db");
        Self::new(&db_path.to_string_lossy()).await
    }

    /// Initialize database schema
    async fn init(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS runs (
                id TEXT PRIMARY KEY,
                pipeline_name TEXT NOT NULL,
                status TEXT NOT NULL,
                trigger_kind TEXT NOT NULL,
                git_ref TEXT NOT NULL,
                commit_sha TEXT NOT NULL,
                started_at TEXT,
                ended_at TEXT,
                succeeded_stages INTEGER NOT NULL DEFAULT 0,
                failed_stages INTEGER NOT NULL DEFAULT 0,
                skipped_stages INTEGER NOT NULL DEFAULT 0,
                notified INTEGER
            );

            CREATE INDEX IF NOT EXISTS idx_runs_pipeline ON runs(pipeline_name);
            CREATE INDEX IF NOT EXISTS idx_runs_started_at ON runs(started_at);
            "#,
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    fn from_naive(dt: NaiveDateTime) -> DateTime<Utc> {
        DateTime::from_naive_utc_and_offset(dt, Utc)
    }

    fn parse_trigger_kind(s: &str) -> TriggerKind {
        match s {
            "pull_request" => TriggerKind::PullRequest,
            "workflow_completion" => TriggerKind::WorkflowCompletion,
            _ => TriggerKind::Push,
        }
    }

    fn from_row(row: &SqliteRow) -> Result<RunSummary> {
        Ok(RunSummary {
            run_id: Uuid::parse_str(&row.get::<String, _>("id"))?,
            pipeline_name: row.get("pipeline_name"),
            status: RunStatus::parse(&row.get::<String, _>("status")).unwrap_or(RunStatus::Pending),
            trigger_kind: Self::parse_trigger_kind(&row.get::<String, _>("trigger_kind")),
            git_ref: row.get("git_ref"),
            commit_sha: row.get("commit_sha"),
            started_at: row
                .get::<Option<NaiveDateTime>, _>("started_at")
                .map(Self::from_naive),
            ended_at: row
                .get::<Option<NaiveDateTime>, _>("ended_at")
                .map(Self::from_naive),
            succeeded_stages: row.get::<i64, _>("succeeded_stages") as usize,
            failed_stages: row.get::<i64, _>("failed_stages") as usize,
            skipped_stages: row.get::<i64, _>("skipped_stages") as usize,
            notified: row.get::<Option<bool>, _>("notified"),
        })
    }
}

#[async_trait::async_trait]
impl HistoryStore for SqliteHistoryStore {
    async fn save_run(&self, summary: &RunSummary) -> Result<()> {
        sqlx::query(
            r#"
            INSERT OR REPLACE INTO runs
            (id, pipeline_name, status, trigger_kind, git_ref, commit_sha, started_at, ended_at,
             succeeded_stages, failed_stages, skipped_stages, notified)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)
            "#,
        )
        .bind(summary.run_id.to_string())
        .bind(&summary.pipeline_name)
        .bind(summary.status.as_str())
        .bind(summary.trigger_kind.to_string())
        .bind(&summary.git_ref)
        .bind(&summary.commit_sha)
        .bind(summary.started_at.map(|dt| dt.naive_utc()))
        .bind(summary.ended_at.map(|dt| dt.naive_utc()))
        .bind(summary.succeeded_stages as i64)
        .bind(summary.failed_stages as i64)
        .bind(summary.skipped_stages as i64)
        .bind(summary.notified)
        .execute(&self.pool)
        .await
        .context("Failed to save run")?;

        Ok(())
    }

    async fn load_run(&self, run_id: Uuid) -> Result<Option<RunSummary>> {
        let row = sqlx::query(&format!("{} WHERE id = ?1", SELECT_COLUMNS))
            .bind(run_id.to_string())
            .fetch_optional(&self.pool)
            .await
            .context("Failed to load run")?;

        row.as_ref().map(Self::from_row).transpose()
    }

    async fn list_runs(&self, pipeline_name: Option<&str>, limit: usize) -> Result<Vec<RunSummary>> {
        let rows = match pipeline_name {
            Some(name) => {
                sqlx::query(&format!(
                    "{} WHERE pipeline_name = ?1 ORDER BY started_at DESC LIMIT ?2",
                    SELECT_COLUMNS
                ))
                .bind(name)
                .bind(limit as i64)
                .fetch_all(&self.pool)
                .await
            }
            None => {
                sqlx::query(&format!("{} ORDER BY started_at DESC LIMIT ?1", SELECT_COLUMNS))
                    .bind(limit as i64)
                    .fetch_all(&self.pool)
                    .await
            }
        }
        .context("Failed to list runs")?;

        rows.iter().map(Self::from_row).collect()
    }

    async fn list_pipelines(&self) -> Result<Vec<String>> {
        let rows = sqlx::query("SELECT DISTINCT pipeline_name FROM runs ORDER BY pipeline_name ASC")
            .fetch_all(&self.pool)
            .await
            .context("Failed to list pipelines")?;

        Ok(rows.iter().map(|row| row.get("pipeline_name")).collect())
    }
}
