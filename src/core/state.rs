//! Execution state models

use crate::core::{event::Conclusion, stage::StageKind};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Overall run status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    /// Run has been created but not started
    Pending,
    /// Run is executing stages
    Running,
    Success,
    Failure,
    Cancelled,
}

impl RunStatus {
    /// Check if the run is in a terminal state
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            RunStatus::Success | RunStatus::Failure | RunStatus::Cancelled
        )
    }

    /// Conclusion reported to downstream listeners
    pub fn conclusion(&self) -> Option<Conclusion> {
        match self {
            RunStatus::Success => Some(Conclusion::Success),
            RunStatus::Failure => Some(Conclusion::Failure),
            RunStatus::Cancelled => Some(Conclusion::Cancelled),
            RunStatus::Pending | RunStatus::Running => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RunStatus::Pending => "pending",
            RunStatus::Running => "running",
            RunStatus::Success => "success",
            RunStatus::Failure => "failure",
            RunStatus::Cancelled => "cancelled",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(RunStatus::Pending),
            "running" => Some(RunStatus::Running),
            "success" => Some(RunStatus::Success),
            "failure" => Some(RunStatus::Failure),
            "cancelled" => Some(RunStatus::Cancelled),
            _ => None,
        }
    }
}

/// Status of a single task invocation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Success,
    Failure,
    Skipped,
}

/// Result of one task invocation within a run. Immutable once recorded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskResult {
    pub task_name: String,
    pub status: TaskStatus,
    /// Captured output, or the failure/skip reason
    pub output: String,
    pub cache_hit: bool,
    /// Number of adapter invocations (0 for skips and cache hits)
    pub attempts: usize,
}

impl TaskResult {
    pub fn success(task_name: impl Into<String>, output: String, attempts: usize) -> Self {
        Self {
            task_name: task_name.into(),
            status: TaskStatus::Success,
            output,
            cache_hit: false,
            attempts,
        }
    }

    pub fn cached(task_name: impl Into<String>, output: String) -> Self {
        Self {
            task_name: task_name.into(),
            status: TaskStatus::Success,
            output,
            cache_hit: true,
            attempts: 0,
        }
    }

    pub fn failure(task_name: impl Into<String>, error: String, attempts: usize) -> Self {
        Self {
            task_name: task_name.into(),
            status: TaskStatus::Failure,
            output: error,
            cache_hit: false,
            attempts,
        }
    }

    pub fn skipped(task_name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            task_name: task_name.into(),
            status: TaskStatus::Skipped,
            output: reason.into(),
            cache_hit: false,
            attempts: 0,
        }
    }
}

/// Outcome of a stage
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageStatus {
    Success,
    Failure,
    Skipped,
}

/// Recorded result of a stage within a run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageResult {
    pub stage_name: String,
    #[serde(default)]
    pub kind: StageKind,
    pub status: StageStatus,
    pub tasks: Vec<TaskResult>,
    /// Why the stage was skipped, if it was
    pub skip_reason: Option<String>,
    pub started_at: DateTime<Utc>,
    pub ended_at: DateTime<Utc>,
}

impl StageResult {
    /// A stage whose every task was skipped for `reason`
    pub fn skipped<'a>(
        stage_name: impl Into<String>,
        task_names: impl IntoIterator<Item = &'a str>,
        reason: impl Into<String>,
    ) -> Self {
        let reason = reason.into();
        let now = Utc::now();
        Self {
            stage_name: stage_name.into(),
            kind: StageKind::Standard,
            status: StageStatus::Skipped,
            tasks: task_names
                .into_iter()
                .map(|name| TaskResult::skipped(name, reason.clone()))
                .collect(),
            skip_reason: Some(reason),
            started_at: now,
            ended_at: now,
        }
    }

    /// Check if any task in this stage failed
    pub fn has_failure(&self) -> bool {
        self.status == StageStatus::Failure
    }

    /// Whether this is the result of the terminal notify stage
    pub fn is_notify(&self) -> bool {
        self.kind == StageKind::Notify
    }

    pub fn task(&self, name: &str) -> Option<&TaskResult> {
        self.tasks.iter().find(|t| t.task_name == name)
    }
}
