//! Stage domain model

use crate::core::{
    condition::RunCondition,
    config::StageConfig,
    task::{Task, TaskDefaults},
};
use serde::{Deserialize, Serialize};

/// Name used for the notify stage appended when a pipeline declares none
pub const DEFAULT_NOTIFY_STAGE: &str = "notify";

/// What a stage does
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageKind {
    /// Runs its tasks in order with fail-fast
    #[default]
    Standard,
    /// Reserved terminal stage that invokes the notifier
    Notify,
}

/// An ordered group of tasks sharing a gating condition.
///
/// Statically defined; never mutated while a run executes.
#[derive(Debug, Clone)]
pub struct Stage {
    pub name: String,
    pub tasks: Vec<Task>,
    pub run_condition: RunCondition,
    /// A false condition or a failed task halts the whole run
    pub blocking: bool,
    pub kind: StageKind,
}

impl Stage {
    /// Create a stage from its configuration
    pub fn from_config(config: &StageConfig, defaults: &TaskDefaults) -> Self {
        if config.notify {
            return Stage::notify(&config.name);
        }

        Stage {
            name: config.name.clone(),
            tasks: config
                .tasks
                .iter()
                .map(|task| Task::from_config(task, defaults))
                .collect(),
            run_condition: config
                .run_condition
                .clone()
                .unwrap_or(RunCondition::OnPriorSuccess),
            blocking: config.blocking,
            kind: StageKind::Standard,
        }
    }

    /// A standard stage with the given tasks
    pub fn new(name: impl Into<String>, tasks: Vec<Task>) -> Self {
        Stage {
            name: name.into(),
            tasks,
            run_condition: RunCondition::OnPriorSuccess,
            blocking: false,
            kind: StageKind::Standard,
        }
    }

    /// The terminal notify stage. Its condition is always `always`.
    pub fn notify(name: impl Into<String>) -> Self {
        Stage {
            name: name.into(),
            tasks: Vec::new(),
            run_condition: RunCondition::Always,
            blocking: false,
            kind: StageKind::Notify,
        }
    }

    pub fn when(mut self, condition: RunCondition) -> Self {
        self.run_condition = condition;
        self
    }

    pub fn blocking(mut self) -> Self {
        self.blocking = true;
        self
    }

    pub fn is_notify(&self) -> bool {
        self.kind == StageKind::Notify
    }

    pub fn task_names(&self) -> impl Iterator<Item = &str> {
        self.tasks.iter().map(|t| t.name.as_str())
    }
}
