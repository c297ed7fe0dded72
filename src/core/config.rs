//! Orchestrator configuration from YAML

use crate::cache::CacheKeySpec;
use crate::core::{condition::RunCondition, Pipeline};
use crate::execution::retry::RetryPolicy;
use crate::trigger::TriggerSpec;
use anyhow::Result;
use serde::{Deserialize, Serialize};
use serde_yaml::Value;
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

/// Top-level configuration loaded from YAML
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrchestratorConfig {
    /// Working directory tasks run in and cache inputs are resolved against
    #[serde(default)]
    pub workdir: Option<PathBuf>,

    /// Variables shared by every pipeline
    #[serde(default)]
    pub variables: HashMap<String, String>,

    /// Where run reports are delivered
    #[serde(default)]
    pub notification: NotificationConfig,

    #[serde(default)]
    pub secrets: SecretsConfig,

    pub pipelines: Vec<PipelineConfig>,
}

/// Notification channel configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "channel", rename_all = "snake_case")]
pub enum NotificationConfig {
    /// Write reports to the log
    #[default]
    Log,
    /// POST reports as JSON
    Webhook {
        url: String,
        /// Secret holding the channel token
        #[serde(default)]
        token_secret: Option<String>,
    },
}

/// Secret resolution configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecretsConfig {
    /// Prefix of the environment variables secrets are read from
    #[serde(default = "default_env_prefix")]
    pub env_prefix: String,
}

fn default_env_prefix() -> String {
    "SHIPYARD_SECRET_".to_string()
}

impl Default for SecretsConfig {
    fn default() -> Self {
        Self {
            env_prefix: default_env_prefix(),
        }
    }
}

/// Pipeline configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    pub name: String,

    /// Events that start this pipeline
    #[serde(rename = "on")]
    pub trigger: TriggerSpec,

    #[serde(default)]
    pub variables: HashMap<String, String>,

    pub stages: Vec<StageConfig>,

    /// Retries per task (pipeline default)
    #[serde(default)]
    pub max_retries: Option<usize>,

    /// Default task timeout (in seconds)
    #[serde(default)]
    pub default_timeout_secs: Option<u64>,
}

/// Stage configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageConfig {
    pub name: String,

    #[serde(default)]
    pub tasks: Vec<TaskConfig>,

    /// Run condition; defaults to `on_prior_success`
    #[serde(default, rename = "when")]
    pub run_condition: Option<RunCondition>,

    /// Halt the run when this stage is skipped or fails
    #[serde(default)]
    pub blocking: bool,

    /// Marks the terminal notify stage
    #[serde(default)]
    pub notify: bool,
}

/// Task configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskConfig {
    pub name: String,

    /// Executor the task is dispatched to
    pub uses: String,

    /// Adapter parameters
    #[serde(default)]
    pub with: Value,

    #[serde(default)]
    pub cache: Option<CacheKeySpec>,

    #[serde(default)]
    pub retry: Option<RetryPolicy>,

    #[serde(default)]
    pub timeout_secs: Option<u64>,
}

impl OrchestratorConfig {
    /// Load configuration from a YAML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    /// Parse configuration from a YAML string
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: OrchestratorConfig = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        let mut pipeline_names = HashSet::new();
        for pipeline in &self.pipelines {
            if !pipeline_names.insert(pipeline.name.as_str()) {
                anyhow::bail!("Duplicate pipeline name: {}", pipeline.name);
            }
        }

        for pipeline in &self.pipelines {
            pipeline.validate()?;

            if let Some(workflow_run) = &pipeline.trigger.workflow_run {
                for upstream in &workflow_run.workflows {
                    if !pipeline_names.contains(upstream.as_str()) {
                        anyhow::bail!(
                            "Pipeline '{}' is triggered by non-existent pipeline '{}'",
                            pipeline.name,
                            upstream
                        );
                    }
                }
            }
        }

        self.check_cycles()?;

        Ok(())
    }

    /// Check for cycles in the workflow_run graph
    fn check_cycles(&self) -> Result<()> {
        let mut visited = HashSet::new();
        let mut recursion_stack = HashSet::new();

        for pipeline in &self.pipelines {
            if !visited.contains(&pipeline.name) {
                self.dfs_check(&pipeline.name, &mut visited, &mut recursion_stack)?;
            }
        }

        Ok(())
    }

    fn dfs_check(
        &self,
        name: &str,
        visited: &mut HashSet<String>,
        recursion_stack: &mut HashSet<String>,
    ) -> Result<()> {
        visited.insert(name.to_string());
        recursion_stack.insert(name.to_string());

        let upstreams = self
            .pipelines
            .iter()
            .find(|p| p.name == name)
            .and_then(|p| p.trigger.workflow_run.as_ref())
            .map(|w| w.workflows.clone())
            .unwrap_or_default();

        for upstream in &upstreams {
            if recursion_stack.contains(upstream) {
                anyhow::bail!("Cycle detected in workflow_run triggers involving pipeline '{}'", upstream);
            }
            if !visited.contains(upstream) {
                self.dfs_check(upstream, visited, recursion_stack)?;
            }
        }

        recursion_stack.remove(name);
        Ok(())
    }

    /// Working directory, defaulting to the current directory
    pub fn workdir(&self) -> PathBuf {
        self.workdir.clone().unwrap_or_else(|| PathBuf::from("."))
    }

    /// Convert config to pipeline domain models
    pub fn to_pipelines(&self) -> Vec<Pipeline> {
        self.pipelines
            .iter()
            .map(|p| Pipeline::from_config(p, &self.variables))
            .collect()
    }
}

impl PipelineConfig {
    /// Validate a single pipeline
    pub fn validate(&self) -> Result<()> {
        if self.trigger.is_empty() {
            anyhow::bail!("Pipeline '{}' declares no triggers", self.name);
        }
        self.trigger
            .compile()
            .map_err(|e| anyhow::anyhow!("Pipeline '{}': {}", self.name, e))?;

        let mut stage_names = HashSet::new();
        let mut task_names = HashSet::new();
        let notify_count = self.stages.iter().filter(|s| s.notify).count();

        if notify_count > 1 {
            anyhow::bail!("Pipeline '{}' declares more than one notify stage", self.name);
        }
        if notify_count == 1 && !self.stages.last().is_some_and(|s| s.notify) {
            anyhow::bail!("Pipeline '{}': the notify stage must be the last stage", self.name);
        }

        for stage in &self.stages {
            if !stage_names.insert(stage.name.as_str()) {
                anyhow::bail!("Pipeline '{}': duplicate stage name '{}'", self.name, stage.name);
            }
            if stage.notify && !stage.tasks.is_empty() {
                anyhow::bail!(
                    "Pipeline '{}': notify stage '{}' cannot declare tasks",
                    self.name,
                    stage.name
                );
            }
            for task in &stage.tasks {
                if !task_names.insert(task.name.as_str()) {
                    anyhow::bail!("Pipeline '{}': duplicate task name '{}'", self.name, task.name);
                }
                if let Some(retry) = &task.retry {
                    if retry.max_attempts == 0 {
                        anyhow::bail!(
                            "Pipeline '{}': task '{}' must allow at least one attempt",
                            self.name,
                            task.name
                        );
                    }
                }
                if let Some(cache) = &task.cache {
                    if cache.scope.trim().is_empty() {
                        anyhow::bail!(
                            "Pipeline '{}': task '{}' has an empty cache scope",
                            self.name,
                            task.name
                        );
                    }
                }
            }
        }

        Ok(())
    }
}
