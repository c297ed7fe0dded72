//! Task executors - adapters for the external operations tasks invoke
//!
//! The core only records whether an adapter reported success. Side effects
//! (pushing images, applying manifests) belong to the adapter.

pub mod checkout;
pub mod container;
pub mod deploy;
pub mod process;
pub mod shell;

use crate::core::{context::RunContext, task::Task, Pipeline};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;

pub use checkout::CheckoutExecutor;
pub use container::{ContainerRegistry, DockerCli, ImageBuildExecutor, ImagePushExecutor};
pub use deploy::{DeployExecutor, Deployer, KubectlDeployer};
pub use process::{CommandOutput, CommandRunner, CommandSpec, ProcessRunner};
pub use shell::ShellExecutor;

/// Errors reported by task executors
#[derive(Debug, Error)]
pub enum ExecutorError {
    #[error("invalid parameters: {0}")]
    InvalidParams(String),

    #[error("secret '{0}' could not be resolved")]
    MissingSecret(String),

    #[error("failed to start {program}: {message}")]
    Spawn { program: String, message: String },

    #[error("{command} exited with code {code}: {stderr}")]
    CommandFailed {
        command: String,
        code: i32,
        stderr: String,
    },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Failed(String),
}

/// Normalized successful outcome of an adapter invocation
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TaskOutput {
    /// Captured output
    pub output: String,

    /// Reference to the produced artifact (image ref, manifest set, ...)
    pub artifact_ref: Option<String>,

    /// Values later tasks may read; `workspace.<name>` keys name
    /// working directories
    pub exports: HashMap<String, String>,
}

impl TaskOutput {
    pub fn new(output: impl Into<String>) -> Self {
        Self {
            output: output.into(),
            ..Self::default()
        }
    }

    pub fn with_artifact(mut self, artifact_ref: impl Into<String>) -> Self {
        self.artifact_ref = Some(artifact_ref.into());
        self
    }

    pub fn with_export(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.exports.insert(key.into(), value.into());
        self
    }
}

/// Runs one external operation
#[async_trait]
pub trait TaskExecutor: Send + Sync {
    /// Invoke the operation. `task.params` arrive already rendered.
    async fn run(&self, task: &Task, ctx: &RunContext) -> Result<TaskOutput, ExecutorError>;
}

/// Deserialize a task's `with:` parameters into a typed struct
pub fn parse_params<T: DeserializeOwned>(task: &Task) -> Result<T, ExecutorError> {
    let params = if task.params.is_null() {
        serde_yaml::Value::Mapping(Default::default())
    } else {
        task.params.clone()
    };
    serde_yaml::from_value(params)
        .map_err(|e| ExecutorError::InvalidParams(format!("task '{}': {}", task.name, e)))
}

/// Executors by name, as referenced by a task's `uses:`
#[derive(Clone, Default)]
pub struct ExecutorRegistry {
    executors: HashMap<String, Arc<dyn TaskExecutor>>,
}

impl ExecutorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the built-in executors, all running commands through
    /// `runner`
    pub fn with_defaults(runner: Arc<dyn CommandRunner>) -> Self {
        let registry_client: Arc<dyn ContainerRegistry> = Arc::new(DockerCli::new(runner.clone()));
        let deployer: Arc<dyn Deployer> = Arc::new(KubectlDeployer::new(runner.clone()));

        Self::new()
            .with("shell", ShellExecutor::new(runner.clone()))
            .with("checkout", CheckoutExecutor::new(runner))
            .with("image-build", ImageBuildExecutor::new(registry_client.clone()))
            .with("image-push", ImagePushExecutor::new(registry_client))
            .with("deploy", DeployExecutor::new(deployer))
    }

    pub fn register(&mut self, name: impl Into<String>, executor: Arc<dyn TaskExecutor>) {
        self.executors.insert(name.into(), executor);
    }

    pub fn with<E: TaskExecutor + 'static>(mut self, name: impl Into<String>, executor: E) -> Self {
        self.register(name, Arc::new(executor));
        self
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn TaskExecutor>> {
        self.executors.get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.executors.contains_key(name)
    }

    /// Registered names, sorted
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.executors.keys().map(String::as_str).collect();
        names.sort();
        names
    }

    /// Check that every task references a registered executor
    pub fn check_pipelines(&self, pipelines: &[Pipeline]) -> anyhow::Result<()> {
        for pipeline in pipelines {
            for task in pipeline.tasks() {
                if !self.contains(&task.executor_ref) {
                    anyhow::bail!(
                        "Pipeline '{}': task '{}' uses unknown executor '{}' (available: {})",
                        pipeline.name,
                        task.name,
                        task.executor_ref,
                        self.names().join(", ")
                    );
                }
            }
        }
        Ok(())
    }
}

impl std::fmt::Debug for ExecutorRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExecutorRegistry")
            .field("executors", &self.names())
            .finish()
    }
}
