//! Deployment adapter and the `deploy` executor

use crate::adapters::{parse_params, CommandRunner, CommandSpec, ExecutorError, TaskExecutor, TaskOutput};
use crate::core::{context::RunContext, task::Task};
use async_trait::async_trait;
use serde::Deserialize;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

/// Container image to roll out on a workload
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ImageUpdate {
    /// Workload, e.g. `deployment/app`
    pub workload: String,
    pub container: String,
    pub image: String,
}

/// Cluster to deploy into
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeployTarget {
    pub namespace: Option<String>,
    pub kube_context: Option<String>,
}

/// Applies manifests and image updates to a cluster
#[async_trait]
pub trait Deployer: Send + Sync {
    async fn apply(
        &self,
        manifests: &[PathBuf],
        images: &[ImageUpdate],
        target: &DeployTarget,
    ) -> Result<String, ExecutorError>;
}

/// `Deployer` over the kubectl CLI
pub struct KubectlDeployer {
    runner: Arc<dyn CommandRunner>,
}

impl KubectlDeployer {
    pub fn new(runner: Arc<dyn CommandRunner>) -> Self {
        Self { runner }
    }

    fn kubectl(target: &DeployTarget) -> CommandSpec {
        let mut command = CommandSpec::new("kubectl");
        if let Some(context) = &target.kube_context {
            command = command.args(["--context", context.as_str()]);
        }
        if let Some(namespace) = &target.namespace {
            command = command.args(["--namespace", namespace.as_str()]);
        }
        command
    }
}

#[async_trait]
impl Deployer for KubectlDeployer {
    async fn apply(
        &self,
        manifests: &[PathBuf],
        images: &[ImageUpdate],
        target: &DeployTarget,
    ) -> Result<String, ExecutorError> {
        let mut output = String::new();

        for manifest in manifests {
            let command = Self::kubectl(target).args([
                "apply".to_string(),
                "--filename".to_string(),
                manifest.to_string_lossy().into_owned(),
            ]);
            output.push_str(&self.runner.run(&command).await?.stdout);
        }

        for update in images {
            let command = Self::kubectl(target).args([
                "set".to_string(),
                "image".to_string(),
                update.workload.clone(),
                format!("{}={}", update.container, update.image),
            ]);
            output.push_str(&self.runner.run(&command).await?.stdout);
        }

        Ok(output)
    }
}

#[derive(Debug, Deserialize)]
struct DeployParams {
    /// Manifest files or directories; `workspace:<name>/<path>` allowed
    manifests: Vec<String>,

    #[serde(default)]
    images: Vec<ImageUpdate>,

    #[serde(default)]
    namespace: Option<String>,

    #[serde(default)]
    kube_context: Option<String>,
}

/// `deploy`: apply manifests then roll out image updates
pub struct DeployExecutor {
    deployer: Arc<dyn Deployer>,
}

impl DeployExecutor {
    pub fn new(deployer: Arc<dyn Deployer>) -> Self {
        Self { deployer }
    }
}

#[async_trait]
impl TaskExecutor for DeployExecutor {
    async fn run(&self, task: &Task, ctx: &RunContext) -> Result<TaskOutput, ExecutorError> {
        let params: DeployParams = parse_params(task)?;
        if params.manifests.is_empty() {
            return Err(ExecutorError::InvalidParams(format!(
                "task '{}': at least one manifest is required",
                task.name
            )));
        }

        let manifests: Vec<PathBuf> = params
            .manifests
            .iter()
            .map(|m| ctx.resolve_dir(Some(m)))
            .collect();
        let target = DeployTarget {
            namespace: params.namespace,
            kube_context: params.kube_context,
        };

        let output = self.deployer.apply(&manifests, &params.images, &target).await?;
        info!(
            "Applied {} manifest(s), {} image update(s)",
            manifests.len(),
            params.images.len()
        );

        let mut result = TaskOutput::new(output);
        if let Some(first) = params.images.first() {
            result = result.with_artifact(first.image.clone());
        }
        Ok(result)
    }
}
