//! Container registry adapter and the `image-build` / `image-push`
//! executors

use crate::adapters::{parse_params, CommandRunner, CommandSpec, ExecutorError, TaskExecutor, TaskOutput};
use crate::core::{context::RunContext, event::short_sha, secrets::SecretValue, task::Task};
use async_trait::async_trait;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;

pub const LATEST_TAG: &str = "latest";

/// Tags applied to every pushed image: `latest` and the 7-char commit prefix
pub fn image_tags(commit_sha: &str) -> Vec<String> {
    vec![LATEST_TAG.to_string(), short_sha(commit_sha).to_string()]
}

/// Registry host of an image reference (`docker.io` when none is given)
pub fn registry_host(image: &str) -> &str {
    match image.split_once('/') {
        Some((host, _)) if host.contains('.') || host.contains(':') || host == "localhost" => host,
        _ => "docker.io",
    }
}

/// Builds and publishes container images
#[async_trait]
pub trait ContainerRegistry: Send + Sync {
    async fn login(
        &self,
        registry: &str,
        username: &str,
        password: &SecretValue,
    ) -> Result<(), ExecutorError>;

    /// Build `context` into `image`, returning the image reference
    async fn build(
        &self,
        context: &Path,
        dockerfile: Option<&Path>,
        image: &str,
    ) -> Result<String, ExecutorError>;

    /// Push `image` under each tag, returning the pushed references
    async fn push(&self, image: &str, tags: &[String]) -> Result<Vec<String>, ExecutorError>;
}

/// `ContainerRegistry` over the docker CLI
pub struct DockerCli {
    runner: Arc<dyn CommandRunner>,
}

impl DockerCli {
    pub fn new(runner: Arc<dyn CommandRunner>) -> Self {
        Self { runner }
    }

    fn docker() -> CommandSpec {
        CommandSpec::new("docker")
    }
}

#[async_trait]
impl ContainerRegistry for DockerCli {
    async fn login(
        &self,
        registry: &str,
        username: &str,
        password: &SecretValue,
    ) -> Result<(), ExecutorError> {
        let command = Self::docker()
            .args(["login", registry, "--username", username, "--password-stdin"])
            .stdin(password.expose());
        self.runner.run(&command).await?;
        Ok(())
    }

    async fn build(
        &self,
        context: &Path,
        dockerfile: Option<&Path>,
        image: &str,
    ) -> Result<String, ExecutorError> {
        let mut command = Self::docker().args(["build", "--tag", image]);
        if let Some(dockerfile) = dockerfile {
            command = command.args(["--file".to_string(), dockerfile.to_string_lossy().into_owned()]);
        }
        command = command.arg(context.to_string_lossy().into_owned());
        self.runner.run(&command).await?;
        Ok(image.to_string())
    }

    async fn push(&self, image: &str, tags: &[String]) -> Result<Vec<String>, ExecutorError> {
        let mut pushed = Vec::with_capacity(tags.len());
        for tag in tags {
            let tagged = format!("{}:{}", image, tag);
            self.runner
                .run(&Self::docker().args(["tag", image, tagged.as_str()]))
                .await?;
            self.runner
                .run(&Self::docker().args(["push", tagged.as_str()]))
                .await?;
            pushed.push(tagged);
        }
        Ok(pushed)
    }
}

#[derive(Debug, Deserialize)]
struct BuildParams {
    image: String,

    #[serde(default)]
    context: Option<String>,

    #[serde(default)]
    dockerfile: Option<String>,
}

/// `image-build`: build an image from a context directory
pub struct ImageBuildExecutor {
    registry: Arc<dyn ContainerRegistry>,
}

impl ImageBuildExecutor {
    pub fn new(registry: Arc<dyn ContainerRegistry>) -> Self {
        Self { registry }
    }
}

#[async_trait]
impl TaskExecutor for ImageBuildExecutor {
    async fn run(&self, task: &Task, ctx: &RunContext) -> Result<TaskOutput, ExecutorError> {
        let params: BuildParams = parse_params(task)?;
        let context = ctx.resolve_dir(params.context.as_deref());
        let dockerfile: Option<PathBuf> = params
            .dockerfile
            .as_deref()
            .map(|file| ctx.resolve_dir(Some(file)));

        let image_ref = self
            .registry
            .build(&context, dockerfile.as_deref(), &params.image)
            .await?;
        info!("Built image {}", image_ref);

        Ok(TaskOutput::new(format!("built {}", image_ref))
            .with_artifact(image_ref.clone())
            .with_export("image", image_ref))
    }
}

#[derive(Debug, Deserialize)]
struct PushParams {
    image: String,

    /// Registry host, derived from the image when absent
    #[serde(default)]
    registry: Option<String>,

    #[serde(default)]
    username: Option<String>,

    /// Secret holding the registry password
    #[serde(default)]
    password_secret: Option<String>,
}

/// `image-push`: log in if credentials are given, then push the image
/// tagged `latest` and with the short commit SHA
pub struct ImagePushExecutor {
    registry: Arc<dyn ContainerRegistry>,
}

impl ImagePushExecutor {
    pub fn new(registry: Arc<dyn ContainerRegistry>) -> Self {
        Self { registry }
    }
}

#[async_trait]
impl TaskExecutor for ImagePushExecutor {
    async fn run(&self, task: &Task, ctx: &RunContext) -> Result<TaskOutput, ExecutorError> {
        let params: PushParams = parse_params(task)?;

        if let (Some(username), Some(secret_name)) = (&params.username, &params.password_secret) {
            let password = ctx
                .secret(secret_name)
                .ok_or_else(|| ExecutorError::MissingSecret(secret_name.clone()))?;
            let registry = params
                .registry
                .as_deref()
                .unwrap_or_else(|| registry_host(&params.image));
            self.registry.login(registry, username, &password).await?;
        }

        let tags = image_tags(&ctx.event.commit_sha);
        let pushed = self.registry.push(&params.image, &tags).await?;
        info!("Pushed {}", pushed.join(", "));

        let sha_ref = format!("{}:{}", params.image, ctx.event.short_sha());
        Ok(TaskOutput::new(pushed.join("\n"))
            .with_artifact(sha_ref.clone())
            .with_export("image_ref", sha_ref)
            .with_export("tags", tags.join(",")))
    }
}
