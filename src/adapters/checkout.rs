//! `checkout` executor - multi-source checkout
//!
//! Each source becomes a named working directory exported as
//! `workspace.<name>`, so later tasks can address it as
//! `workspace:<name>` without relying on global filesystem layout.

use crate::adapters::{parse_params, CommandRunner, CommandSpec, ExecutorError, TaskExecutor, TaskOutput};
use crate::core::{context::RunContext, context::WORKSPACE_PREFIX, task::Task};
use async_trait::async_trait;
use serde::Deserialize;
use std::sync::Arc;
use tracing::info;

/// Repository name that refers to the triggering repository already
/// present in the workdir
pub const SELF_REPOSITORY: &str = "self";

/// Reads the token from the environment so it never appears in arguments
const CREDENTIAL_HELPER: &str =
    "credential.helper=!f() { echo username=x-access-token; echo \"password=$SHIPYARD_GIT_TOKEN\"; }; f";

#[derive(Debug, Clone, Deserialize)]
struct Source {
    name: String,

    #[serde(default = "default_repository")]
    repository: String,

    /// Defaults to the triggering commit for `self`, the remote HEAD otherwise
    #[serde(default, rename = "ref")]
    git_ref: Option<String>,

    /// Destination, defaults to the source name
    #[serde(default)]
    path: Option<String>,

    /// Secret holding a repository access token
    #[serde(default)]
    token_secret: Option<String>,
}

fn default_repository() -> String {
    SELF_REPOSITORY.to_string()
}

#[derive(Debug, Deserialize)]
struct CheckoutParams {
    #[serde(default)]
    sources: Vec<Source>,
}

pub struct CheckoutExecutor {
    runner: Arc<dyn CommandRunner>,
}

impl CheckoutExecutor {
    pub fn new(runner: Arc<dyn CommandRunner>) -> Self {
        Self { runner }
    }

    async fn checkout(&self, source: &Source, ctx: &RunContext) -> Result<String, ExecutorError> {
        if source.repository == SELF_REPOSITORY && source.path.is_none() {
            return Ok(ctx.workdir.to_string_lossy().into_owned());
        }

        let dest = ctx.resolve_dir(Some(source.path.as_deref().unwrap_or(&source.name)));
        let dest_str = dest.to_string_lossy().into_owned();
        let url = if source.repository == SELF_REPOSITORY {
            ctx.workdir.to_string_lossy().into_owned()
        } else {
            source.repository.clone()
        };

        let mut clone = CommandSpec::new("git");
        if let Some(secret_name) = &source.token_secret {
            let token = ctx
                .secret(secret_name)
                .ok_or_else(|| ExecutorError::MissingSecret(secret_name.clone()))?;
            clone = clone
                .args(["-c", CREDENTIAL_HELPER])
                .env("SHIPYARD_GIT_TOKEN", token.expose());
        }
        clone = clone.args(["clone", "--quiet", url.as_str(), dest_str.as_str()]);
        self.runner.run(&clone).await?;

        let git_ref = source.git_ref.clone().or_else(|| {
            (source.repository == SELF_REPOSITORY).then(|| ctx.event.commit_sha.clone())
        });
        if let Some(git_ref) = git_ref {
            let checkout = CommandSpec::new("git").args([
                "-C",
                dest_str.as_str(),
                "checkout",
                "--quiet",
                git_ref.as_str(),
            ]);
            self.runner.run(&checkout).await?;
        }

        Ok(dest_str)
    }
}

#[async_trait]
impl TaskExecutor for CheckoutExecutor {
    async fn run(&self, task: &Task, ctx: &RunContext) -> Result<TaskOutput, ExecutorError> {
        let mut params: CheckoutParams = parse_params(task)?;
        if params.sources.is_empty() {
            params.sources.push(Source {
                name: SELF_REPOSITORY.to_string(),
                repository: default_repository(),
                git_ref: None,
                path: None,
                token_secret: None,
            });
        }

        let mut output = TaskOutput::default();
        let mut lines = Vec::new();
        for source in &params.sources {
            let dir = self.checkout(source, ctx).await?;
            info!("Checked out {} ({}) into {}", source.name, source.repository, dir);
            lines.push(format!("{} -> {}", source.name, dir));
            output = output.with_export(format!("{}{}", WORKSPACE_PREFIX, source.name), dir);
        }
        output.output = lines.join("\n");
        Ok(output)
    }
}
