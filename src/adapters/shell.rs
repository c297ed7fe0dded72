//! `shell` executor - runs a script through a shell

use crate::adapters::{parse_params, CommandRunner, CommandSpec, ExecutorError, TaskExecutor, TaskOutput};
use crate::core::{context::RunContext, task::Task};
use async_trait::async_trait;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Output lines of this form become task exports
const EXPORT_MARKER: &str = "::export ";

#[derive(Debug, Deserialize)]
struct ShellParams {
    run: String,

    /// `workspace:<name>`, relative, or absolute
    #[serde(default)]
    working_directory: Option<String>,

    #[serde(default)]
    env: BTreeMap<String, String>,

    /// Environment variables filled from named secrets
    #[serde(default)]
    secret_env: BTreeMap<String, String>,

    #[serde(default = "default_shell")]
    shell: String,
}

fn default_shell() -> String {
    "sh".to_string()
}

pub struct ShellExecutor {
    runner: Arc<dyn CommandRunner>,
}

impl ShellExecutor {
    pub fn new(runner: Arc<dyn CommandRunner>) -> Self {
        Self { runner }
    }
}

#[async_trait]
impl TaskExecutor for ShellExecutor {
    async fn run(&self, task: &Task, ctx: &RunContext) -> Result<TaskOutput, ExecutorError> {
        let params: ShellParams = parse_params(task)?;

        let mut command = CommandSpec::new(&params.shell)
            .args(["-c", params.run.as_str()])
            .current_dir(ctx.resolve_dir(params.working_directory.as_deref()));
        for (key, value) in &params.env {
            command = command.env(key, value);
        }
        for (key, secret_name) in &params.secret_env {
            let secret = ctx
                .secret(secret_name)
                .ok_or_else(|| ExecutorError::MissingSecret(secret_name.clone()))?;
            command = command.env(key, secret.expose());
        }

        let output = self.runner.run(&command).await?;

        let mut result = TaskOutput::new(output.stdout.clone());
        for line in output.stdout.lines() {
            if let Some((key, value)) = line
                .strip_prefix(EXPORT_MARKER)
                .and_then(|rest| rest.split_once('='))
            {
                result = result.with_export(key.trim(), value.trim());
            }
        }
        Ok(result)
    }
}
