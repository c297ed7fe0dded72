//! Run context - per-run capabilities and shared values handed to task
//! executors

use crate::core::{
    event::Event,
    run::Run,
    secrets::{SecretResolver, SecretValue},
    Pipeline,
};
use serde_yaml::Value;
use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use uuid::Uuid;

/// Prefix of exports that name a working directory
pub const WORKSPACE_PREFIX: &str = "workspace.";

/// Execution context for one run.
///
/// Holds the values tasks may read (event data, variables, exports of
/// earlier tasks, named working directories) and the secret resolution
/// capability. It is never stored on the `Run` and never serialized.
#[derive(Clone)]
pub struct RunContext {
    pub run_id: Uuid,

    pub pipeline_name: String,

    pub event: Event,

    /// Default working directory
    pub workdir: PathBuf,

    /// Pipeline variables
    variables: HashMap<String, String>,

    /// Values exported by completed tasks
    exports: HashMap<String, String>,

    secrets: Arc<dyn SecretResolver>,
}

impl RunContext {
    /// Create the context for a run
    pub fn new(
        run: &Run,
        pipeline: &Pipeline,
        workdir: impl Into<PathBuf>,
        secrets: Arc<dyn SecretResolver>,
    ) -> Self {
        Self {
            run_id: run.id,
            pipeline_name: pipeline.name.clone(),
            event: run.triggering_event.clone(),
            workdir: workdir.into(),
            variables: pipeline.variables.clone(),
            exports: HashMap::new(),
            secrets,
        }
    }

    /// Record a value exported by a task.
    ///
    /// Keys under `workspace.` are global; anything else is namespaced as
    /// `<task>.<key>`.
    pub fn set_export(&mut self, task_name: &str, key: &str, value: impl Into<String>) {
        let full_key = if key.starts_with(WORKSPACE_PREFIX) {
            key.to_string()
        } else {
            format!("{}.{}", task_name, key)
        };
        self.exports.insert(full_key, value.into());
    }

    /// Get an exported value by its full key
    pub fn get_export(&self, key: &str) -> Option<&String> {
        self.exports.get(key)
    }

    /// Resolve a named working directory exposed by a checkout task
    pub fn workspace(&self, name: &str) -> Option<PathBuf> {
        self.exports
            .get(&format!("{}{}", WORKSPACE_PREFIX, name))
            .map(PathBuf::from)
    }

    /// Resolve a directory parameter: `workspace:<name>`, a path relative to
    /// the workdir, or an absolute path
    pub fn resolve_dir(&self, spec: Option<&str>) -> PathBuf {
        match spec {
            None => self.workdir.clone(),
            Some(spec) => match spec.strip_prefix("workspace:") {
                Some(rest) => {
                    let (name, sub) = rest.split_once('/').unwrap_or((rest, ""));
                    let root = self
                        .workspace(name)
                        .unwrap_or_else(|| self.workdir.join(name));
                    if sub.is_empty() {
                        root
                    } else {
                        root.join(sub)
                    }
                }
                None => {
                    let path = Path::new(spec);
                    if path.is_absolute() {
                        path.to_path_buf()
                    } else {
                        self.workdir.join(path)
                    }
                }
            },
        }
    }

    /// Resolve a named secret
    pub fn secret(&self, name: &str) -> Option<SecretValue> {
        self.secrets.resolve(name)
    }

    /// Get all variables available for parameter rendering
    pub fn get_rendering_variables(&self) -> HashMap<String, String> {
        let mut vars = self.variables.clone();

        vars.insert("event.ref".to_string(), self.event.git_ref.clone());
        vars.insert("event.branch".to_string(), self.event.branch().to_string());
        vars.insert("event.sha".to_string(), self.event.commit_sha.clone());
        vars.insert("event.short_sha".to_string(), self.event.short_sha().to_string());
        vars.insert("event.kind".to_string(), self.event.originating_kind().to_string());
        vars.insert("run.id".to_string(), self.run_id.to_string());
        vars.insert("pipeline.name".to_string(), self.pipeline_name.clone());

        if let Some(pr) = &self.event.pr {
            vars.insert("pr.number".to_string(), pr.number.to_string());
            vars.insert("pr.source_ref".to_string(), pr.source_ref.clone());
        }

        vars.extend(self.exports.clone());
        vars
    }

    /// Render `{{ name }}` placeholders in a string
    pub fn render(&self, template: &str) -> String {
        let mut rendered = template.to_string();

        for (key, value) in self.get_rendering_variables() {
            let placeholder = format!("{{{{ {} }}}}", key);
            rendered = rendered.replace(&placeholder, &value);
        }

        rendered
    }

    /// Render every string inside a parameter value
    pub fn render_value(&self, value: &Value) -> Value {
        match value {
            Value::String(s) => Value::String(self.render(s)),
            Value::Sequence(items) => {
                Value::Sequence(items.iter().map(|v| self.render_value(v)).collect())
            }
            Value::Mapping(map) => Value::Mapping(
                map.iter()
                    .map(|(k, v)| (k.clone(), self.render_value(v)))
                    .collect(),
            ),
            other => other.clone(),
        }
    }
}

impl fmt::Debug for RunContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RunContext")
            .field("run_id", &self.run_id)
            .field("pipeline_name", &self.pipeline_name)
            .field("workdir", &self.workdir)
            .field("variables", &self.variables)
            .field("exports", &self.exports)
            .finish_non_exhaustive()
    }
}
