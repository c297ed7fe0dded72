//! Test doubles and harness for scenario tests

use async_trait::async_trait;
use parking_lot::Mutex;
use shipyard::adapters::{
    CommandOutput, CommandRunner, CommandSpec, ExecutorError, ExecutorRegistry, TaskExecutor,
    TaskOutput,
};
use shipyard::cache::InMemoryCacheStore;
use shipyard::core::{
    config::OrchestratorConfig,
    context::RunContext,
    event::{Event, PrMetadata},
    secrets::{SecretResolver, StaticSecrets},
    Run, RunStatus, StageStatus, Task, TaskStatus,
};
use shipyard::execution::{ExecutionEvent, Orchestrator, PipelineExecutor};
use shipyard::notify::{NotificationChannel, NotificationPayload, NotifyError, Notifier};
use shipyard::persistence::InMemoryHistory;
use shipyard::Pipeline;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

pub const SHA: &str = "a1b2c3d4e5f60718293a4b5c6d7e8f9012345678";

/// Gate-then-deploy configuration used by most scenarios
pub const GATE_THEN_DEPLOY: &str = r#"
pipelines:
  - name: "lint"
    on:
      push:
        branches: ["main"]
      pull_request: {}
    stages:
      - name: "lint"
        blocking: true
        tasks:
          - name: "install-deps"
            uses: "scripted"
            with:
              run: "poetry install"
            cache:
              scope: "deps"
              files: ["poetry.lock"]
              tool_version: "poetry-1.1"
          - name: "run-linters"
            uses: "scripted"
            with:
              run: "pre-commit run --all-files"

  - name: "build"
    on:
      workflow_run:
        workflows: ["lint"]
    stages:
      - name: "build"
        tasks:
          - name: "build-image"
            uses: "image-build"
            with:
              image: "ghcr.io/org/app"
          - name: "push-image"
            uses: "image-push"
            with:
              image: "ghcr.io/org/app"
              username: "bot"
              password_secret: "registry_password"
      - name: "deploy"
        tasks:
          - name: "deploy"
            uses: "deploy"
            with:
              manifests: ["k8s/app.yaml"]
              namespace: "production"
              images:
                - workload: "deployment/app"
                  container: "app"
                  image: "{{ push-image.image_ref }}"
"#;

pub fn push_event() -> Event {
    Event::push("refs/heads/main", SHA)
}

pub fn pr_event() -> Event {
    Event::pull_request(
        "refs/pull/42/merge",
        SHA,
        PrMetadata {
            number: 42,
            title: "Tighten lint rules".to_string(),
            author: "octocat".to_string(),
            source_ref: "feature/lint".to_string(),
        },
    )
}

/// What a scripted task does when invoked
#[derive(Debug, Clone)]
pub enum Script {
    Succeed,
    Fail(String),
    /// Fail this many times, then succeed
    FailTimes(usize),
    Sleep(Duration),
    Export(String, String),
}

/// Executor whose behaviour is scripted per task name. Unscripted tasks
/// succeed.
#[derive(Default)]
pub struct ScriptedExecutor {
    scripts: Mutex<HashMap<String, Script>>,
    calls: Mutex<Vec<(String, String)>>,
}

impl ScriptedExecutor {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn script(&self, task_name: &str, script: Script) {
        self.scripts.lock().insert(task_name.to_string(), script);
    }

    /// Invoked task names, in order
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().iter().map(|(name, _)| name.clone()).collect()
    }

    pub fn call_count(&self, task_name: &str) -> usize {
        self.calls.lock().iter().filter(|(name, _)| name == task_name).count()
    }

    /// Rendered `run` parameter of each invocation
    pub fn rendered(&self, task_name: &str) -> Vec<String> {
        self.calls
            .lock()
            .iter()
            .filter(|(name, _)| name == task_name)
            .map(|(_, run)| run.clone())
            .collect()
    }
}

#[async_trait]
impl TaskExecutor for ScriptedExecutor {
    async fn run(&self, task: &Task, _ctx: &RunContext) -> Result<TaskOutput, ExecutorError> {
        let attempt = {
            let mut calls = self.calls.lock();
            calls.push((
                task.name.clone(),
                task.param_str("run").unwrap_or_default().to_string(),
            ));
            calls.iter().filter(|(name, _)| *name == task.name).count()
        };
        let script = self
            .scripts
            .lock()
            .get(&task.name)
            .cloned()
            .unwrap_or(Script::Succeed);

        match script {
            Script::Succeed => Ok(TaskOutput::new(format!("{} ok", task.name))),
            Script::Fail(message) => Err(ExecutorError::Failed(message)),
            Script::FailTimes(n) if attempt <= n => {
                Err(ExecutorError::Failed(format!("{} flaked ({})", task.name, attempt)))
            }
            Script::FailTimes(_) => Ok(TaskOutput::new(format!("{} ok", task.name))),
            Script::Sleep(duration) => {
                tokio::time::sleep(duration).await;
                Ok(TaskOutput::new(format!("{} ok", task.name)))
            }
            Script::Export(key, value) => {
                Ok(TaskOutput::new(format!("{} ok", task.name)).with_export(key, value))
            }
        }
    }
}

/// Command runner that records command lines instead of spawning them
#[derive(Default)]
pub struct RecordingRunner {
    commands: Mutex<Vec<CommandSpec>>,
    failing: Mutex<Vec<String>>,
}

impl RecordingRunner {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Fail commands whose line starts with `prefix`
    pub fn fail_on(&self, prefix: &str) {
        self.failing.lock().push(prefix.to_string());
    }

    pub fn lines(&self) -> Vec<String> {
        self.commands.lock().iter().map(|c| c.to_string()).collect()
    }

    pub fn stdin_of(&self, prefix: &str) -> Option<String> {
        self.commands
            .lock()
            .iter()
            .find(|c| c.to_string().starts_with(prefix))
            .and_then(|c| c.stdin.clone())
    }
}

#[async_trait]
impl CommandRunner for RecordingRunner {
    async fn run(&self, spec: &CommandSpec) -> Result<CommandOutput, ExecutorError> {
        self.commands.lock().push(spec.clone());
        let line = spec.to_string();
        if self.failing.lock().iter().any(|prefix| line.starts_with(prefix.as_str())) {
            return Err(ExecutorError::CommandFailed {
                command: line,
                code: 1,
                stderr: "simulated failure".to_string(),
            });
        }
        Ok(CommandOutput {
            code: 0,
            stdout: String::new(),
            stderr: String::new(),
        })
    }
}

/// Notification channel that keeps every payload it receives
#[derive(Default)]
pub struct RecordingChannel {
    payloads: Mutex<Vec<NotificationPayload>>,
    fail: bool,
}

impl RecordingChannel {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// A channel that records, then rejects every delivery
    pub fn rejecting() -> Arc<Self> {
        Arc::new(Self {
            payloads: Mutex::new(Vec::new()),
            fail: true,
        })
    }

    pub fn payloads(&self) -> Vec<NotificationPayload> {
        self.payloads.lock().clone()
    }

    pub fn for_pipeline(&self, pipeline: &str) -> Vec<NotificationPayload> {
        self.payloads()
            .into_iter()
            .filter(|p| p.pipeline == pipeline)
            .collect()
    }
}

#[async_trait]
impl NotificationChannel for RecordingChannel {
    fn name(&self) -> &str {
        "recording"
    }

    async fn deliver(
        &self,
        payload: &NotificationPayload,
        _secrets: &dyn SecretResolver,
    ) -> Result<(), NotifyError> {
        self.payloads.lock().push(payload.clone());
        if self.fail {
            return Err(NotifyError::Rejected(503));
        }
        Ok(())
    }
}

/// Orchestrator wired to test doubles
pub struct Harness {
    pub orchestrator: Orchestrator,
    pub scripted: Arc<ScriptedExecutor>,
    pub runner: Arc<RecordingRunner>,
    pub channel: Arc<RecordingChannel>,
    pub cache: Arc<InMemoryCacheStore>,
    pub history: Arc<InMemoryHistory>,
    pub events: Arc<Mutex<Vec<ExecutionEvent>>>,
}

pub struct HarnessBuilder {
    pipelines: Vec<Pipeline>,
    workdir: PathBuf,
    channel: Arc<RecordingChannel>,
    cache: Arc<InMemoryCacheStore>,
    redelivery_window: Option<usize>,
}

impl HarnessBuilder {
    pub fn workdir(mut self, workdir: &Path) -> Self {
        self.workdir = workdir.to_path_buf();
        self
    }

    pub fn channel(mut self, channel: Arc<RecordingChannel>) -> Self {
        self.channel = channel;
        self
    }

    /// Share a cache with another harness
    pub fn cache(mut self, cache: Arc<InMemoryCacheStore>) -> Self {
        self.cache = cache;
        self
    }

    pub fn redelivery_window(mut self, capacity: usize) -> Self {
        self.redelivery_window = Some(capacity);
        self
    }

    pub fn build(self) -> Harness {
        let scripted = ScriptedExecutor::new();
        let runner = RecordingRunner::new();

        let mut registry = ExecutorRegistry::with_defaults(runner.clone());
        registry.register("scripted", scripted.clone());
        registry
            .check_pipelines(&self.pipelines)
            .expect("pipelines reference registered executors");

        let secrets: Arc<dyn SecretResolver> =
            Arc::new(StaticSecrets::new().with("registry_password", "hunter2"));
        let executor = PipelineExecutor::new(
            registry,
            self.cache.clone(),
            Notifier::new(self.channel.clone()),
            secrets,
            self.workdir,
        );

        let events = Arc::new(Mutex::new(Vec::new()));
        let sink = events.clone();
        executor.add_event_handler(move |event| sink.lock().push(event.clone()));

        let history = Arc::new(InMemoryHistory::new());
        let mut orchestrator =
            Orchestrator::new(self.pipelines, executor).with_history(history.clone());
        if let Some(capacity) = self.redelivery_window {
            orchestrator = orchestrator.with_redelivery_window(capacity);
        }

        Harness {
            orchestrator,
            scripted,
            runner,
            channel: self.channel,
            cache: self.cache,
            history,
            events,
        }
    }
}

impl Harness {
    pub fn builder(pipelines: Vec<Pipeline>) -> HarnessBuilder {
        HarnessBuilder {
            pipelines,
            workdir: PathBuf::from("/work"),
            channel: RecordingChannel::new(),
            cache: Arc::new(InMemoryCacheStore::new()),
            redelivery_window: None,
        }
    }

    pub fn from_yaml(yaml: &str) -> HarnessBuilder {
        let config = OrchestratorConfig::from_yaml(yaml).expect("valid configuration");
        Self::builder(config.to_pipelines())
    }

    pub fn gate_then_deploy() -> Self {
        Self::from_yaml(GATE_THEN_DEPLOY).build()
    }
}

/// The single run of `pipeline` in `runs`
pub fn run_of<'a>(runs: &'a [Run], pipeline: &str) -> &'a Run {
    let matching: Vec<&Run> = runs.iter().filter(|r| r.pipeline_name == pipeline).collect();
    assert_eq!(matching.len(), 1, "expected exactly one run of {}", pipeline);
    matching[0]
}

pub fn assert_run_status(run: &Run, status: RunStatus) {
    assert_eq!(
        run.overall_status, status,
        "run of {} ended {:?}, stages: {:#?}",
        run.pipeline_name, run.overall_status, run.stage_results
    );
}

pub fn assert_stage(run: &Run, stage: &str, status: StageStatus) {
    let result = run
        .stage(stage)
        .unwrap_or_else(|| panic!("stage {} not recorded", stage));
    assert_eq!(result.status, status, "stage {}: {:#?}", stage, result);
}

pub fn assert_task(run: &Run, stage: &str, task: &str, status: TaskStatus) {
    let result = run
        .stage(stage)
        .and_then(|s| s.task(task))
        .unwrap_or_else(|| panic!("task {}/{} not recorded", stage, task));
    assert_eq!(result.status, status, "task {}: {:#?}", task, result);
}
