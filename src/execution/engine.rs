//! Pipeline executor - runs the stages of one run in order

use crate::{
    adapters::ExecutorRegistry,
    cache::CacheStore,
    core::{
        condition::RunView,
        context::RunContext,
        run::Run,
        secrets::SecretResolver,
        stage::{Stage, StageKind},
        state::{RunStatus, StageResult, StageStatus, TaskResult, TaskStatus},
        Pipeline,
    },
    execution::{cancellation::CancellationToken, runner::TaskRunner},
    notify::{DeliveryStatus, Notifier},
};
use chrono::Utc;
use parking_lot::RwLock;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

/// Events that can occur during a run
#[derive(Debug, Clone)]
pub enum ExecutionEvent {
    RunStarted {
        run_id: Uuid,
        pipeline_name: String,
    },
    StageStarted {
        run_id: Uuid,
        stage_name: String,
    },
    StageSkipped {
        run_id: Uuid,
        stage_name: String,
        reason: String,
    },
    StageCompleted {
        run_id: Uuid,
        stage_name: String,
        status: StageStatus,
    },
    TaskStarted {
        task_name: String,
    },
    TaskRetrying {
        task_name: String,
        attempt: usize,
        max_attempts: usize,
        error: String,
    },
    TaskCompleted {
        task_name: String,
        cache_hit: bool,
        output: String,
    },
    TaskFailed {
        task_name: String,
        error: String,
    },
    TaskSkipped {
        task_name: String,
        reason: String,
    },
    NotificationSent {
        run_id: Uuid,
        channel: String,
    },
    NotificationFailed {
        run_id: Uuid,
        channel: String,
        error: String,
    },
    RunCompleted {
        run_id: Uuid,
        pipeline_name: String,
        status: RunStatus,
    },
}

/// Type for event handlers
pub type EventHandler = Arc<dyn Fn(&ExecutionEvent) + Send + Sync>;

/// Fan-out of execution events to registered handlers
#[derive(Clone, Default)]
pub struct EventEmitter {
    handlers: Arc<RwLock<Vec<EventHandler>>>,
}

impl EventEmitter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an event handler
    pub fn subscribe<F>(&self, handler: F)
    where
        F: Fn(&ExecutionEvent) + Send + Sync + 'static,
    {
        self.handlers.write().push(Arc::new(handler));
    }

    /// Emit an event to all handlers
    pub fn emit(&self, event: ExecutionEvent) {
        let handlers = self.handlers.read().clone();
        for handler in handlers.iter() {
            handler(&event);
        }
    }
}

/// Executes runs: stages in declaration order, tasks in order with
/// fail-fast, then the notify stage exactly once.
pub struct PipelineExecutor {
    runner: TaskRunner,
    notifier: Notifier,
    secrets: Arc<dyn SecretResolver>,
    workdir: PathBuf,
    events: EventEmitter,
}

impl PipelineExecutor {
    pub fn new(
        registry: ExecutorRegistry,
        cache: Arc<dyn CacheStore>,
        notifier: Notifier,
        secrets: Arc<dyn SecretResolver>,
        workdir: impl Into<PathBuf>,
    ) -> Self {
        let events = EventEmitter::new();
        Self {
            runner: TaskRunner::new(registry, cache, events.clone()),
            notifier,
            secrets,
            workdir: workdir.into(),
            events,
        }
    }

    /// Add an event handler
    pub fn add_event_handler<F>(&self, handler: F)
    where
        F: Fn(&ExecutionEvent) + Send + Sync + 'static,
    {
        self.events.subscribe(handler);
    }

    pub fn registry(&self) -> &ExecutorRegistry {
        self.runner.registry()
    }

    pub fn cache(&self) -> &Arc<dyn CacheStore> {
        self.runner.cache()
    }

    /// Execute `run` against `pipeline` and return it in a terminal state.
    ///
    /// Failures below the run are recorded as stage and task results. The
    /// overall status is decided before the notify stage runs; the notify
    /// stage itself never changes it.
    pub async fn execute(&self, pipeline: &Pipeline, mut run: Run, cancel: &CancellationToken) -> Run {
        info!("Starting run {} of pipeline {}", run.id, pipeline.name);
        run.start();
        self.events.emit(ExecutionEvent::RunStarted {
            run_id: run.id,
            pipeline_name: pipeline.name.clone(),
        });

        let mut ctx = RunContext::new(&run, pipeline, &self.workdir, self.secrets.clone());
        let mut halted: Option<String> = None;
        let mut blocked = false;
        let mut cancelled = false;

        for stage in pipeline.stages().iter().filter(|s| !s.is_notify()) {
            if halted.is_none() && cancel.is_cancelled() {
                cancelled = true;
                halted = Some(format!(
                    "run cancelled: {}",
                    cancel.reason().unwrap_or_else(|| "no reason given".to_string())
                ));
            }

            if let Some(reason) = &halted {
                self.skip_stage(&mut run, stage, reason.clone());
                continue;
            }

            let view = RunView {
                event: &run.triggering_event,
                prior_stages: &run.stage_results,
            };
            if !stage.run_condition.evaluate(&view) {
                let reason = format!("condition {} not met", stage.run_condition.describe());
                self.skip_stage(&mut run, stage, reason);
                if stage.blocking {
                    warn!("Blocking stage {} was skipped, halting run {}", stage.name, run.id);
                    blocked = true;
                    halted = Some(format!("blocking stage '{}' did not run", stage.name));
                }
                continue;
            }

            let (result, saw_cancel) = self.run_stage(&run, stage, &mut ctx, cancel).await;
            if saw_cancel {
                cancelled = true;
                halted = Some(format!(
                    "run cancelled: {}",
                    cancel.reason().unwrap_or_else(|| "no reason given".to_string())
                ));
            }
            if result.status == StageStatus::Failure && stage.blocking {
                warn!("Blocking stage {} failed, halting run {}", stage.name, run.id);
                blocked = true;
                halted = Some(format!("blocking stage '{}' failed", stage.name));
            }
            run.stage_results.push(result);
        }

        // Boundary before the notify stage: a cancel that landed during the
        // last task still makes the run cancelled
        if !cancelled && cancel.is_cancelled() {
            info!(
                "Run {} cancelled before notification: {}",
                run.id,
                cancel.reason().unwrap_or_else(|| "no reason given".to_string())
            );
            cancelled = true;
        }

        let status = if cancelled {
            RunStatus::Cancelled
        } else if blocked || run.has_failed_stage() {
            RunStatus::Failure
        } else {
            RunStatus::Success
        };
        run.overall_status = status;

        if let Some(stage) = pipeline.notify_stage() {
            let result = self.run_notify_stage(&run, stage).await;
            run.stage_results.push(result);
        }

        run.finish(status);
        info!("Run {} of pipeline {} finished: {}", run.id, pipeline.name, status.as_str());
        self.events.emit(ExecutionEvent::RunCompleted {
            run_id: run.id,
            pipeline_name: pipeline.name.clone(),
            status,
        });
        run
    }

    fn skip_stage(&self, run: &mut Run, stage: &Stage, reason: String) {
        info!("Skipping stage {}: {}", stage.name, reason);
        self.events.emit(ExecutionEvent::StageSkipped {
            run_id: run.id,
            stage_name: stage.name.clone(),
            reason: reason.clone(),
        });
        run.stage_results
            .push(StageResult::skipped(&stage.name, stage.task_names(), reason));
    }

    /// Run the tasks of one stage. Returns the result and whether a
    /// cancellation checkpoint was hit.
    async fn run_stage(
        &self,
        run: &Run,
        stage: &Stage,
        ctx: &mut RunContext,
        cancel: &CancellationToken,
    ) -> (StageResult, bool) {
        info!("Running stage {}", stage.name);
        self.events.emit(ExecutionEvent::StageStarted {
            run_id: run.id,
            stage_name: stage.name.clone(),
        });

        let started_at = Utc::now();
        let mut tasks = Vec::with_capacity(stage.tasks.len());
        let mut skip_reason: Option<String> = None;
        let mut saw_cancel = false;

        for task in &stage.tasks {
            if skip_reason.is_none() && cancel.is_cancelled() {
                saw_cancel = true;
                skip_reason = Some("run cancelled".to_string());
            }

            if let Some(reason) = &skip_reason {
                self.events.emit(ExecutionEvent::TaskSkipped {
                    task_name: task.name.clone(),
                    reason: reason.clone(),
                });
                tasks.push(TaskResult::skipped(&task.name, reason.clone()));
                continue;
            }

            self.events.emit(ExecutionEvent::TaskStarted {
                task_name: task.name.clone(),
            });
            let result = self.runner.run(task, ctx).await;
            match result.status {
                TaskStatus::Failure => {
                    self.events.emit(ExecutionEvent::TaskFailed {
                        task_name: task.name.clone(),
                        error: result.output.clone(),
                    });
                    skip_reason = Some(format!("earlier task '{}' failed", task.name));
                }
                _ => self.events.emit(ExecutionEvent::TaskCompleted {
                    task_name: task.name.clone(),
                    cache_hit: result.cache_hit,
                    output: result.output.clone(),
                }),
            }
            tasks.push(result);
        }

        let status = if tasks.iter().any(|t| t.status == TaskStatus::Failure) {
            StageStatus::Failure
        } else if !tasks.is_empty() && tasks.iter().all(|t| t.status == TaskStatus::Skipped) {
            StageStatus::Skipped
        } else {
            StageStatus::Success
        };

        self.events.emit(ExecutionEvent::StageCompleted {
            run_id: run.id,
            stage_name: stage.name.clone(),
            status,
        });

        let stage_skip_reason = (status == StageStatus::Skipped).then(|| skip_reason.clone()).flatten();
        (
            StageResult {
                stage_name: stage.name.clone(),
                kind: StageKind::Standard,
                status,
                tasks,
                skip_reason: stage_skip_reason,
                started_at,
                ended_at: Utc::now(),
            },
            saw_cancel,
        )
    }

    async fn run_notify_stage(&self, run: &Run, stage: &Stage) -> StageResult {
        self.events.emit(ExecutionEvent::StageStarted {
            run_id: run.id,
            stage_name: stage.name.clone(),
        });
        let started_at = Utc::now();

        let (status, task) = match self.notifier.notify(run, self.secrets.as_ref()).await {
            DeliveryStatus::Delivered { channel } => {
                self.events.emit(ExecutionEvent::NotificationSent {
                    run_id: run.id,
                    channel: channel.clone(),
                });
                (
                    StageStatus::Success,
                    TaskResult::success(&stage.name, format!("delivered via {}", channel), 1),
                )
            }
            DeliveryStatus::Failed { channel, error } => {
                self.events.emit(ExecutionEvent::NotificationFailed {
                    run_id: run.id,
                    channel,
                    error: error.clone(),
                });
                (StageStatus::Failure, TaskResult::failure(&stage.name, error, 1))
            }
        };

        self.events.emit(ExecutionEvent::StageCompleted {
            run_id: run.id,
            stage_name: stage.name.clone(),
            status,
        });

        StageResult {
            stage_name: stage.name.clone(),
            kind: StageKind::Notify,
            status,
            tasks: vec![task],
            skip_reason: None,
            started_at,
            ended_at: Utc::now(),
        }
    }
}
