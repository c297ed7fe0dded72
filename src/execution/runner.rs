//! Task runner - cache lookup, bounded adapter invocation, retries

use crate::{
    adapters::{ExecutorRegistry, TaskOutput},
    cache::{CacheEntry, CacheKey, CacheStore},
    core::{context::RunContext, state::TaskResult, task::Task},
    execution::engine::{EventEmitter, ExecutionEvent},
};
use chrono::Utc;
use futures::FutureExt;
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tokio::time::timeout;
use tracing::{debug, error, info, warn};

/// Runs single tasks on behalf of the pipeline executor.
///
/// Every failure mode (adapter error, timeout, panic, unknown executor) is
/// normalized into a failed `TaskResult`; nothing escapes as an error.
pub struct TaskRunner {
    registry: ExecutorRegistry,
    cache: Arc<dyn CacheStore>,
    events: EventEmitter,
}

impl TaskRunner {
    pub fn new(registry: ExecutorRegistry, cache: Arc<dyn CacheStore>, events: EventEmitter) -> Self {
        Self {
            registry,
            cache,
            events,
        }
    }

    pub fn registry(&self) -> &ExecutorRegistry {
        &self.registry
    }

    pub fn cache(&self) -> &Arc<dyn CacheStore> {
        &self.cache
    }

    /// Run `task` in `ctx`, merging its exports into the context on success
    pub async fn run(&self, task: &Task, ctx: &mut RunContext) -> TaskResult {
        let executor = match self.registry.get(&task.executor_ref) {
            Some(executor) => executor,
            None => {
                error!("Task {} uses unknown executor {}", task.name, task.executor_ref);
                return TaskResult::failure(
                    &task.name,
                    format!("unknown executor '{}'", task.executor_ref),
                    0,
                );
            }
        };

        let rendered = task.clone().with_params(ctx.render_value(&task.params));

        let key = self.cache_key(task, ctx).await;
        if let Some(key) = &key {
            if let Some(entry) = self.lookup(key).await {
                info!("Cache hit for task {} ({})", task.name, key);
                for (k, v) in &entry.exports {
                    ctx.set_export(&task.name, k, v.clone());
                }
                return TaskResult::cached(&task.name, entry.output);
            }
            debug!("Cache miss for task {} ({})", task.name, key);
        }

        let policy = &task.retry_policy;
        let max_attempts = policy.attempts();
        let mut attempt = 1;
        loop {
            let invocation = AssertUnwindSafe(executor.run(&rendered, ctx)).catch_unwind();
            let outcome = match timeout(task.timeout(), invocation).await {
                Ok(Ok(Ok(output))) => Ok(output),
                Ok(Ok(Err(e))) => Err(e.to_string()),
                Ok(Err(panic)) => Err(format!("executor panicked: {}", panic_message(panic.as_ref()))),
                Err(_) => Err(format!("timed out after {} seconds", task.timeout_secs)),
            };

            match outcome {
                Ok(output) => {
                    self.record_success(task, ctx, key.as_ref(), &output).await;
                    return TaskResult::success(&task.name, output.output, attempt);
                }
                Err(error) if policy.should_retry(attempt) => {
                    let delay = policy.backoff.delay(attempt);
                    warn!(
                        "Task {} failed on attempt {}/{}: {} (retrying in {:?})",
                        task.name, attempt, max_attempts, error, delay
                    );
                    self.events.emit(ExecutionEvent::TaskRetrying {
                        task_name: task.name.clone(),
                        attempt,
                        max_attempts,
                        error,
                    });
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(error) => {
                    error!("Task {} failed after {} attempt(s): {}", task.name, attempt, error);
                    return TaskResult::failure(&task.name, error, attempt);
                }
            }
        }
    }

    async fn cache_key(&self, task: &Task, ctx: &RunContext) -> Option<CacheKey> {
        let spec = task.cache.as_ref()?;
        let mut spec = spec.clone();
        spec.files = spec.files.iter().map(|f| ctx.render(f)).collect();
        for value in spec.inputs.values_mut() {
            *value = ctx.render(value);
        }

        match spec.compute(&ctx.workdir).await {
            Ok(key) => Some(key),
            Err(e) => {
                warn!("Could not compute cache key for task {}: {}", task.name, e);
                None
            }
        }
    }

    async fn lookup(&self, key: &CacheKey) -> Option<CacheEntry> {
        match self.cache.lookup(key).await {
            Ok(entry) => entry,
            Err(e) => {
                warn!("Cache lookup for {} failed, treating as miss: {}", key, e);
                None
            }
        }
    }

    async fn record_success(
        &self,
        task: &Task,
        ctx: &mut RunContext,
        key: Option<&CacheKey>,
        output: &TaskOutput,
    ) {
        for (k, v) in &output.exports {
            ctx.set_export(&task.name, k, v.clone());
        }

        if let Some(key) = key {
            let entry = CacheEntry {
                key: key.clone(),
                task_name: task.name.clone(),
                output: output.output.clone(),
                artifact_ref: output.artifact_ref.clone(),
                exports: output.exports.clone(),
                stored_at: Utc::now(),
            };
            if let Err(e) = self.cache.store(entry).await {
                warn!("Could not store cache entry {}: {}", key, e);
            }
        }
    }
}

pub(crate) fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
