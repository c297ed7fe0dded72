//! Task domain model

use crate::cache::CacheKeySpec;
use crate::core::config::TaskConfig;
use crate::execution::retry::RetryPolicy;
use serde_yaml::Value;
use std::time::Duration;

/// A single external operation, statically defined
#[derive(Debug, Clone)]
pub struct Task {
    /// Unique task name within the pipeline
    pub name: String,

    /// Name of the registered executor that runs this task
    pub executor_ref: String,

    /// Adapter parameters (the `with:` mapping)
    pub params: Value,

    /// Inputs the cache key is derived from, for cache-eligible tasks
    pub cache: Option<CacheKeySpec>,

    pub retry_policy: RetryPolicy,

    /// Bound on a single adapter invocation
    pub timeout_secs: u64,
}

/// Pipeline-level defaults applied to tasks that do not override them
#[derive(Debug, Clone)]
pub struct TaskDefaults {
    pub max_retries: usize,
    pub timeout_secs: u64,
}

impl Default for TaskDefaults {
    fn default() -> Self {
        Self {
            max_retries: 0,
            timeout_secs: 1800, // 30 minutes
        }
    }
}

impl Task {
    /// Create a task from its configuration
    pub fn from_config(config: &TaskConfig, defaults: &TaskDefaults) -> Self {
        let retry_policy = config
            .retry
            .clone()
            .unwrap_or_else(|| RetryPolicy::with_retries(defaults.max_retries));

        Task {
            name: config.name.clone(),
            executor_ref: config.uses.clone(),
            params: config.with.clone(),
            cache: config.cache.clone(),
            retry_policy,
            timeout_secs: config.timeout_secs.unwrap_or(defaults.timeout_secs),
        }
    }

    /// Minimal task, mostly useful for tests and embedding
    pub fn new(name: impl Into<String>, executor_ref: impl Into<String>) -> Self {
        Task {
            name: name.into(),
            executor_ref: executor_ref.into(),
            params: Value::Null,
            cache: None,
            retry_policy: RetryPolicy::default(),
            timeout_secs: TaskDefaults::default().timeout_secs,
        }
    }

    pub fn with_params(mut self, params: Value) -> Self {
        self.params = params;
        self
    }

    pub fn with_cache(mut self, cache: CacheKeySpec) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn with_retry(mut self, retry_policy: RetryPolicy) -> Self {
        self.retry_policy = retry_policy;
        self
    }

    pub fn with_timeout_secs(mut self, timeout_secs: u64) -> Self {
        self.timeout_secs = timeout_secs;
        self
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Look up a string parameter
    pub fn param_str(&self, key: &str) -> Option<&str> {
        self.params.get(key).and_then(Value::as_str)
    }
}
