//! shipyard - an event-driven gate-then-deploy pipeline orchestrator

pub mod adapters;
pub mod cache;
pub mod cli;
pub mod core;
pub mod execution;
pub mod notify;
pub mod persistence;
pub mod trigger;

// Re-export commonly used types
pub use adapters::{ExecutorError, ExecutorRegistry, TaskExecutor, TaskOutput};
pub use cache::{CacheKeySpec, CacheStore, InMemoryCacheStore};
pub use core::{Event, Pipeline, Run, RunCondition, RunStatus, Stage, Task, TriggerKind};
pub use execution::{CancellationToken, ExecutionEvent, Orchestrator, PipelineExecutor};
pub use notify::{NotificationChannel, Notifier};
pub use trigger::{TriggerListener, TriggerSpec};
