//! Run execution

pub mod cancellation;
pub mod engine;
pub mod orchestrator;
pub mod retry;
pub mod runner;

pub use cancellation::CancellationToken;
pub use engine::{EventEmitter, EventHandler, ExecutionEvent, PipelineExecutor};
pub use orchestrator::Orchestrator;
pub use retry::{Backoff, BackoffStrategy, RetryPolicy};
pub use runner::TaskRunner;
