//! Run notifications
//!
//! The notify stage hands the terminal run to the `Notifier`, which builds
//! a structured payload and delivers it to a channel. Delivery failures are
//! logged and reported back as data; they never change the run outcome.

#[cfg(feature = "webhook")]
pub mod webhook;

#[cfg(feature = "webhook")]
pub use webhook::WebhookChannel;

use crate::core::{
    config::NotificationConfig,
    event::{short_sha, PrMetadata, TriggerKind},
    run::Run,
    secrets::SecretResolver,
    state::{RunStatus, StageStatus, TaskStatus},
};
use crate::execution::runner::panic_message;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::FutureExt;
use serde::{Deserialize, Serialize};
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use thiserror::Error;
use tracing::{info, warn};
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("notification secret '{0}' could not be resolved")]
    MissingSecret(String),

    #[error("notification delivery failed: {0}")]
    Delivery(String),

    #[error("channel rejected notification with HTTP {0}")]
    Rejected(u16),

    #[error("notification channel '{0}' is not available in this build")]
    Unsupported(String),
}

/// Trigger metadata carried by a notification
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TriggerSummary {
    pub kind: TriggerKind,
    pub originating_kind: TriggerKind,
    pub source_pipeline: Option<String>,
    #[serde(rename = "ref")]
    pub git_ref: String,
    pub commit_sha: String,
    pub short_sha: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskSummary {
    pub name: String,
    pub status: TaskStatus,
    pub cache_hit: bool,
}

/// Per-stage outcome
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageSummary {
    pub name: String,
    pub status: StageStatus,
    pub skip_reason: Option<String>,
    pub tasks: Vec<TaskSummary>,
}

/// The report delivered once per terminal run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationPayload {
    pub run_id: Uuid,
    pub pipeline: String,
    pub status: RunStatus,
    pub trigger: TriggerSummary,
    pub stages: Vec<StageSummary>,
    /// Null when the triggering event was not PR related
    pub pr: Option<PrMetadata>,
    pub started_at: Option<DateTime<Utc>>,
    pub ended_at: Option<DateTime<Utc>>,
}

impl NotificationPayload {
    /// Build the payload from a run whose final status has been set
    pub fn from_run(run: &Run) -> Self {
        let event = &run.triggering_event;
        Self {
            run_id: run.id,
            pipeline: run.pipeline_name.clone(),
            status: run.overall_status,
            trigger: TriggerSummary {
                kind: event.trigger_kind,
                originating_kind: event.originating_kind(),
                source_pipeline: event.source_pipeline.clone(),
                git_ref: event.git_ref.clone(),
                commit_sha: event.commit_sha.clone(),
                short_sha: short_sha(&event.commit_sha).to_string(),
            },
            stages: run
                .stage_results
                .iter()
                .map(|stage| StageSummary {
                    name: stage.stage_name.clone(),
                    status: stage.status,
                    skip_reason: stage.skip_reason.clone(),
                    tasks: stage
                        .tasks
                        .iter()
                        .map(|task| TaskSummary {
                            name: task.task_name.clone(),
                            status: task.status,
                            cache_hit: task.cache_hit,
                        })
                        .collect(),
                })
                .collect(),
            pr: event.pr.clone(),
            started_at: run.started_at,
            ended_at: run.ended_at.or_else(|| Some(Utc::now())),
        }
    }

    /// One-line human summary
    pub fn headline(&self) -> String {
        let mut line = format!(
            "{} {} for {} @ {}",
            self.pipeline,
            self.status.as_str(),
            self.trigger.git_ref,
            self.trigger.short_sha
        );
        if let Some(pr) = &self.pr {
            line.push_str(&format!(" (PR #{} \"{}\" by {})", pr.number, pr.title, pr.author));
        }
        line
    }
}

/// Delivers payloads to an external channel
#[async_trait]
pub trait NotificationChannel: Send + Sync {
    fn name(&self) -> &str;

    async fn deliver(
        &self,
        payload: &NotificationPayload,
        secrets: &dyn SecretResolver,
    ) -> Result<(), NotifyError>;
}

/// Writes the report to the log
#[derive(Debug, Clone, Default)]
pub struct LogChannel;

#[async_trait]
impl NotificationChannel for LogChannel {
    fn name(&self) -> &str {
        "log"
    }

    async fn deliver(
        &self,
        payload: &NotificationPayload,
        _secrets: &dyn SecretResolver,
    ) -> Result<(), NotifyError> {
        info!("Run report: {}", payload.headline());
        for stage in &payload.stages {
            info!(
                "  {} {:?}{}",
                stage.name,
                stage.status,
                stage
                    .skip_reason
                    .as_deref()
                    .map(|r| format!(" ({})", r))
                    .unwrap_or_default()
            );
        }
        Ok(())
    }
}

/// Outcome of a notification attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeliveryStatus {
    Delivered { channel: String },
    Failed { channel: String, error: String },
}

/// Dispatches run reports. Never fails the run.
#[derive(Clone)]
pub struct Notifier {
    channel: Arc<dyn NotificationChannel>,
}

impl Notifier {
    pub fn new(channel: Arc<dyn NotificationChannel>) -> Self {
        Self { channel }
    }

    /// Notifier for the configured channel
    pub fn from_config(config: &NotificationConfig) -> anyhow::Result<Self> {
        match config {
            NotificationConfig::Log => Ok(Self::new(Arc::new(LogChannel))),
            #[cfg(feature = "webhook")]
            NotificationConfig::Webhook { url, token_secret } => Ok(Self::new(Arc::new(
                WebhookChannel::new(url.clone(), token_secret.clone())?,
            ))),
            #[cfg(not(feature = "webhook"))]
            NotificationConfig::Webhook { .. } => {
                Err(NotifyError::Unsupported("webhook".to_string()).into())
            }
        }
    }

    /// Deliver the report for `run`
    pub async fn notify(&self, run: &Run, secrets: &dyn SecretResolver) -> DeliveryStatus {
        let payload = NotificationPayload::from_run(run);
        let channel = self.channel.name().to_string();

        let delivery = AssertUnwindSafe(self.channel.deliver(&payload, secrets)).catch_unwind();
        let outcome = match delivery.await {
            Ok(result) => result.map_err(|e| e.to_string()),
            Err(panic) => Err(format!(
                "notification channel panicked: {}",
                panic_message(panic.as_ref())
            )),
        };

        match outcome {
            Ok(()) => {
                info!("Notified {} of run {} ({})", channel, run.id, payload.status.as_str());
                DeliveryStatus::Delivered { channel }
            }
            Err(e) => {
                warn!("Notification for run {} via {} failed: {}", run.id, channel, e);
                DeliveryStatus::Failed { channel, error: e }
            }
        }
    }
}

impl Default for Notifier {
    fn default() -> Self {
        Self::new(Arc::new(LogChannel))
    }
}

impl std::fmt::Debug for Notifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Notifier")
            .field("channel", &self.channel.name())
            .finish()
    }
}
