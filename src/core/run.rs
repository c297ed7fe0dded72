//! Run model - one end-to-end execution of a pipeline for one event

use crate::core::{
    event::Event,
    state::{RunStatus, StageResult},
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A single pipeline run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Run {
    pub id: Uuid,

    /// Pipeline this run executes
    pub pipeline_name: String,

    /// The event that created this run
    pub triggering_event: Event,

    /// Results in stage declaration order
    pub stage_results: Vec<StageResult>,

    pub overall_status: RunStatus,

    pub started_at: Option<DateTime<Utc>>,

    pub ended_at: Option<DateTime<Utc>>,
}

impl Run {
    /// Create a pending run for an accepted event
    pub fn new(pipeline_name: impl Into<String>, event: Event) -> Self {
        Self {
            id: Uuid::new_v4(),
            pipeline_name: pipeline_name.into(),
            triggering_event: event,
            stage_results: Vec::new(),
            overall_status: RunStatus::Pending,
            started_at: None,
            ended_at: None,
        }
    }

    /// Mark the run as started
    pub fn start(&mut self) {
        self.overall_status = RunStatus::Running;
        self.started_at = Some(Utc::now());
    }

    /// Set the terminal status
    pub fn finish(&mut self, status: RunStatus) {
        self.overall_status = status;
        self.ended_at = Some(Utc::now());
    }

    pub fn is_terminal(&self) -> bool {
        self.overall_status.is_terminal()
    }

    /// Get the recorded result of a stage
    pub fn stage(&self, name: &str) -> Option<&StageResult> {
        self.stage_results.iter().find(|s| s.stage_name == name)
    }

    /// Whether any recorded stage failed
    pub fn has_failed_stage(&self) -> bool {
        self.stage_results.iter().any(StageResult::has_failure)
    }

    /// Run duration, once both endpoints are known
    pub fn duration(&self) -> Option<chrono::Duration> {
        match (self.started_at, self.ended_at) {
            (Some(start), Some(end)) => Some(end.signed_duration_since(start)),
            _ => None,
        }
    }
}
