//! Trigger listener - decides whether an event starts a new run

use crate::core::{
    event::{Conclusion, Event, TriggerKind},
    run::Run,
};
use crate::trigger::TriggerSpec;
use thiserror::Error;
use tracing::{debug, info};

/// Why an event did not start a run
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TriggerRejected {
    #[error("pipeline '{pipeline}' does not listen for {kind} events")]
    KindNotDeclared { pipeline: String, kind: TriggerKind },

    #[error("branch '{branch}' does not match the {kind} filter of pipeline '{pipeline}'")]
    BranchFiltered {
        pipeline: String,
        kind: TriggerKind,
        branch: String,
    },

    #[error("pipeline '{pipeline}' does not follow upstream '{upstream}'")]
    UnknownUpstream { pipeline: String, upstream: String },

    #[error("upstream '{upstream}' concluded with {conclusion}")]
    UpstreamNotSuccessful {
        upstream: String,
        conclusion: String,
    },

    #[error("upstream '{upstream}' was started by {origin}, only push-originated completions start dependent pipelines")]
    UpstreamNotPush { upstream: String, origin: TriggerKind },
}

/// Listens for events on behalf of one pipeline
#[derive(Debug, Clone)]
pub struct TriggerListener {
    pipeline_name: String,
    spec: TriggerSpec,
}

impl TriggerListener {
    pub fn new(pipeline_name: impl Into<String>, spec: TriggerSpec) -> Self {
        Self {
            pipeline_name: pipeline_name.into(),
            spec,
        }
    }

    /// Decide whether `event` satisfies this pipeline's start conditions
    pub fn evaluate(&self, event: &Event) -> Result<(), TriggerRejected> {
        match event.trigger_kind {
            TriggerKind::Push | TriggerKind::PullRequest => {
                let filter = match event.trigger_kind {
                    TriggerKind::Push => self.spec.push.as_ref(),
                    _ => self.spec.pull_request.as_ref(),
                };
                let filter = filter.ok_or_else(|| TriggerRejected::KindNotDeclared {
                    pipeline: self.pipeline_name.clone(),
                    kind: event.trigger_kind,
                })?;

                let branch = match (&event.pr, event.trigger_kind) {
                    (Some(pr), TriggerKind::PullRequest) => pr.source_ref.as_str(),
                    _ => event.branch(),
                };
                if !filter.matches(branch) {
                    return Err(TriggerRejected::BranchFiltered {
                        pipeline: self.pipeline_name.clone(),
                        kind: event.trigger_kind,
                        branch: branch.to_string(),
                    });
                }
                Ok(())
            }
            TriggerKind::WorkflowCompletion => {
                let workflow_run = self.spec.workflow_run.as_ref().ok_or_else(|| {
                    TriggerRejected::KindNotDeclared {
                        pipeline: self.pipeline_name.clone(),
                        kind: event.trigger_kind,
                    }
                })?;

                let upstream = event.source_pipeline.clone().unwrap_or_default();
                if !workflow_run.workflows.contains(&upstream) {
                    return Err(TriggerRejected::UnknownUpstream {
                        pipeline: self.pipeline_name.clone(),
                        upstream,
                    });
                }

                if event.conclusion != Some(Conclusion::Success) {
                    return Err(TriggerRejected::UpstreamNotSuccessful {
                        upstream,
                        conclusion: event
                            .conclusion
                            .map(|c| c.to_string())
                            .unwrap_or_else(|| "no conclusion".to_string()),
                    });
                }

                let origin = event.originating_kind();
                if origin != TriggerKind::Push {
                    return Err(TriggerRejected::UpstreamNotPush { upstream, origin });
                }
                Ok(())
            }
        }
    }

    /// Create a run for `event` if it satisfies the start conditions.
    ///
    /// Rejections are logged and produce no run; nothing is executed here.
    pub fn accept(&self, event: &Event) -> Option<Run> {
        match self.evaluate(event) {
            Ok(()) => {
                let run = Run::new(&self.pipeline_name, event.clone());
                info!(
                    "Pipeline {} accepted {} event ({}), run {}",
                    self.pipeline_name,
                    event.trigger_kind,
                    event.short_sha(),
                    run.id
                );
                Some(run)
            }
            Err(TriggerRejected::KindNotDeclared { .. }) => {
                debug!(
                    "Pipeline {} ignores {} events",
                    self.pipeline_name, event.trigger_kind
                );
                None
            }
            Err(rejected) => {
                info!("Trigger rejected: {}", rejected);
                None
            }
        }
    }
}
