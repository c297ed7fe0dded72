//! Triggering events

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use uuid::Uuid;

/// Length of the abbreviated commit SHA used for image tags
pub const SHORT_SHA_LEN: usize = 7;

/// What kind of upstream occurrence produced an event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerKind {
    Push,
    PullRequest,
    WorkflowCompletion,
}

impl fmt::Display for TriggerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TriggerKind::Push => "push",
            TriggerKind::PullRequest => "pull_request",
            TriggerKind::WorkflowCompletion => "workflow_completion",
        };
        f.write_str(s)
    }
}

/// Outcome of an upstream pipeline run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Conclusion {
    Success,
    Failure,
    Cancelled,
}

impl fmt::Display for Conclusion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Conclusion::Success => "success",
            Conclusion::Failure => "failure",
            Conclusion::Cancelled => "cancelled",
        };
        f.write_str(s)
    }
}

/// Pull request details carried by PR-originated events
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrMetadata {
    pub number: u64,
    pub title: String,
    pub author: String,
    pub source_ref: String,
}

/// An event delivered by the external webhook/event source.
///
/// Events are immutable once received; the orchestrator only reads them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    /// Delivery identifier, used to drop redeliveries
    #[serde(default = "Uuid::new_v4")]
    pub delivery_id: Uuid,

    /// Kind of this event
    pub trigger_kind: TriggerKind,

    /// Pipeline whose completion produced this event
    #[serde(default)]
    pub source_pipeline: Option<String>,

    /// Upstream run conclusion (completion events only)
    #[serde(default)]
    pub conclusion: Option<Conclusion>,

    /// Trigger kind that started the upstream run (completion events only)
    #[serde(default)]
    pub upstream_trigger: Option<TriggerKind>,

    /// Git ref, e.g. `refs/heads/main`
    #[serde(rename = "ref")]
    pub git_ref: String,

    pub commit_sha: String,

    /// Nullable PR metadata
    #[serde(default)]
    pub pr: Option<PrMetadata>,
}

impl Event {
    /// A push to `git_ref` at `commit_sha`
    pub fn push(git_ref: impl Into<String>, commit_sha: impl Into<String>) -> Self {
        Self {
            delivery_id: Uuid::new_v4(),
            trigger_kind: TriggerKind::Push,
            source_pipeline: None,
            conclusion: None,
            upstream_trigger: None,
            git_ref: git_ref.into(),
            commit_sha: commit_sha.into(),
            pr: None,
        }
    }

    /// A pull request event
    pub fn pull_request(
        git_ref: impl Into<String>,
        commit_sha: impl Into<String>,
        pr: PrMetadata,
    ) -> Self {
        Self {
            trigger_kind: TriggerKind::PullRequest,
            pr: Some(pr),
            ..Self::push(git_ref, commit_sha)
        }
    }

    /// The completion event emitted when `pipeline` finishes a run that was
    /// started by `origin`
    pub fn completion(pipeline: impl Into<String>, conclusion: Conclusion, origin: &Event) -> Self {
        Self {
            delivery_id: Uuid::new_v4(),
            trigger_kind: TriggerKind::WorkflowCompletion,
            source_pipeline: Some(pipeline.into()),
            conclusion: Some(conclusion),
            upstream_trigger: Some(origin.originating_kind()),
            git_ref: origin.git_ref.clone(),
            commit_sha: origin.commit_sha.clone(),
            pr: origin.pr.clone(),
        }
    }

    /// The trigger kind that started the chain this event belongs to
    pub fn originating_kind(&self) -> TriggerKind {
        match self.trigger_kind {
            TriggerKind::WorkflowCompletion => self.upstream_trigger.unwrap_or(self.trigger_kind),
            kind => kind,
        }
    }

    /// Seven character commit prefix
    pub fn short_sha(&self) -> &str {
        short_sha(&self.commit_sha)
    }

    /// Branch name with `refs/heads/` stripped
    pub fn branch(&self) -> &str {
        self.git_ref
            .strip_prefix("refs/heads/")
            .unwrap_or(&self.git_ref)
    }

    /// Load an event from a JSON or YAML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())?;
        let is_json = path
            .as_ref()
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));
        let event = if is_json {
            serde_json::from_str(&content)?
        } else {
            serde_yaml::from_str(&content)?
        };
        Ok(event)
    }
}

/// Seven character prefix of a commit SHA (shorter SHAs are returned whole)
pub fn short_sha(commit_sha: &str) -> &str {
    match commit_sha.char_indices().nth(SHORT_SHA_LEN) {
        Some((idx, _)) => &commit_sha[..idx],
        None => commit_sha,
    }
}
