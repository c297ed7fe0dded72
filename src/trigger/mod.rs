//! Trigger declarations and the listener that turns events into runs

pub mod listener;

pub use listener::{TriggerListener, TriggerRejected};

use regex::Regex;
use serde::{Deserialize, Serialize};

/// Which events start a pipeline (the `on:` block)
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TriggerSpec {
    #[serde(default)]
    pub push: Option<BranchFilter>,

    #[serde(default)]
    pub pull_request: Option<BranchFilter>,

    /// Start on completion of upstream pipelines
    #[serde(default)]
    pub workflow_run: Option<WorkflowRunTrigger>,
}

/// Branch restriction for push/pull_request triggers
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BranchFilter {
    /// Anchored regexes; empty matches every branch
    #[serde(default)]
    pub branches: Vec<String>,
}

/// Dependent-pipeline trigger
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkflowRunTrigger {
    /// Upstream pipelines whose completion is observed
    pub workflows: Vec<String>,
}

impl TriggerSpec {
    /// Trigger on every push
    pub fn push() -> Self {
        Self {
            push: Some(BranchFilter::default()),
            ..Self::default()
        }
    }

    /// Trigger on every push and pull request
    pub fn push_and_pull_request() -> Self {
        Self {
            push: Some(BranchFilter::default()),
            pull_request: Some(BranchFilter::default()),
            workflow_run: None,
        }
    }

    /// Trigger on completion of the given upstream pipelines
    pub fn workflow_run<I, S>(workflows: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            workflow_run: Some(WorkflowRunTrigger {
                workflows: workflows.into_iter().map(Into::into).collect(),
            }),
            ..Self::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.push.is_none() && self.pull_request.is_none() && self.workflow_run.is_none()
    }

    /// Check that every branch pattern compiles
    pub fn compile(&self) -> Result<(), regex::Error> {
        for filter in [&self.push, &self.pull_request].into_iter().flatten() {
            filter.compile()?;
        }
        Ok(())
    }

    /// One-line summary for listings
    pub fn describe(&self) -> String {
        let mut parts = Vec::new();
        if let Some(filter) = &self.push {
            parts.push(format!("push{}", filter.describe()));
        }
        if let Some(filter) = &self.pull_request {
            parts.push(format!("pull_request{}", filter.describe()));
        }
        if let Some(workflow_run) = &self.workflow_run {
            parts.push(format!("workflow_run({})", workflow_run.workflows.join(", ")));
        }
        parts.join(", ")
    }
}

impl BranchFilter {
    fn compile(&self) -> Result<Vec<Regex>, regex::Error> {
        self.branches
            .iter()
            .map(|pattern| Regex::new(&format!("^(?:{})$", pattern)))
            .collect()
    }

    /// Check if a branch passes the filter
    pub fn matches(&self, branch: &str) -> bool {
        if self.branches.is_empty() {
            return true;
        }
        match self.compile() {
            Ok(patterns) => patterns.iter().any(|re| re.is_match(branch)),
            Err(_) => false,
        }
    }

    fn describe(&self) -> String {
        if self.branches.is_empty() {
            String::new()
        } else {
            format!("[{}]", self.branches.join("|"))
        }
    }
}
