//! Stage run conditions
//!
//! A small closed set of named predicates composed with boolean
//! combinators. Conditions are evaluated over the run state accumulated so
//! far; they are data, never expression strings.

use crate::core::{
    event::{Event, TriggerKind},
    state::{StageResult, StageStatus},
};
use serde::{Deserialize, Serialize};

/// Predicate deciding whether a stage runs
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum RunCondition {
    /// Always run
    #[default]
    Always,
    /// Run only if no earlier stage failed
    OnPriorSuccess,
    /// Run only if the run was started by one of these trigger kinds
    /// (matched against the originating kind of the chain)
    OnEventKind(Vec<TriggerKind>),
    All(Vec<RunCondition>),
    Any(Vec<RunCondition>),
    Not(Box<RunCondition>),
}

/// Read-only view of a run used to evaluate conditions
#[derive(Debug, Clone, Copy)]
pub struct RunView<'a> {
    pub event: &'a Event,
    pub prior_stages: &'a [StageResult],
}

impl RunCondition {
    /// Evaluate the condition against the run state so far
    pub fn evaluate(&self, view: &RunView<'_>) -> bool {
        match self {
            RunCondition::Always => true,
            RunCondition::OnPriorSuccess => view
                .prior_stages
                .iter()
                .all(|s| s.status != StageStatus::Failure),
            RunCondition::OnEventKind(kinds) => {
                let kind = view.event.originating_kind();
                kinds.contains(&kind) || kinds.contains(&view.event.trigger_kind)
            }
            RunCondition::All(conditions) => conditions.iter().all(|c| c.evaluate(view)),
            RunCondition::Any(conditions) => conditions.iter().any(|c| c.evaluate(view)),
            RunCondition::Not(condition) => !condition.evaluate(view),
        }
    }

    /// Short human readable form for logs and skip reasons
    pub fn describe(&self) -> String {
        match self {
            RunCondition::Always => "always".to_string(),
            RunCondition::OnPriorSuccess => "on_prior_success".to_string(),
            RunCondition::OnEventKind(kinds) => {
                let kinds: Vec<String> = kinds.iter().map(|k| k.to_string()).collect();
                format!("on_event_kind({})", kinds.join(", "))
            }
            RunCondition::All(conditions) => format!(
                "all({})",
                conditions.iter().map(|c| c.describe()).collect::<Vec<_>>().join(", ")
            ),
            RunCondition::Any(conditions) => format!(
                "any({})",
                conditions.iter().map(|c| c.describe()).collect::<Vec<_>>().join(", ")
            ),
            RunCondition::Not(condition) => format!("not({})", condition.describe()),
        }
    }
}
