//! Pipeline domain model

use crate::core::{
    config::PipelineConfig,
    stage::{Stage, DEFAULT_NOTIFY_STAGE},
    task::{Task, TaskDefaults},
};
use crate::trigger::TriggerSpec;
use std::collections::HashMap;

/// A pipeline definition: an ordered sequence of stages ending in the
/// notify stage
#[derive(Debug, Clone)]
pub struct Pipeline {
    pub name: String,

    /// Which events start this pipeline
    pub trigger: TriggerSpec,

    /// Variables available to task parameter rendering
    pub variables: HashMap<String, String>,

    /// Stages in declaration order; the last one is the notify stage
    stages: Vec<Stage>,
}

impl Pipeline {
    /// Create a pipeline from configuration
    pub fn from_config(config: &PipelineConfig, global_variables: &HashMap<String, String>) -> Self {
        let defaults = TaskDefaults {
            max_retries: config.max_retries.unwrap_or(0),
            timeout_secs: config
                .default_timeout_secs
                .unwrap_or(TaskDefaults::default().timeout_secs),
        };

        let stages = config
            .stages
            .iter()
            .map(|stage| Stage::from_config(stage, &defaults))
            .collect();

        let mut variables = global_variables.clone();
        variables.extend(config.variables.clone());

        Pipeline::new(&config.name, config.trigger.clone(), stages).with_variables(variables)
    }

    /// Build a pipeline, appending a notify stage if none is declared
    pub fn new(name: impl Into<String>, trigger: TriggerSpec, mut stages: Vec<Stage>) -> Self {
        if !stages.last().is_some_and(Stage::is_notify) {
            stages.retain(|s| !s.is_notify());
            stages.push(Stage::notify(DEFAULT_NOTIFY_STAGE));
        }

        Pipeline {
            name: name.into(),
            trigger,
            variables: HashMap::new(),
            stages,
        }
    }

    pub fn with_variables(mut self, variables: HashMap<String, String>) -> Self {
        self.variables = variables;
        self
    }

    /// All stages, notify stage last
    pub fn stages(&self) -> &[Stage] {
        &self.stages
    }

    /// Get a stage by name
    pub fn stage(&self, name: &str) -> Option<&Stage> {
        self.stages.iter().find(|s| s.name == name)
    }

    /// Get a task by name
    pub fn task(&self, name: &str) -> Option<&Task> {
        self.stages
            .iter()
            .flat_map(|s| s.tasks.iter())
            .find(|t| t.name == name)
    }

    /// Every task in execution order
    pub fn tasks(&self) -> impl Iterator<Item = &Task> {
        self.stages.iter().flat_map(|s| s.tasks.iter())
    }

    pub fn notify_stage(&self) -> Option<&Stage> {
        self.stages.last().filter(|s| s.is_notify())
    }
}
