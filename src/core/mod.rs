//! Core domain models
//!
//! This module defines the data structures that represent events, runs,
//! pipelines, stages, tasks, and their configuration.

pub mod condition;
pub mod config;
pub mod context;
pub mod event;
pub mod pipeline;
pub mod run;
pub mod secrets;
pub mod stage;
pub mod state;
pub mod task;

pub use condition::*;
pub use context::*;
pub use event::*;
pub use pipeline::*;
pub use run::*;
pub use stage::*;
pub use state::*;
pub use task::*;
