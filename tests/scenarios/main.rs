//! Scenario-based tests for shipyard

mod helpers;

mod cancellation;
mod gate_then_deploy;
mod notification;
mod pull_request_gate;
mod redelivery;
mod stage_conditions;
