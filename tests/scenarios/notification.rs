//! Test: every terminal run is reported exactly once, and the report
//! never changes the run's outcome

use crate::helpers::*;
use shipyard::core::{stage::DEFAULT_NOTIFY_STAGE, RunStatus, StageStatus, TaskStatus};
use shipyard::execution::ExecutionEvent;
use shipyard::persistence::HistoryStore;
use std::collections::HashMap;

fn reports_per_run(harness: &Harness) -> HashMap<uuid::Uuid, usize> {
    let mut counts = HashMap::new();
    for payload in harness.channel.payloads() {
        *counts.entry(payload.run_id).or_insert(0) += 1;
    }
    counts
}

#[tokio::test]
async fn test_each_run_reported_once_on_success() {
    let harness = Harness::gate_then_deploy();

    let runs = harness.orchestrator.dispatch(push_event()).await;

    let counts = reports_per_run(&harness);
    assert_eq!(counts.len(), runs.len());
    for run in &runs {
        assert_eq!(counts.get(&run.id), Some(&1), "run of {}", run.pipeline_name);
    }
}

#[tokio::test]
async fn test_run_reported_once_on_failure() {
    let harness = Harness::gate_then_deploy();
    harness
        .scripted
        .script("install-deps", Script::Fail("no network".to_string()));

    let runs = harness.orchestrator.dispatch(push_event()).await;

    let lint = run_of(&runs, "lint");
    assert_eq!(reports_per_run(&harness).get(&lint.id), Some(&1));

    let payload = &harness.channel.payloads()[0];
    assert_eq!(payload.status, RunStatus::Failure);
    let lint_stage = payload
        .stages
        .iter()
        .find(|s| s.name == "lint")
        .expect("lint stage in report");
    assert_eq!(lint_stage.status, StageStatus::Failure);
    assert_eq!(lint_stage.tasks[0].status, TaskStatus::Failure);
    assert_eq!(lint_stage.tasks[1].status, TaskStatus::Skipped);
}

#[tokio::test]
async fn test_notify_stage_is_last_and_carries_final_status() {
    let harness = Harness::gate_then_deploy();

    let runs = harness.orchestrator.dispatch(push_event()).await;

    for run in &runs {
        let last = run.stage_results.last().expect("stages recorded");
        assert_eq!(last.stage_name, DEFAULT_NOTIFY_STAGE);
        assert_eq!(last.status, StageStatus::Success);
        assert!(run.is_terminal());
    }

    // The report is built after the final status is decided
    let payload = &harness.channel.for_pipeline("build")[0];
    assert_eq!(payload.status, RunStatus::Success);
    assert!(payload.ended_at.is_some());
}

#[tokio::test]
async fn test_delivery_failure_does_not_change_outcome() {
    let harness = Harness::from_yaml(GATE_THEN_DEPLOY)
        .channel(RecordingChannel::rejecting())
        .build();

    let runs = harness.orchestrator.dispatch(push_event()).await;

    // Both runs still succeed and the chain still continues
    assert_eq!(runs.len(), 2);
    for run in &runs {
        assert_run_status(run, RunStatus::Success);
        assert_stage(run, DEFAULT_NOTIFY_STAGE, StageStatus::Failure);
    }

    // Delivery is attempted once per run, never retried
    assert_eq!(harness.channel.payloads().len(), 2);

    let failures = harness
        .events
        .lock()
        .iter()
        .filter(|e| matches!(e, ExecutionEvent::NotificationFailed { .. }))
        .count();
    assert_eq!(failures, 2);

    // History records the failed delivery apart from the stage counts
    for summary in harness.history.list_runs(None, 10).await.unwrap() {
        assert_eq!(summary.status, RunStatus::Success);
        assert_eq!(summary.failed_stages, 0);
        assert_eq!(summary.notified, Some(false));
    }
}

#[tokio::test]
async fn test_declared_notify_stage_is_used() {
    let yaml = r#"
pipelines:
  - name: "lint"
    on:
      push: {}
    stages:
      - name: "lint"
        tasks:
          - name: "run-linters"
            uses: "scripted"
      - name: "report"
        notify: true
"#;
    let harness = Harness::from_yaml(yaml).build();

    let runs = harness.orchestrator.dispatch(push_event()).await;

    let lint = run_of(&runs, "lint");
    let names: Vec<&str> = lint.stage_results.iter().map(|s| s.stage_name.as_str()).collect();
    assert_eq!(names, vec!["lint", "report"]);
    assert_eq!(harness.channel.payloads().len(), 1);
}
