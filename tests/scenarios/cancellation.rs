//! Test: cancelling an active run stops it at the next boundary, still
//! reports it once, and starts no dependents

use crate::helpers::*;
use shipyard::core::{RunStatus, StageStatus};
use std::time::Duration;

const SLOW: &str = r#"
pipelines:
  - name: "slow"
    on:
      push: {}
    stages:
      - name: "first"
        tasks:
          - name: "wait"
            uses: "scripted"
      - name: "second"
        tasks:
          - name: "after"
            uses: "scripted"

  - name: "follow"
    on:
      workflow_run:
        workflows: ["slow"]
    stages:
      - name: "follow"
        tasks:
          - name: "follow-up"
            uses: "scripted"
"#;

#[tokio::test]
async fn test_cancel_stops_at_next_stage() {
    let harness = Harness::from_yaml(SLOW).build();
    harness
        .scripted
        .script("wait", Script::Sleep(Duration::from_millis(300)));

    let orchestrator = &harness.orchestrator;
    let (runs, cancelled) = tokio::join!(orchestrator.dispatch(push_event()), async {
        tokio::time::sleep(Duration::from_millis(50)).await;
        orchestrator.cancel_all("operator stop")
    });

    assert_eq!(cancelled, 1);
    assert_eq!(runs.len(), 1, "a cancelled run starts no dependents");

    let slow = run_of(&runs, "slow");
    assert_run_status(slow, RunStatus::Cancelled);
    // The in-flight task finishes; the next stage never starts
    assert_stage(slow, "first", StageStatus::Success);
    assert_stage(slow, "second", StageStatus::Skipped);
    assert_eq!(
        slow.stage("second").and_then(|s| s.skip_reason.as_deref()),
        Some("run cancelled: operator stop")
    );
    assert_eq!(harness.scripted.calls(), vec!["wait"]);

    let payloads = harness.channel.payloads();
    assert_eq!(payloads.len(), 1);
    assert_eq!(payloads[0].status, RunStatus::Cancelled);
    assert!(harness.orchestrator.active_runs().is_empty());
}

#[tokio::test]
async fn test_cancel_by_run_id() {
    let harness = Harness::from_yaml(SLOW).build();
    harness
        .scripted
        .script("wait", Script::Sleep(Duration::from_millis(300)));

    let orchestrator = &harness.orchestrator;
    let (runs, cancelled) = tokio::join!(orchestrator.dispatch(push_event()), async {
        tokio::time::sleep(Duration::from_millis(50)).await;
        let active = orchestrator.active_runs();
        assert_eq!(active.len(), 1);
        // Cancelling twice keeps the first reason
        let first = orchestrator.cancel(active[0], "superseded by newer push");
        let second = orchestrator.cancel(active[0], "ignored");
        (first, second)
    });

    assert_eq!(cancelled, (true, false));
    let slow = run_of(&runs, "slow");
    assert_run_status(slow, RunStatus::Cancelled);
    assert_eq!(
        slow.stage("second").and_then(|s| s.skip_reason.as_deref()),
        Some("run cancelled: superseded by newer push")
    );
}

#[tokio::test]
async fn test_cancel_unknown_run_is_noop() {
    let harness = Harness::from_yaml(SLOW).build();
    assert!(!harness.orchestrator.cancel(uuid::Uuid::new_v4(), "nothing to stop"));
    assert_eq!(harness.orchestrator.cancel_all("idle"), 0);
}

const SINGLE_STAGE: &str = r#"
pipelines:
  - name: "slow"
    on:
      push: {}
    stages:
      - name: "only"
        tasks:
          - name: "wait"
            uses: "scripted"

  - name: "follow"
    on:
      workflow_run:
        workflows: ["slow"]
    stages:
      - name: "follow"
        tasks:
          - name: "follow-up"
            uses: "scripted"
"#;

#[tokio::test]
async fn test_cancel_during_last_stage_starts_no_dependents() {
    let harness = Harness::from_yaml(SINGLE_STAGE).build();
    harness
        .scripted
        .script("wait", Script::Sleep(Duration::from_millis(300)));

    let orchestrator = &harness.orchestrator;
    let (runs, cancelled) = tokio::join!(orchestrator.dispatch(push_event()), async {
        tokio::time::sleep(Duration::from_millis(50)).await;
        orchestrator.cancel_all("operator stop")
    });

    assert_eq!(cancelled, 1);
    assert_eq!(runs.len(), 1, "a cancelled run starts no dependents");
    let slow = run_of(&runs, "slow");
    assert_run_status(slow, RunStatus::Cancelled);
    // The in-flight task completes; the run is still cancelled
    assert_stage(slow, "only", StageStatus::Success);
    assert_stage(slow, "notify", StageStatus::Success);
    assert_eq!(harness.scripted.calls(), vec!["wait"]);

    let payloads = harness.channel.payloads();
    assert_eq!(payloads.len(), 1);
    assert_eq!(payloads[0].status, RunStatus::Cancelled);
}
