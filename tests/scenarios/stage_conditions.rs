//! Test: stage run conditions, blocking stages and exports between tasks

use crate::helpers::*;
use shipyard::core::{RunStatus, StageStatus, TaskStatus};

const CI: &str = r#"
pipelines:
  - name: "ci"
    on:
      push: {}
      pull_request: {}
    stages:
      - name: "test"
        tasks:
          - name: "unit"
            uses: "scripted"
      - name: "coverage"
        tasks:
          - name: "report-coverage"
            uses: "scripted"
      - name: "publish"
        when:
          all:
            - on_prior_success
            - on_event_kind: [push]
        tasks:
          - name: "publish-docs"
            uses: "scripted"
      - name: "announce"
        when:
          not:
            on_event_kind: [pull_request]
        tasks:
          - name: "announce"
            uses: "scripted"
            with:
              run: "post {{ publish-docs.url }} for {{ event.branch }}"
      - name: "cleanup"
        when: always
        tasks:
          - name: "cleanup"
            uses: "scripted"
"#;

#[tokio::test]
async fn test_push_runs_every_stage_and_passes_exports() {
    let harness = Harness::from_yaml(CI).build();
    harness.scripted.script(
        "publish-docs",
        Script::Export("url".to_string(), "https://docs.example.com/a1b2c3d".to_string()),
    );

    let runs = harness.orchestrator.dispatch(push_event()).await;

    let ci = run_of(&runs, "ci");
    assert_run_status(ci, RunStatus::Success);
    assert_eq!(
        harness.scripted.calls(),
        vec!["unit", "report-coverage", "publish-docs", "announce", "cleanup"]
    );
    assert_eq!(
        harness.scripted.rendered("announce"),
        vec!["post https://docs.example.com/a1b2c3d for main"]
    );
}

#[tokio::test]
async fn test_pr_skips_push_only_stages() {
    let harness = Harness::from_yaml(CI).build();

    let runs = harness.orchestrator.dispatch(pr_event()).await;

    let ci = run_of(&runs, "ci");
    assert_run_status(ci, RunStatus::Success);
    assert_stage(ci, "publish", StageStatus::Skipped);
    assert_eq!(
        ci.stage("publish").and_then(|s| s.skip_reason.as_deref()),
        Some("condition all(on_prior_success, on_event_kind(push)) not met")
    );
    assert_stage(ci, "announce", StageStatus::Skipped);
    assert_task(ci, "announce", "announce", TaskStatus::Skipped);
    assert_stage(ci, "cleanup", StageStatus::Success);
}

#[tokio::test]
async fn test_failure_skips_dependent_stages_but_not_always() {
    let harness = Harness::from_yaml(CI).build();
    harness.scripted.script("unit", Script::Fail("2 tests failed".to_string()));

    let runs = harness.orchestrator.dispatch(push_event()).await;

    let ci = run_of(&runs, "ci");
    assert_run_status(ci, RunStatus::Failure);
    assert_stage(ci, "test", StageStatus::Failure);
    assert_stage(ci, "coverage", StageStatus::Skipped);
    assert_eq!(
        ci.stage("coverage").and_then(|s| s.skip_reason.as_deref()),
        Some("condition on_prior_success not met")
    );
    assert_stage(ci, "publish", StageStatus::Skipped);
    // Not gated on prior success
    assert_stage(ci, "announce", StageStatus::Success);
    assert_stage(ci, "cleanup", StageStatus::Success);
}

#[tokio::test]
async fn test_skipped_blocking_stage_halts_run() {
    let yaml = r#"
pipelines:
  - name: "release"
    on:
      push: {}
      pull_request: {}
    stages:
      - name: "gate"
        blocking: true
        when:
          on_event_kind: [push]
        tasks:
          - name: "verify-tag"
            uses: "scripted"
      - name: "ship"
        when: always
        tasks:
          - name: "ship"
            uses: "scripted"
"#;
    let harness = Harness::from_yaml(yaml).build();

    let runs = harness.orchestrator.dispatch(pr_event()).await;

    let release = run_of(&runs, "release");
    assert_run_status(release, RunStatus::Failure);
    assert_stage(release, "gate", StageStatus::Skipped);
    assert_stage(release, "ship", StageStatus::Skipped);
    assert_eq!(
        release.stage("ship").and_then(|s| s.skip_reason.as_deref()),
        Some("blocking stage 'gate' did not run")
    );
    assert!(harness.scripted.calls().is_empty());

    // The report still goes out, once
    assert_eq!(harness.channel.payloads().len(), 1);
    assert_eq!(harness.channel.payloads()[0].status, RunStatus::Failure);
}

#[tokio::test]
async fn test_failed_blocking_stage_halts_run() {
    let yaml = r#"
pipelines:
  - name: "release"
    on:
      push: {}
    stages:
      - name: "gate"
        blocking: true
        tasks:
          - name: "verify-tag"
            uses: "scripted"
      - name: "ship"
        when: always
        tasks:
          - name: "ship"
            uses: "scripted"
"#;
    let harness = Harness::from_yaml(yaml).build();
    harness.scripted.script("verify-tag", Script::Fail("unsigned tag".to_string()));

    let runs = harness.orchestrator.dispatch(push_event()).await;

    let release = run_of(&runs, "release");
    assert_run_status(release, RunStatus::Failure);
    assert_eq!(
        release.stage("ship").and_then(|s| s.skip_reason.as_deref()),
        Some("blocking stage 'gate' failed")
    );
    assert_eq!(harness.scripted.calls(), vec!["verify-tag"]);
}
