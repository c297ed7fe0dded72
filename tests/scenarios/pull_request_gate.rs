//! Test: pull requests run the lint gate, are reported with their PR
//! metadata, and never deploy

use crate::helpers::*;
use shipyard::core::{event::PrMetadata, Event, RunStatus, StageStatus, TriggerKind};

#[tokio::test]
async fn test_pr_lint_failure_reports_pr_and_stops() {
    let harness = Harness::gate_then_deploy();
    harness
        .scripted
        .script("run-linters", Script::Fail("isort would reformat 2 files".to_string()));

    let runs = harness.orchestrator.dispatch(pr_event()).await;

    assert_eq!(runs.len(), 1);
    let lint = run_of(&runs, "lint");
    assert_run_status(lint, RunStatus::Failure);
    assert_stage(lint, "lint", StageStatus::Failure);

    let payloads = harness.channel.payloads();
    assert_eq!(payloads.len(), 1);
    let payload = &payloads[0];
    assert_eq!(payload.pipeline, "lint");
    assert_eq!(payload.status, RunStatus::Failure);
    assert_eq!(payload.trigger.kind, TriggerKind::PullRequest);
    let pr = payload.pr.as_ref().expect("PR metadata in report");
    assert_eq!(pr.number, 42);
    assert_eq!(pr.author, "octocat");
    assert!(payload.headline().contains("PR #42"));

    assert!(harness.runner.lines().is_empty());
}

#[tokio::test]
async fn test_pr_lint_success_does_not_deploy() {
    let harness = Harness::gate_then_deploy();

    let runs = harness.orchestrator.dispatch(pr_event()).await;

    // The completion of a PR-started lint run does not start the build
    assert_eq!(runs.len(), 1);
    assert_run_status(run_of(&runs, "lint"), RunStatus::Success);
    assert!(harness.runner.lines().is_empty());

    let payloads = harness.channel.payloads();
    assert_eq!(payloads.len(), 1);
    assert_eq!(payloads[0].status, RunStatus::Success);
    assert!(payloads[0].pr.is_some());
}

#[tokio::test]
async fn test_pr_branch_filter_matches_source_branch() {
    let yaml = GATE_THEN_DEPLOY.replace(
        "pull_request: {}",
        "pull_request:\n        branches: [\"release/.*\"]",
    );
    let harness = Harness::from_yaml(&yaml).build();

    let runs = harness.orchestrator.dispatch(pr_event()).await;
    assert!(runs.is_empty());

    let release_pr = Event::pull_request(
        "refs/pull/43/merge",
        SHA,
        PrMetadata {
            number: 43,
            title: "Release 1.4".to_string(),
            author: "release-bot".to_string(),
            source_ref: "release/1.4".to_string(),
        },
    );
    let runs = harness.orchestrator.dispatch(release_pr).await;
    assert_eq!(runs.len(), 1);
    assert_run_status(run_of(&runs, "lint"), RunStatus::Success);
}
