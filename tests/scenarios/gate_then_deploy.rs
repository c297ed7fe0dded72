//! Test: a push passes the lint gate, then the dependent pipeline builds,
//! pushes and deploys

use crate::helpers::*;
use shipyard::core::{Event, RunStatus, StageStatus, TaskStatus, TriggerKind};
use shipyard::persistence::HistoryStore;

#[tokio::test]
async fn test_push_gate_then_deploy() {
    let harness = Harness::gate_then_deploy();

    let runs = harness.orchestrator.dispatch(push_event()).await;

    assert_eq!(runs.len(), 2);
    assert_eq!(runs[0].pipeline_name, "lint");
    assert_eq!(runs[1].pipeline_name, "build");
    assert_run_status(&runs[0], RunStatus::Success);
    assert_run_status(&runs[1], RunStatus::Success);

    // Lint tasks ran in declaration order
    assert_eq!(harness.scripted.calls(), vec!["install-deps", "run-linters"]);

    // Image tagged latest and with the short SHA, then deployed by SHA
    assert_eq!(
        harness.runner.lines(),
        vec![
            "docker build --tag ghcr.io/org/app /work",
            "docker login ghcr.io --username bot --password-stdin",
            "docker tag ghcr.io/org/app ghcr.io/org/app:latest",
            "docker push ghcr.io/org/app:latest",
            "docker tag ghcr.io/org/app ghcr.io/org/app:a1b2c3d",
            "docker push ghcr.io/org/app:a1b2c3d",
            "kubectl --namespace production apply --filename /work/k8s/app.yaml",
            "kubectl --namespace production set image deployment/app app=ghcr.io/org/app:a1b2c3d",
        ]
    );
    assert_eq!(
        harness.runner.stdin_of("docker login").as_deref(),
        Some("hunter2")
    );

    let build = run_of(&runs, "build");
    assert_eq!(build.triggering_event.trigger_kind, TriggerKind::WorkflowCompletion);
    assert_eq!(build.triggering_event.source_pipeline.as_deref(), Some("lint"));
    assert_eq!(build.triggering_event.commit_sha, SHA);
    assert_stage(build, "build", StageStatus::Success);
    assert_stage(build, "deploy", StageStatus::Success);
    assert_stage(build, "notify", StageStatus::Success);

    let history = harness.history.list_runs(None, 10).await.unwrap();
    assert_eq!(history.len(), 2);
}

#[tokio::test]
async fn test_push_to_unwatched_branch_starts_nothing() {
    let harness = Harness::gate_then_deploy();

    let runs = harness
        .orchestrator
        .dispatch(Event::push("refs/heads/feature/x", SHA))
        .await;

    assert!(runs.is_empty());
    assert!(harness.scripted.calls().is_empty());
    assert!(harness.runner.lines().is_empty());
    assert!(harness.channel.payloads().is_empty());
}

#[tokio::test]
async fn test_lint_failure_blocks_deploy() {
    let harness = Harness::gate_then_deploy();
    harness
        .scripted
        .script("run-linters", Script::Fail("flake8: 3 errors".to_string()));

    let runs = harness.orchestrator.dispatch(push_event()).await;

    assert_eq!(runs.len(), 1);
    let lint = run_of(&runs, "lint");
    assert_run_status(lint, RunStatus::Failure);
    assert_stage(lint, "lint", StageStatus::Failure);
    assert_task(lint, "lint", "run-linters", TaskStatus::Failure);
    assert_eq!(
        lint.stage("lint").and_then(|s| s.task("run-linters")).map(|t| t.output.as_str()),
        Some("flake8: 3 errors")
    );

    assert!(harness.runner.lines().is_empty(), "nothing may be built or deployed");
    let payloads = harness.channel.payloads();
    assert_eq!(payloads.len(), 1);
    assert_eq!(payloads[0].status, RunStatus::Failure);
}

#[tokio::test]
async fn test_failed_task_skips_rest_of_stage() {
    let harness = Harness::gate_then_deploy();
    harness
        .scripted
        .script("install-deps", Script::Fail("resolver error".to_string()));

    let runs = harness.orchestrator.dispatch(push_event()).await;

    let lint = run_of(&runs, "lint");
    assert_run_status(lint, RunStatus::Failure);
    assert_eq!(harness.scripted.calls(), vec!["install-deps"]);
    assert_task(lint, "lint", "run-linters", TaskStatus::Skipped);
    assert_eq!(
        lint.stage("lint").and_then(|s| s.task("run-linters")).map(|t| t.output.as_str()),
        Some("earlier task 'install-deps' failed")
    );
}

#[tokio::test]
async fn test_manifest_workspace_falls_back_to_workdir() {
    let yaml = GATE_THEN_DEPLOY.replace("k8s/app.yaml", "workspace:manifests/app.yaml");
    let harness = Harness::from_yaml(&yaml).build();

    let runs = harness.orchestrator.dispatch(push_event()).await;

    // No checkout exported the workspace, so the path resolves under the workdir
    assert!(harness
        .runner
        .lines()
        .contains(&"kubectl --namespace production apply --filename /work/manifests/app.yaml".to_string()));
    assert_run_status(run_of(&runs, "build"), RunStatus::Success);
}

#[tokio::test]
async fn test_deploy_failure_fails_dependent_run_only() {
    let harness = Harness::gate_then_deploy();
    harness.runner.fail_on("kubectl --namespace production apply");

    let runs = harness.orchestrator.dispatch(push_event()).await;

    assert_run_status(run_of(&runs, "lint"), RunStatus::Success);
    let build = run_of(&runs, "build");
    assert_run_status(build, RunStatus::Failure);
    assert_stage(build, "build", StageStatus::Success);
    assert_stage(build, "deploy", StageStatus::Failure);
    assert!(build
        .stage("deploy")
        .and_then(|s| s.task("deploy"))
        .is_some_and(|t| t.output.contains("exited with code 1")));

    let payloads = harness.channel.for_pipeline("build");
    assert_eq!(payloads.len(), 1);
    assert_eq!(payloads[0].status, RunStatus::Failure);
}
