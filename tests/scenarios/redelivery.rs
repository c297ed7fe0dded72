//! Test: redelivered events start nothing new, and re-running the same
//! commit reproduces the same outcome

use crate::helpers::*;
use shipyard::core::{RunStatus, StageStatus, TaskStatus};
use shipyard::persistence::HistoryStore;

#[tokio::test]
async fn test_redelivered_event_is_ignored() {
    let harness = Harness::gate_then_deploy();
    let event = push_event();

    let first = harness.orchestrator.dispatch(event.clone()).await;
    let second = harness.orchestrator.dispatch(event).await;

    assert_eq!(first.len(), 2);
    assert!(second.is_empty());
    assert_eq!(harness.channel.payloads().len(), 2);
    assert_eq!(harness.history.list_runs(None, 10).await.unwrap().len(), 2);
}

#[tokio::test]
async fn test_redelivery_window_is_bounded() {
    let harness = Harness::from_yaml(GATE_THEN_DEPLOY)
        .redelivery_window(2)
        .build();
    let old = push_event();

    harness.orchestrator.dispatch(old.clone()).await;
    harness.orchestrator.dispatch(push_event()).await;
    // lint and build runs of the second push fill the window
    assert_eq!(harness.orchestrator.remembered_deliveries(), 2);

    let replayed = harness.orchestrator.dispatch(old).await;
    assert_eq!(replayed.len(), 2);
    assert_eq!(harness.orchestrator.remembered_deliveries(), 2);
}

#[tokio::test]
async fn test_same_commit_twice_is_idempotent() {
    let harness = Harness::gate_then_deploy();

    let first = harness.orchestrator.dispatch(push_event()).await;
    let commands_after_first = harness.runner.lines();
    let second = harness.orchestrator.dispatch(push_event()).await;

    let statuses = |runs: &[shipyard::Run]| -> Vec<(String, RunStatus)> {
        runs.iter()
            .map(|r| (r.pipeline_name.clone(), r.overall_status))
            .collect()
    };
    assert_eq!(statuses(&first), statuses(&second));

    // The same images are pushed and the same deployment rolled out
    let all = harness.runner.lines();
    assert_eq!(all.len(), commands_after_first.len() * 2);
    assert_eq!(&all[commands_after_first.len()..], commands_after_first.as_slice());
}

type TaskOutline = (String, TaskStatus, bool);
type StageOutline = (String, StageStatus, Vec<TaskOutline>);

/// Every stage and task status of every run, in order
fn outline(runs: &[shipyard::Run]) -> Vec<(String, RunStatus, Vec<StageOutline>)> {
    runs.iter()
        .map(|run| {
            let stages = run
                .stage_results
                .iter()
                .map(|stage| {
                    let tasks = stage
                        .tasks
                        .iter()
                        .map(|t| (t.task_name.clone(), t.status, t.cache_hit))
                        .collect();
                    (stage.stage_name.clone(), stage.status, tasks)
                })
                .collect();
            (run.pipeline_name.clone(), run.overall_status, stages)
        })
        .collect()
}

#[tokio::test]
async fn test_unchanged_event_with_empty_cache_repeats_outcome() {
    let event = push_event();

    let first = Harness::gate_then_deploy();
    let first_runs = first.orchestrator.dispatch(event.clone()).await;
    let second = Harness::gate_then_deploy();
    let second_runs = second.orchestrator.dispatch(event).await;

    let expected = outline(&first_runs);
    assert_eq!(expected.len(), 2);
    assert_eq!(outline(&second_runs), expected);
    assert!(expected
        .iter()
        .flat_map(|(_, _, stages)| stages.iter())
        .flat_map(|(_, _, tasks)| tasks.iter())
        .all(|(_, _, cache_hit)| !cache_hit));
    assert_eq!(first.runner.lines(), second.runner.lines());
    assert_eq!(first.scripted.calls(), second.scripted.calls());
}
