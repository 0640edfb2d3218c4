use shipwright_core::{OperationId, OperationParams, OperationRunner, OperationStatus};
use shipwright_executor::{CallKind, MockExecutor};
use std::collections::HashSet;
use std::sync::{Arc, Barrier};
use std::thread;
use std::time::Duration;

fn build(component: &str) -> OperationParams {
    OperationParams::Build {
        component: component.to_owned(),
    }
}

fn build_and_deploy(components: &[&str], provider: &str) -> OperationParams {
    OperationParams::BuildAndDeploy {
        components: components.iter().map(|c| (*c).to_owned()).collect(),
        cloud_provider: provider.to_owned(),
    }
}

fn submit(runner: &OperationRunner, params: OperationParams) -> OperationId {
    runner.submit(params).unwrap().id().clone()
}

#[test]
fn new_operation_is_visible_before_completion() {
    let runner = OperationRunner::new(Box::new(
        MockExecutor::new().with_delay(Duration::from_millis(20)),
    ));
    let launch = runner.submit(build("api")).unwrap();
    let id = launch.id().clone();

    let op = runner.get(&id).unwrap();
    assert_eq!(op.status, OperationStatus::Pending);
    assert!(op.completed_at.is_none());

    drop(launch);
    let op = runner.wait(&id).unwrap();
    assert_eq!(op.status, OperationStatus::Completed);
}

#[test]
fn concurrent_builds_are_serialized() {
    let mock = MockExecutor::new().with_delay(Duration::from_millis(15));
    let journal = mock.journal();
    let runner = Arc::new(OperationRunner::new(Box::new(mock)));
    let barrier = Arc::new(Barrier::new(8));

    let handles: Vec<_> = (0..8)
        .map(|i| {
            let r = Arc::clone(&runner);
            let b = Arc::clone(&barrier);
            thread::spawn(move || {
                b.wait();
                submit(&r, build(&format!("component-{i}")))
            })
        })
        .collect();
    let ids: Vec<OperationId> = handles.into_iter().map(|h| h.join().unwrap()).collect();

    let distinct: HashSet<_> = ids.iter().cloned().collect();
    assert_eq!(distinct.len(), 8);

    runner.join_all();
    for id in &ids {
        let op = runner.get(id).unwrap();
        assert_eq!(op.status, OperationStatus::Completed);
        assert!(op.completed_at.is_some());
    }

    assert_eq!(journal.len(), 8);
    assert!(!journal.has_overlap(), "executor calls overlapped");
    assert_eq!(journal.peak_in_flight(), 1);
}

#[test]
fn build_and_deploy_aborts_on_first_failure() {
    let mock = MockExecutor::new().fail_build("b");
    let journal = mock.journal();
    let runner = OperationRunner::new(Box::new(mock));

    let id = submit(&runner, build_and_deploy(&["a", "b", "c"], "vultr"));
    let op = runner.wait(&id).unwrap();

    assert_eq!(op.status, OperationStatus::Failed);
    assert!(op
        .error
        .as_deref()
        .unwrap()
        .starts_with("failed to build component b"));

    let results = op.build_results.unwrap();
    assert_eq!(results.len(), 2);
    assert_eq!(results["a"]["status"], "success");
    assert_eq!(results["b"]["status"], "error");
    assert!(!results.contains_key("c"));
    assert!(op.deploy_result.is_none());

    assert_eq!(journal.targets(CallKind::Build), vec!["a", "b"]);
    assert!(journal.targets(CallKind::Deploy).is_empty());
}

#[test]
fn build_and_deploy_all_succeed() {
    let mock = MockExecutor::new();
    let journal = mock.journal();
    let runner = OperationRunner::new(Box::new(mock));

    let id = submit(&runner, build_and_deploy(&["a", "b", "c"], "aws"));
    let op = runner.wait(&id).unwrap();

    assert_eq!(op.status, OperationStatus::Completed);
    assert!(op.error.is_none());
    let results = op.build_results.unwrap();
    assert_eq!(results.len(), 3);
    assert!(results.values().all(|r| r["status"] == "success"));
    assert_eq!(op.deploy_result.unwrap()["cloud_provider"], "aws");

    let summary = op.result.unwrap();
    assert_eq!(summary["cloud_provider"], "aws");
    assert_eq!(summary["components_built"], serde_json::json!(["a", "b", "c"]));

    assert_eq!(journal.targets(CallKind::Build), vec!["a", "b", "c"]);
    assert_eq!(journal.targets(CallKind::Deploy), vec!["aws"]);
}

#[test]
fn build_and_deploy_fails_when_deploy_fails() {
    let runner = OperationRunner::new(Box::new(MockExecutor::new().fail_deploy("gcp")));
    let id = submit(&runner, build_and_deploy(&["a"], "gcp"));
    let op = runner.wait(&id).unwrap();

    assert_eq!(op.status, OperationStatus::Failed);
    assert!(op
        .error
        .as_deref()
        .unwrap()
        .starts_with("failed to deploy to gcp"));
    assert_eq!(op.build_results.unwrap().len(), 1);
    assert_eq!(op.deploy_result.unwrap()["status"], "error");
}

#[test]
fn empty_component_list_deploys_only() {
    let mock = MockExecutor::new();
    let journal = mock.journal();
    let runner = OperationRunner::new(Box::new(mock));

    let id = submit(&runner, build_and_deploy(&[], "vultr"));
    let op = runner.wait(&id).unwrap();

    assert_eq!(op.status, OperationStatus::Completed);
    assert!(op.build_results.unwrap().is_empty());
    assert!(journal.targets(CallKind::Build).is_empty());
    assert_eq!(journal.targets(CallKind::Deploy), vec!["vultr"]);
}

#[test]
fn executor_fault_becomes_failed() {
    let runner = OperationRunner::new(Box::new(MockExecutor::new().fault_build("api")));
    let id = submit(&runner, build("api"));
    let op = runner.wait(&id).unwrap();

    assert_eq!(op.status, OperationStatus::Failed);
    assert!(op.error.unwrap().contains("injected fault"));
    assert!(op.result.is_none());
    assert!(op.completed_at.is_some());
}

#[test]
fn executor_panic_becomes_failed_and_gate_recovers() {
    let runner = OperationRunner::new(Box::new(MockExecutor::new().panic_build("boom")));

    let id = submit(&runner, build("boom"));
    let op = runner.wait(&id).unwrap();
    assert_eq!(op.status, OperationStatus::Failed);
    assert!(op.error.unwrap().contains("panicked"));
    assert!(op.completed_at.is_some());

    let id = submit(&runner, build("fine"));
    assert_eq!(runner.wait(&id).unwrap().status, OperationStatus::Completed);
}

#[test]
fn fault_during_build_and_deploy_is_recorded_per_component() {
    let runner = OperationRunner::new(Box::new(MockExecutor::new().fault_build("b")));
    let id = submit(&runner, build_and_deploy(&["a", "b", "c"], "vultr"));
    let op = runner.wait(&id).unwrap();

    assert_eq!(op.status, OperationStatus::Failed);
    let results = op.build_results.unwrap();
    assert_eq!(results["b"]["status"], "error");
    assert!(!results.contains_key("c"));
}

#[test]
fn every_operation_reaches_a_consistent_terminal_state() {
    let mock = MockExecutor::new()
        .fail_build("bad")
        .fault_build("faulty")
        .fail_deploy("nowhere");
    let runner = OperationRunner::new(Box::new(mock));

    let ids = vec![
        submit(&runner, build("good")),
        submit(&runner, build("bad")),
        submit(&runner, build("faulty")),
        submit(
            &runner,
            OperationParams::Deploy {
                cloud_provider: "nowhere".to_owned(),
            },
        ),
        submit(&runner, build_and_deploy(&["good", "bad"], "vultr")),
    ];
    runner.join_all();

    for id in &ids {
        let op = runner.get(id).unwrap();
        assert!(op.status.is_terminal());
        assert!(op.completed_at.is_some());
        match op.status {
            OperationStatus::Completed => {
                assert!(op.result.is_some());
                assert!(op.error.is_none());
            }
            OperationStatus::Failed => assert!(op.error.is_some()),
            _ => unreachable!(),
        }
    }
    assert_eq!(runner.count(), 5);
}

#[test]
fn unknown_operation_is_not_found() {
    let runner = OperationRunner::new(Box::new(MockExecutor::new()));
    submit(&runner, build("api"));
    assert!(runner.get(&OperationId::from("nonexistent-id")).is_err());
    runner.join_all();
}
