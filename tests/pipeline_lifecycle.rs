//! End-to-end lifecycle tests against a scripted in-memory service

#![cfg(feature = "mock-service")]

mod common;

use automl_client::{ClientMessage, MockServiceBackend, RunPhase, TaskStatus};
use common::{spawn_client, valid_config, wait_for, wait_for_phase};
use std::time::Duration;

#[test]
fn test_full_pipeline_reaches_done_with_stable_report_id() {
    let mock = MockServiceBackend::new().with_status_script(&[
        TaskStatus::Running,
        TaskStatus::Running,
        TaskStatus::Running,
        TaskStatus::Succeeded,
    ]);
    let (session, worker) = spawn_client(mock);

    session
        .start_upload(b"feature_a,feature_b,target\n1,2,0\n".to_vec(), "data.csv")
        .unwrap();
    let messages = wait_for_phase(&session, RunPhase::Uploaded);
    assert!(messages
        .iter()
        .any(|m| matches!(m, ClientMessage::Metadata(meta) if meta.has_column("target"))));

    session.submit(valid_config()).unwrap();
    let messages = wait_for_phase(&session, RunPhase::Done);

    // Every snapshot from submission onward carries the same report id
    let report_ids: Vec<_> = messages
        .iter()
        .filter_map(|m| match m {
            ClientMessage::Lifecycle(s) => s.report_id.clone(),
            _ => None,
        })
        .collect();
    assert!(!report_ids.is_empty());
    assert!(report_ids.iter().all(|id| id == &report_ids[0]));

    session.fetch_report().unwrap();
    let messages = wait_for(&session, |m| matches!(m, ClientMessage::Report(_)));
    let report = messages
        .iter()
        .find_map(|m| match m {
            ClientMessage::Report(payload) => Some(payload),
            _ => None,
        })
        .unwrap();
    assert!(report.data.get("accuracy").is_some());

    // The trained model can be applied to new data through the same session
    session
        .apply_model(
            report_ids[0].clone(),
            serde_json::json!({ "examples": [{ "feature_a": 1, "feature_b": 2 }] }),
        )
        .unwrap();
    wait_for(&session, |m| matches!(m, ClientMessage::Predictions(_)));

    session.shutdown().unwrap();
    worker.join().unwrap();
}

#[test]
fn test_submit_failure_then_retry_resets_to_idle() {
    let mock = MockServiceBackend::new().with_submit_failures(1);
    let (session, worker) = spawn_client(mock);

    session.start_upload(b"a,target\n1,0\n".to_vec(), "data.csv").unwrap();
    wait_for_phase(&session, RunPhase::Uploaded);

    session.submit(valid_config()).unwrap();
    let messages = wait_for_phase(&session, RunPhase::Failed);

    // A failed submission records neither identifier
    let failed = messages
        .iter()
        .find_map(|m| match m {
            ClientMessage::Lifecycle(s) if s.phase == RunPhase::Failed => Some(s),
            _ => None,
        })
        .unwrap();
    assert!(failed.task_id.is_none());
    assert!(failed.report_id.is_none());

    session.retry().unwrap();
    let messages = wait_for_phase(&session, RunPhase::Idle);
    let idle = messages
        .iter()
        .find_map(|m| match m {
            ClientMessage::Lifecycle(s) if s.phase == RunPhase::Idle => Some(s),
            _ => None,
        })
        .unwrap();
    assert!(idle.dataset_id.is_none());
    assert!(idle.task_id.is_none());
    assert!(idle.report_id.is_none());
    assert!(idle.last_error.is_none());

    session.shutdown().unwrap();
    worker.join().unwrap();
}

#[test]
fn test_cancel_during_polling_stops_status_transitions() {
    // The task would report Running forever
    let mock = MockServiceBackend::new().with_status_script(&[TaskStatus::Running]);
    let (session, worker) = spawn_client(mock);

    session.start_upload(b"a,target\n1,0\n".to_vec(), "data.csv").unwrap();
    wait_for_phase(&session, RunPhase::Uploaded);
    session.submit(valid_config()).unwrap();
    wait_for_phase(&session, RunPhase::Polling);

    session.cancel().unwrap();
    let messages = wait_for_phase(&session, RunPhase::Failed);
    let cancelled = messages
        .iter()
        .find_map(|m| match m {
            ClientMessage::Lifecycle(s) if s.phase == RunPhase::Failed => Some(s),
            _ => None,
        })
        .unwrap();
    assert_eq!(cancelled.last_error.as_deref(), Some("cancelled"));

    // No status-derived transition arrives after cancellation
    std::thread::sleep(Duration::from_millis(100));
    for message in session.drain() {
        if let ClientMessage::Lifecycle(snapshot) = message {
            assert_eq!(snapshot.phase, RunPhase::Failed);
        }
    }

    session.shutdown().unwrap();
    worker.join().unwrap();
}

#[test]
fn test_poll_budget_exhaustion_abandons_the_run() {
    let mock = MockServiceBackend::new().with_transient_status_failures(20);
    let (session, worker) = spawn_client(mock);

    session.start_upload(b"a,target\n1,0\n".to_vec(), "data.csv").unwrap();
    wait_for_phase(&session, RunPhase::Uploaded);
    session.submit(valid_config()).unwrap();

    let messages = wait_for_phase(&session, RunPhase::Failed);
    let failed = messages
        .iter()
        .find_map(|m| match m {
            ClientMessage::Lifecycle(s) if s.phase == RunPhase::Failed => Some(s),
            _ => None,
        })
        .unwrap();
    assert!(failed
        .last_error
        .as_deref()
        .unwrap()
        .contains("abandoned"));
    // The identifiers survive for inspection until retry
    assert!(failed.task_id.is_some());
    assert!(failed.report_id.is_some());

    session.shutdown().unwrap();
    worker.join().unwrap();
}

#[test]
fn test_report_pending_until_ready() {
    let mock = MockServiceBackend::new()
        .with_status_script(&[TaskStatus::Succeeded])
        .with_report_not_ready(1);
    let (session, worker) = spawn_client(mock);

    session.start_upload(b"a,target\n1,0\n".to_vec(), "data.csv").unwrap();
    wait_for_phase(&session, RunPhase::Uploaded);
    session.submit(valid_config()).unwrap();
    wait_for_phase(&session, RunPhase::Done);

    session.fetch_report().unwrap();
    wait_for(&session, |m| {
        matches!(m, ClientMessage::ReportPending { .. })
    });

    session.fetch_report().unwrap();
    wait_for(&session, |m| matches!(m, ClientMessage::Report(_)));

    session.shutdown().unwrap();
    worker.join().unwrap();
}
