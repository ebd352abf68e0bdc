//! End-to-end admission, queueing and drain scenarios against a mocked execution API

use conductor_daemon::config::DrainerConfig;
use conductor_daemon::drainer::QueueDrainer;
use conductor_daemon::execution::{RetryRequest, RunDefaults, TriggerRequest};
use conductor_daemon::orchestrator::{RetryOutcome, TriggerOutcome};
use conductor_daemon::{Dispatcher, InMemoryStore, IntegratorClient, Records, Submission};
use conductor_types::{execution_state, ConfigEntry, ConfigKey, WorkflowId};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use wiremock::matchers::{body_partial_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

async fn setup(max_concurrent: i64) -> (Dispatcher, Arc<QueueDrainer>, tokio::sync::mpsc::Receiver<()>, MockServer) {
    let mock = MockServer::start().await;
    for (app, id) in [("a", "wf-a"), ("b", "wf-b"), ("c", "wf-c"), ("d", "wf-d")] {
        Mock::given(method("POST"))
            .and(path("/workflows/create-app/run"))
            .and(body_partial_json(json!({ "app_name": app })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "workflow_id": id })))
            .mount(&mock)
            .await;
    }

    let records = Records::new(Arc::new(InMemoryStore::new()));
    records
        .seed_config(&ConfigEntry::new(ConfigKey::MaxConcurrent, max_concurrent))
        .await
        .unwrap();

    let api = Arc::new(IntegratorClient::new(&mock.uri(), 5).unwrap());
    let dispatcher = Dispatcher::new(records.clone(), api, RunDefaults::default(), 8);
    let (drainer, nudge_rx) = QueueDrainer::new(
        DrainerConfig::default(),
        records,
        dispatcher.admission().clone(),
        dispatcher.orchestrator(),
    );
    let dispatcher = dispatcher.with_drainer(drainer.clone());

    (dispatcher, drainer, nudge_rx, mock)
}

fn triggered_id(submission: &Submission) -> &str {
    match submission {
        Submission::Triggered(TriggerOutcome::Succeeded { workflow_id, .. }) => workflow_id.as_str(),
        other => panic!("expected a triggered workflow, got {:?}", other),
    }
}

#[tokio::test]
async fn capacity_conflict_and_drain() {
    let (dispatcher, drainer, _rx, _mock) = setup(2).await;

    let a = dispatcher.submit(TriggerRequest::new("a")).await.unwrap();
    let b = dispatcher.submit(TriggerRequest::new("b")).await.unwrap();
    assert_eq!(triggered_id(&a), "wf-a");
    assert_eq!(triggered_id(&b), "wf-b");

    let c = dispatcher.submit(TriggerRequest::new("c")).await.unwrap();
    assert_eq!(
        c,
        Submission::Queued {
            position: 1,
            active: 2,
            limit: 2
        }
    );

    // an app with a live run is rejected before the capacity check
    let again = dispatcher.submit(TriggerRequest::new("a")).await.unwrap();
    assert_eq!(
        again,
        Submission::Rejected {
            workflow_id: WorkflowId::new("wf-a")
        }
    );

    // nothing moves while the cap is reached
    assert!(drainer.drain_once().await.unwrap().is_empty());

    dispatcher
        .complete_run(&WorkflowId::new("wf-a"), 1, None, None)
        .await
        .unwrap();
    let report = drainer.drain_once().await.unwrap();
    assert_eq!(report.dispatched, vec![1]);

    let status = dispatcher.status().await.unwrap();
    assert_eq!((status.active, status.queued), (2, 0));
    let run = dispatcher
        .records()
        .find_run(&WorkflowId::new("wf-c"), 1)
        .await
        .unwrap()
        .unwrap();
    assert!(run.is_active());
}

#[tokio::test]
async fn queue_positions_are_sequential() {
    let (dispatcher, _drainer, _rx, _mock) = setup(1).await;

    dispatcher.submit(TriggerRequest::new("a")).await.unwrap();
    let mut positions = Vec::new();
    for app in ["b", "c", "d"] {
        match dispatcher.submit(TriggerRequest::new(app)).await.unwrap() {
            Submission::Queued { position, .. } => positions.push(position),
            other => panic!("expected queued, got {:?}", other),
        }
    }
    assert_eq!(positions, vec![1, 2, 3]);

    // a cancelled position is never reused
    dispatcher.cancel_queued(3).await.unwrap();
    match dispatcher.submit(TriggerRequest::new("d")).await.unwrap() {
        Submission::Queued { position, .. } => assert_eq!(position, 4),
        other => panic!("expected queued, got {:?}", other),
    }
}

#[tokio::test]
async fn raising_the_cap_lets_the_queue_through() {
    let (dispatcher, drainer, _rx, _mock) = setup(1).await;

    dispatcher.submit(TriggerRequest::new("a")).await.unwrap();
    dispatcher.submit(TriggerRequest::new("b")).await.unwrap();
    dispatcher.submit(TriggerRequest::new("c")).await.unwrap();

    dispatcher
        .update_config("max_concurrent", &json!("2"))
        .await
        .unwrap();

    let report = drainer.drain_once().await.unwrap();
    assert_eq!(report.dispatched, vec![1]);
    assert_eq!(dispatcher.status().await.unwrap().queued, 1);
}

#[tokio::test]
async fn retry_numbers_follow_the_lineage() {
    let (dispatcher, _drainer, _rx, _mock) = setup(8).await;

    dispatcher.submit(TriggerRequest::new("a")).await.unwrap();

    for expected in 2..=3 {
        let outcome = dispatcher
            .retry(RetryRequest::new("a", WorkflowId::new("wf-a")))
            .await
            .unwrap();
        match outcome {
            RetryOutcome::Succeeded {
                run_number,
                new_lineage,
                ..
            } => {
                assert_eq!(run_number, expected);
                assert!(!new_lineage);
            }
            RetryOutcome::Failed(failure) => panic!("retry failed: {}", failure.details),
        }
    }

    let runs = dispatcher
        .records()
        .runs_for_workflow(&WorkflowId::new("wf-a"))
        .await
        .unwrap();
    let states: Vec<_> = runs.iter().map(|r| r.execution_state.as_str()).collect();
    assert_eq!(
        states,
        vec![
            execution_state::SUPERSEDED,
            execution_state::SUPERSEDED,
            execution_state::PENDING
        ]
    );
    assert_eq!(dispatcher.status().await.unwrap().active, 1);
}

#[tokio::test]
async fn background_drainer_reacts_to_completion() {
    let (dispatcher, drainer, nudge_rx, _mock) = setup(1).await;

    dispatcher.submit(TriggerRequest::new("a")).await.unwrap();
    dispatcher.submit(TriggerRequest::new("b")).await.unwrap();

    let handle = tokio::spawn(drainer.clone().start(nudge_rx));

    dispatcher
        .complete_run(&WorkflowId::new("wf-a"), 1, None, None)
        .await
        .unwrap();

    let mut promoted = false;
    for _ in 0..50 {
        if dispatcher.status().await.unwrap().queued == 0 {
            promoted = true;
            break;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    assert!(promoted, "queued workflow was not dispatched");

    let run = dispatcher
        .records()
        .find_run(&WorkflowId::new("wf-b"), 1)
        .await
        .unwrap();
    assert!(run.is_some());

    drainer.stop().await;
    drainer.nudge();
    tokio::time::timeout(Duration::from_secs(2), handle)
        .await
        .unwrap()
        .unwrap();
}
