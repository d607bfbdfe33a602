// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Approval workflow driven through the service

use crate::prelude::*;
use wp_core::workflows::approval::ApprovalState;
use wp_core::ExternalEvent;

#[tokio::test]
async fn approval_walks_every_state_to_finished() {
    let world = World::new();
    let daemon = world.start();

    let id = daemon.service.create().unwrap().id;
    assert_eq!(daemon.record(&id).state.as_deref(), Some("Unprocessed"));

    daemon.post(&id, process());
    daemon.wait_for_state(&id, "Sending To Queue").await;

    daemon.post(&id, processed(0.8));
    daemon.wait_for_state(&id, "Waiting For Approval").await;
    let engine = daemon.engine(&id);
    assert_eq!(engine.state, ApprovalState::WaitingForApproval);
    assert_eq!(
        engine.context.error_message(),
        Some("Output 0.80 passed the 0.5 threshold, waiting for approval")
    );

    daemon.post(&id, approved());
    let outcome = daemon.finish(&id).await;

    assert!(outcome.success, "{outcome:?}");
    let record = daemon.record(&id);
    assert_eq!(record.state.as_deref(), Some("Finished"));
    assert_eq!(record.run_status, Some(RunStatus::Completed));
    assert_eq!(daemon.queue.sent().len(), 1);
    assert_eq!(daemon.queue.sent()[0].workflow_instance_id, id);
}

#[tokio::test]
async fn rejection_reenters_sending_and_enqueues_again() {
    let world = World::new();
    let daemon = world.start();
    let id = daemon.service.create().unwrap().id;

    for event in [process(), processed(0.9), rejected()] {
        daemon.post(&id, event);
    }
    daemon.post(&id, processed(0.6));
    daemon.wait_for_state(&id, "Waiting For Approval").await;
    daemon.post(&id, approved());

    assert!(daemon.finish(&id).await.success);
    assert_eq!(daemon.queue.sent().len(), 2);
    for name in ["send-to-queue-1", "send-to-queue-2"] {
        let step = daemon.store.step(&id, name).unwrap().unwrap();
        assert!(
            matches!(step.outcome, Some(StepOutcome::Success { .. })),
            "{name}: {step:?}"
        );
    }
}

#[tokio::test]
async fn low_output_is_reprocessed() {
    let world = World::new();
    let daemon = world.start();
    let id = daemon.service.create().unwrap().id;

    for event in [process(), processed(0.2), processed(0.7), approved()] {
        daemon.post(&id, event);
    }

    assert!(daemon.finish(&id).await.success);
    assert_eq!(daemon.queue.sent().len(), 2);
}

#[tokio::test]
async fn unknown_event_ends_in_error_state() {
    let world = World::new();
    let daemon = world.start();
    let id = daemon.service.create().unwrap().id;

    daemon.post(&id, process());
    daemon.post(&id, ExternalEvent::named("banana"));
    let outcome = daemon.finish(&id).await;

    assert_eq!(outcome.error.as_deref(), Some("Unknown event: banana"));
    let record = daemon.record(&id);
    assert_eq!(record.state.as_deref(), Some("Error"));
    assert_eq!(record.run_status, Some(RunStatus::Errored));
    assert_eq!(record.status_message.as_deref(), Some("Unknown event: banana"));
}

#[tokio::test]
async fn unknown_event_from_initial_state_ends_in_error_state() {
    let world = World::new();
    let daemon = world.start();
    let id = daemon.service.create().unwrap().id;

    daemon.post(&id, ExternalEvent::named("banana"));

    let outcome = daemon.finish(&id).await;
    assert_eq!(outcome.error.as_deref(), Some("Unknown event: banana"));
    assert!(daemon.queue.sent().is_empty());
}

#[tokio::test]
async fn event_timeout_fails_the_run() {
    let mut world = World::new();
    world.run.event_timeout = std::time::Duration::from_millis(50);
    let daemon = world.start();
    let id = daemon.service.create().unwrap().id;

    let outcome = daemon.finish(&id).await;

    assert!(!outcome.success);
    assert_eq!(daemon.record(&id).run_status, Some(RunStatus::Errored));
}

#[tokio::test]
async fn finished_instances_are_removed_unless_retained() {
    let mut world = World::new();
    world.run.retain_finished = false;
    let daemon = world.start();
    let id = daemon.service.create().unwrap().id;

    for event in [process(), processed(0.9), approved()] {
        daemon.post(&id, event);
    }
    assert!(daemon.finish(&id).await.success);

    assert!(daemon.service.list().unwrap().is_empty());
}
