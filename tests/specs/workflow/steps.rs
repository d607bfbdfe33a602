// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Step memoization and failure routing

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use crate::prelude::*;
use wp_adapters::FakeJobQueue;
use wp_core::InstanceId;
use wp_engine::{StepError, StepFailure, StepMemoizer};

#[tokio::test]
async fn fatal_step_is_never_attempted_again() {
    let world = World::new();
    let memo = StepMemoizer::new(Arc::new(world.open_store()));
    let id = InstanceId::new("wf-d");
    let calls = Arc::new(AtomicUsize::new(0));

    let attempt = || {
        let calls = Arc::clone(&calls);
        move || async move {
            calls.fetch_add(1, Ordering::SeqCst);
            Err::<(), _>(StepFailure::Fatal("bad payload".to_string()))
        }
    };

    let first = memo
        .run_step(&id, "send-to-queue-1", &world.steps, attempt())
        .await;
    assert!(matches!(first, Err(StepError::Fatal { .. })), "{first:?}");

    // A manual retry, even from a fresh process, sees the recorded failure
    drop(memo);
    let memo = StepMemoizer::new(Arc::new(world.open_store()));
    let retry = memo
        .run_step(&id, "send-to-queue-1", &world.steps, attempt())
        .await;
    match retry {
        Err(StepError::AlreadyFailed { message }) => assert_eq!(message, "bad payload"),
        other => panic!("expected AlreadyFailed, got {other:?}"),
    }
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn rejected_job_routes_the_workflow_to_error() {
    let world = World::new();
    let queue = FakeJobQueue::new();
    queue.fail_always(QueueError::Rejected("queue closed".into()));
    let daemon = world.start_with(queue);
    let id = daemon.service.create().unwrap().id;

    daemon.post(&id, process());
    let outcome = daemon.finish(&id).await;

    assert_eq!(
        outcome.error.as_deref(),
        Some("step error (send-to-queue): job rejected: queue closed")
    );
    assert_eq!(daemon.record(&id).state.as_deref(), Some("Error"));
    assert_eq!(daemon.queue.attempts(), 1);
    let step = daemon.store.step(&id, "send-to-queue-1").unwrap().unwrap();
    assert!(matches!(step.outcome, Some(StepOutcome::Failed { .. })));
}

#[tokio::test]
async fn unavailable_queue_is_retried_until_it_recovers() {
    let world = World::new();
    let queue = FakeJobQueue::new();
    queue.fail_next(QueueError::Unavailable("broker restarting".into()));
    let daemon = world.start_with(queue);
    let id = daemon.service.create().unwrap().id;

    for event in [process(), processed(0.9), approved()] {
        daemon.post(&id, event);
    }

    assert!(daemon.finish(&id).await.success);
    assert_eq!(daemon.queue.attempts(), 2);
    assert_eq!(daemon.queue.sent().len(), 1);
    let step = daemon.store.step(&id, "send-to-queue-1").unwrap().unwrap();
    assert_eq!(step.attempts, 1);
}

#[tokio::test]
async fn unavailable_queue_gives_up_after_max_attempts() {
    let world = World::new();
    let queue = FakeJobQueue::new();
    queue.fail_always(QueueError::Unavailable("broker down".into()));
    let daemon = world.start_with(queue);
    let id = daemon.service.create().unwrap().id;

    daemon.post(&id, process());
    let outcome = daemon.finish(&id).await;

    let error = outcome.error.unwrap();
    assert!(error.contains("gave up after 3 attempts"), "{error}");
    assert_eq!(daemon.queue.attempts(), 3);
}
