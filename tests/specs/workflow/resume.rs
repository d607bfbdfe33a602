// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Restarting over the same WAL

use std::time::Duration;

use crate::prelude::*;
use wp_core::workflows::approval::ApprovalState;
use wp_core::ExternalEvent;

/// Stop a daemon and give its aborted runs a moment to unwind
async fn crash(daemon: Daemon) {
    drop(daemon);
    tokio::time::sleep(Duration::from_millis(20)).await;
}

#[tokio::test]
async fn resumed_run_skips_completed_steps() {
    let world = World::new();

    let first = world.start();
    let id = first.service.create().unwrap().id;
    first.post(&id, process());
    first.post(&id, processed(0.8));
    first.wait_for_state(&id, "Waiting For Approval").await;
    assert_eq!(first.queue.sent().len(), 1);
    crash(first).await;

    let second = world.start();
    assert_eq!(second.service.resume_unfinished().unwrap(), vec![id.clone()]);
    assert_eq!(second.engine(&id).state, ApprovalState::WaitingForApproval);

    second.post(&id, approved());
    assert!(second.finish(&id).await.success);
    assert!(
        second.queue.sent().is_empty(),
        "completed step ran again after restart"
    );
}

#[tokio::test]
async fn restart_before_the_step_result_runs_the_step_once() {
    let world = World::new();

    let first = world.start();
    let id = first.service.create().unwrap().id;
    first.post(&id, process());
    first.wait_for_step(&id, "send-to-queue-1").await;
    crash(first).await;

    // The job left before the crash; the journal remembers it
    let second = world.start();
    second.service.resume_unfinished().unwrap();
    for event in [processed(0.9), approved()] {
        second.post(&id, event);
    }

    assert!(second.finish(&id).await.success);
    assert!(second.queue.sent().is_empty());
    let step = second.store.step(&id, "send-to-queue-1").unwrap().unwrap();
    assert!(matches!(step.outcome, Some(StepOutcome::Success { .. })));
}

#[tokio::test]
async fn finished_instances_are_not_resumed() {
    let world = World::new();

    let first = world.start();
    let id = first.service.create().unwrap().id;
    first.post(&id, ExternalEvent::named("banana"));
    first.finish(&id).await;
    crash(first).await;

    let second = world.start();
    assert!(second.service.resume_unfinished().unwrap().is_empty());
    assert_eq!(second.record(&id).run_status, Some(RunStatus::Errored));
}
