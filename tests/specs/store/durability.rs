// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Finished workflows on disk

use std::io::Write;

use crate::prelude::*;
use similar_asserts::assert_eq as assert_same;
use wp_core::workflows::approval::ApprovalState;
use wp_core::InstanceId;
use wp_storage::InstanceStore;

/// Run one instance to `Finished` and return its id
async fn finished_instance(world: &World) -> InstanceId {
    let daemon = world.start();
    let id = daemon.service.create().unwrap().id;
    for event in [process(), processed(0.75), approved()] {
        daemon.post(&id, event);
    }
    assert!(daemon.finish(&id).await.success);
    id
}

#[tokio::test]
async fn finished_instance_survives_reopen() {
    let world = World::new();
    let id = finished_instance(&world).await;

    let daemon = world.start();
    let record = daemon.record(&id);
    assert_eq!(record.state.as_deref(), Some("Finished"));
    assert_eq!(record.run_status, Some(RunStatus::Completed));
    assert_eq!(daemon.engine(&id).state, ApprovalState::Finished);

    let step = daemon.store.step(&id, "send-to-queue-1").unwrap().unwrap();
    assert!(matches!(step.outcome, Some(StepOutcome::Success { .. })));
}

#[tokio::test]
async fn torn_tail_is_ignored_on_reopen() {
    let world = World::new();
    let id = finished_instance(&world).await;
    let before = world.open_store().get(&id).unwrap().unwrap();

    let mut file = std::fs::OpenOptions::new()
        .append(true)
        .open(world.wal_path())
        .unwrap();
    file.write_all(br#"{"sequence":999,"timestamp"#).unwrap();
    drop(file);

    let store = world.open_store();
    assert_same!(store.get(&id).unwrap().unwrap(), before);

    // Writes after the torn line are readable on the next open
    let other = InstanceId::new("wf-after");
    store
        .upsert(&other, wp_storage::InstancePatch::new().state("Unprocessed"))
        .unwrap();
    drop(store);
    assert!(world.open_store().get(&other).unwrap().is_some());
}

#[tokio::test]
async fn compaction_preserves_records_and_steps() {
    let world = World::new();
    let id = finished_instance(&world).await;

    let store = world.open_store();
    let before = store.get(&id).unwrap().unwrap();
    let result = store.compact().unwrap();
    assert!(result.entries_after < result.entries_before, "{result:?}");
    drop(store);

    let store = world.open_store();
    assert_same!(store.get(&id).unwrap().unwrap(), before);
    assert!(store.step(&id, "send-to-queue-1").unwrap().is_some());
}
