// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::context::Context;
use crate::machine::Status;
use crate::step::StepRequest;
use crate::workflows::approval::{self, ApprovalEvent, ApprovalState};
use proptest::prelude::*;
use serde_json::json;

fn waiting_state() -> EngineState<ApprovalState> {
    let machine = approval::machine().unwrap();
    let state = machine.start(Context::new()).unwrap();
    let state = machine.transition(&state, &ApprovalEvent::Process).unwrap();
    machine
        .transition(&state, &ApprovalEvent::Processed { output: 0.8 })
        .unwrap()
}

#[test]
fn snapshot_has_versioned_envelope() {
    let machine = approval::machine().unwrap();
    let value = machine.snapshot(&waiting_state()).unwrap();

    assert_eq!(value["version"], json!(SNAPSHOT_VERSION));
    assert_eq!(value["machine"], json!("approval"));
    assert_eq!(value["state"], json!("Waiting For Approval"));
    assert_eq!(value["status"], json!("active"));
    assert_eq!(value["stepSeq"], json!(1));
    assert_eq!(value["context"]["output"], json!(0.8));
}

#[test]
fn restore_accepts_snapshot_without_optional_fields() {
    let machine = approval::machine().unwrap();
    let value = json!({
        "version": 1,
        "machine": "approval",
        "state": "Unprocessed",
        "context": {},
        "status": "active"
    });
    let state = machine.restore(&value).unwrap();

    assert_eq!(state.state, ApprovalState::Unprocessed);
    assert_eq!(state.status, Status::Active);
    assert_eq!(state.step_seq, 0);
    assert!(state.pending.is_empty());
    assert!(state.error.is_none());
}

#[test]
fn restore_ignores_unknown_fields() {
    let machine = approval::machine().unwrap();
    let mut value = machine.snapshot(&waiting_state()).unwrap();
    value["addedLater"] = json!({ "anything": true });
    assert_eq!(machine.restore(&value).unwrap(), waiting_state());
}

#[test]
fn restore_rejects_newer_version() {
    let machine = approval::machine().unwrap();
    let mut value = machine.snapshot(&waiting_state()).unwrap();
    value["version"] = json!(SNAPSHOT_VERSION + 1);

    let err = machine.restore(&value).unwrap_err();
    assert!(matches!(err, SnapshotError::UnsupportedVersion { found } if found == SNAPSHOT_VERSION + 1));
}

#[test]
fn restore_rejects_other_machine() {
    let machine = approval::machine().unwrap();
    let mut value = machine.snapshot(&waiting_state()).unwrap();
    value["machine"] = json!("billing");

    let err = machine.restore(&value).unwrap_err();
    assert!(matches!(err, SnapshotError::MachineMismatch { found, .. } if found == "billing"));
}

#[test]
fn restore_rejects_unknown_state() {
    let machine = approval::machine().unwrap();
    let mut value = machine.snapshot(&waiting_state()).unwrap();
    value["state"] = json!("Somewhere Else");
    assert!(matches!(machine.restore(&value), Err(SnapshotError::Json(_))));
}

#[test]
fn pending_steps_survive_round_trip() {
    let machine = approval::machine().unwrap();
    let state = machine.start(Context::new()).unwrap();
    let state = machine.transition(&state, &ApprovalEvent::Process).unwrap();
    assert_eq!(state.pending, vec![StepRequest::new("send-to-queue", 1)]);

    let restored = machine.restore(&machine.snapshot(&state).unwrap()).unwrap();
    assert_eq!(restored.pending, state.pending);
}

fn arb_event() -> impl Strategy<Value = Result<ApprovalEvent, String>> {
    prop_oneof![
        Just(Ok(ApprovalEvent::Process)),
        (0u32..100).prop_map(|n| Ok(ApprovalEvent::Processed {
            output: f64::from(n) / 100.0
        })),
        Just(Ok(ApprovalEvent::Approved)),
        Just(Ok(ApprovalEvent::Rejected)),
        "[a-z ]{0,12}".prop_map(|m| Ok(ApprovalEvent::Error { error_message: m })),
        "[a-z]{1,8}".prop_map(Err),
    ]
}

proptest! {
    #[test]
    fn snapshot_round_trips_reachable_states(events in proptest::collection::vec(arb_event(), 0..12)) {
        let machine = approval::machine().unwrap();
        let mut state = machine.start(Context::new()).unwrap();

        for event in events {
            if !state.is_active() {
                break;
            }
            state = match event {
                Ok(event) => machine.transition(&state, &event).unwrap(),
                Err(unknown) => machine.transition_unrecognized(&state, &unknown).unwrap(),
            };
            let restored = machine.restore(&machine.snapshot(&state).unwrap()).unwrap();
            prop_assert_eq!(&restored, &state);
        }
    }
}
