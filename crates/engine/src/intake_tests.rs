// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use std::sync::Arc;

fn id(s: &str) -> InstanceId {
    InstanceId::new(s)
}

fn any(_: &ExternalEvent) -> bool {
    true
}

const WAIT: Duration = Duration::from_secs(5);

#[tokio::test]
async fn queued_event_is_returned_immediately() {
    let intake = EventIntake::new();
    intake.open(&id("wf-1"));
    intake.send(&id("wf-1"), ExternalEvent::named("approved")).unwrap();

    let event = intake.wait_for_event(&id("wf-1"), any, WAIT).await.unwrap();
    assert_eq!(event.event_type, "approved");
    assert_eq!(intake.pending(&id("wf-1")), 0);
}

#[tokio::test]
async fn waiter_wakes_on_send() {
    let intake = Arc::new(EventIntake::new());
    intake.open(&id("wf-1"));
    let waiter = {
        let intake = Arc::clone(&intake);
        tokio::spawn(async move { intake.wait_for_event(&id("wf-1"), any, WAIT).await })
    };

    tokio::time::sleep(Duration::from_millis(20)).await;
    intake.send(&id("wf-1"), ExternalEvent::named("process")).unwrap();

    let event = waiter.await.unwrap().unwrap();
    assert_eq!(event.event_type, "process");
}

#[tokio::test]
async fn events_are_delivered_in_order() {
    let intake = EventIntake::new();
    intake.open(&id("wf-1"));
    for name in ["a", "b", "c"] {
        intake.send(&id("wf-1"), ExternalEvent::named(name)).unwrap();
    }

    let mut seen = Vec::new();
    for _ in 0..3 {
        seen.push(intake.wait_for_event(&id("wf-1"), any, WAIT).await.unwrap().event_type);
    }
    assert_eq!(seen, vec!["a", "b", "c"]);
}

#[tokio::test]
async fn rejected_events_stay_queued() {
    let intake = EventIntake::new();
    intake.open(&id("wf-1"));
    intake.send(&id("wf-1"), ExternalEvent::named("noise")).unwrap();
    intake.send(&id("wf-1"), ExternalEvent::named("approved")).unwrap();

    let event = intake
        .wait_for_event(&id("wf-1"), |e: &ExternalEvent| e.event_type == "approved", WAIT)
        .await
        .unwrap();
    assert_eq!(event.event_type, "approved");
    assert_eq!(intake.pending(&id("wf-1")), 1);

    let next = intake.wait_for_event(&id("wf-1"), any, WAIT).await.unwrap();
    assert_eq!(next.event_type, "noise");
}

#[tokio::test]
async fn mailboxes_are_isolated() {
    let intake = EventIntake::new();
    intake.open(&id("wf-2"));
    intake.send(&id("wf-2"), ExternalEvent::named("approved")).unwrap();

    let err = intake
        .wait_for_event(&id("wf-1"), any, Duration::from_millis(20))
        .await
        .unwrap_err();
    assert_eq!(
        err,
        IntakeError::TimedOut {
            id: id("wf-1"),
            timeout: Duration::from_millis(20)
        }
    );
    assert_eq!(intake.pending(&id("wf-2")), 1);
}

#[tokio::test]
async fn close_discards_queued_events() {
    let intake = EventIntake::new();
    intake.open(&id("wf-1"));
    intake.send(&id("wf-1"), ExternalEvent::named("approved")).unwrap();
    intake.close(&id("wf-1"));
    assert_eq!(intake.pending(&id("wf-1")), 0);
    assert!(!intake.is_open(&id("wf-1")));

    intake.open(&id("wf-2"));
    intake.send(&id("wf-2"), ExternalEvent::named("approved")).unwrap();
    intake.clear();
    assert_eq!(intake.pending(&id("wf-2")), 0);
}

#[test]
fn send_to_unopened_mailbox_is_refused() {
    let intake = EventIntake::new();
    let err = intake
        .send(&id("wf-1"), ExternalEvent::named("approved"))
        .unwrap_err();
    assert_eq!(err, IntakeError::Closed { id: id("wf-1") });
    assert!(!intake.is_open(&id("wf-1")));
    assert_eq!(intake.pending(&id("wf-1")), 0);
}

#[test]
fn send_after_close_does_not_reopen() {
    let intake = EventIntake::new();
    intake.open(&id("wf-1"));
    intake.close(&id("wf-1"));

    assert!(intake.send(&id("wf-1"), ExternalEvent::named("late")).is_err());
    assert!(!intake.is_open(&id("wf-1")));
}

#[test]
fn reopening_keeps_queued_events() {
    let intake = EventIntake::new();
    intake.open(&id("wf-1"));
    intake.send(&id("wf-1"), ExternalEvent::named("approved")).unwrap();
    intake.open(&id("wf-1"));
    assert_eq!(intake.pending(&id("wf-1")), 1);
}
