// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use std::collections::HashSet;

#[test]
fn uuid_instances_do_not_collide() {
    let ids: HashSet<InstanceId> = (0..64).map(|_| UuidIdGen.next_instance()).collect();
    assert_eq!(ids.len(), 64);
    assert!(ids.iter().all(|id| uuid::Uuid::parse_str(id.as_str()).is_ok()));
}

#[test]
fn sequential_instances_count_from_one() {
    let ids = SequentialIdGen::default();
    assert_eq!(ids.next_instance(), InstanceId::new("wf-1"));
    assert_eq!(ids.next_instance(), InstanceId::new("wf-2"));
}

#[test]
fn sequential_clones_share_a_counter() {
    let service_ids = SequentialIdGen::new("order");
    let test_ids = service_ids.clone();
    assert_eq!(service_ids.next(), "order-1");
    assert_eq!(test_ids.next(), "order-2");
}

#[test]
fn instance_id_is_a_bare_json_string() {
    let id: InstanceId = "wf-7".into();
    assert_eq!(serde_json::to_string(&id).unwrap(), "\"wf-7\"");
    let back: InstanceId = serde_json::from_str("\"wf-7\"").unwrap();
    assert_eq!(back, id);
    assert_eq!(format!("instance {id}"), "instance wf-7");
}
