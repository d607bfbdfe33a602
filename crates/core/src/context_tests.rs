// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use serde_json::json;

#[test]
fn apply_sets_and_overwrites_keys() {
    let mut ctx = Context::new();
    ctx.apply(Delta::new().set(OUTPUT, 0.25).set(ERROR_MESSAGE, "first"));
    ctx.apply(Delta::new().set(ERROR_MESSAGE, "second"));

    assert_eq!(ctx.get_f64(OUTPUT), Some(0.25));
    assert_eq!(ctx.error_message(), Some("second"));
    assert_eq!(ctx.len(), 2);
}

#[test]
fn null_value_removes_key() {
    let mut ctx = Context::new();
    ctx.apply(Delta::new().set(ERROR_MESSAGE, "boom"));
    ctx.apply(Delta::new().unset(ERROR_MESSAGE));

    assert!(ctx.is_empty());
}

#[test]
fn context_serializes_as_plain_object() {
    let mut ctx = Context::new();
    ctx.apply(Delta::new().set("attempt", 2).set("tags", json!(["a", "b"])));

    let value = serde_json::to_value(&ctx).unwrap();
    assert_eq!(value, json!({"attempt": 2, "tags": ["a", "b"]}));

    let back: Context = serde_json::from_value(value).unwrap();
    assert_eq!(back, ctx);
}
