// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! wp-core: pure building blocks of the Waypoint workflow engine
//!
//! This crate provides:
//! - Declarative state machines with a pure transition function
//! - Workflow context, events and step requests
//! - Versioned engine snapshots
//! - Clock and id abstractions
//! - The built-in approval workflow

pub mod clock;
pub mod context;
pub mod event;
pub mod id;
pub mod machine;
pub mod step;
pub mod workflows;

pub use clock::{Clock, FakeClock, SystemClock};
pub use context::{Context, Delta};
pub use event::{DecodeError, ExternalEvent, WorkflowEvent};
pub use id::{IdGen, InstanceId, SequentialIdGen, UuidIdGen};
pub use machine::{
    Action, DefinitionError, EngineState, Machine, Rule, SnapshotError, StateKind, Status,
    TransitionError, WorkflowState,
};
pub use step::StepRequest;
