// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Declarative state machines
//!
//! A [`Machine`] is a static transition table over a workflow's state enum and
//! event enum. Transitions are pure: they take an [`EngineState`] and an event
//! and return the next engine state. Requested steps are recorded in the
//! state's pending list for the orchestrator to carry out.

mod definition;
mod engine;
mod snapshot;

pub use definition::{Action, DefinitionError, Machine, MachineBuilder, Rule, Trigger};
pub use engine::{EngineState, Status, TransitionError, MAX_EVENTLESS_HOPS};
pub use snapshot::{Snapshot, SnapshotError, SNAPSHOT_VERSION};

use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fmt::Debug;
use std::hash::Hash;

/// Whether a state is terminal, and how
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StateKind {
    Normal,
    /// Terminal success
    Final,
    /// Terminal failure
    Error,
}

impl StateKind {
    pub fn is_terminal(self) -> bool {
        !matches!(self, StateKind::Normal)
    }
}

/// The closed state set of one workflow
pub trait WorkflowState:
    Copy + Eq + Hash + Debug + Serialize + DeserializeOwned + Send + Sync + 'static
{
    /// Human readable name, as shown to observers
    fn name(&self) -> &'static str;

    fn kind(&self) -> StateKind;

    /// Every state, in declaration order
    fn all() -> &'static [Self];
}
