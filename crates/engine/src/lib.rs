// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! Waypoint execution engine
//!
//! Runs workflow instances to completion: steps are memoized in the journal,
//! events arrive through per-instance mailboxes and every state change is
//! persisted and broadcast.

mod broadcast;
mod config;
mod intake;
mod memo;
mod orchestrator;
mod service;
mod steps;

pub use broadcast::{Broadcaster, ObserverId, Update, UpdateKind, DEFAULT_OBSERVER_CAPACITY};
pub use config::RunConfig;
pub use intake::{EventIntake, IntakeError};
pub use memo::{RetryPolicy, StepError, StepFailure, StepMemoizer, StepOptions};
pub use orchestrator::{Orchestrator, OrchestratorDeps, OrchestratorError, RunOutcome};
pub use service::{ServiceError, WorkflowService};
pub use steps::{EnqueueJob, StepHandler, StepRegistry};
