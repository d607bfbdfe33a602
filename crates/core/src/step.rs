// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Durable step requests
//!
//! The engine never performs side effects itself. A `Step` action appends a
//! [`StepRequest`] to the engine state's pending list, and the orchestrator
//! carries it out through the step memoizer. Because the request lives in the
//! persisted state, a restarted orchestrator picks it up again.

use serde::{Deserialize, Serialize};

/// A request to run one durable step
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StepRequest {
    /// Handler kind, e.g. `send-to-queue`
    pub kind: String,
    /// Deterministic step name: `<kind>-<logical position>`
    pub name: String,
}

impl StepRequest {
    pub fn new(kind: impl Into<String>, position: u64) -> Self {
        let kind = kind.into();
        let name = format!("{}-{}", kind, position);
        Self { kind, name }
    }
}

#[cfg(test)]
#[path = "step_tests.rs"]
mod tests;
