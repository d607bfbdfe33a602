// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Persisted records: workflow instances and step outcomes

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use wp_core::InstanceId;

/// Where the run loop for an instance currently is
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RunStatus {
    Queued,
    Running,
    #[serde(rename = "Waiting For Event")]
    WaitingForEvent,
    #[serde(rename = "Processing Step")]
    ProcessingStep,
    Completed,
    Errored,
}

impl RunStatus {
    /// Whether the run loop for this instance has exited
    pub fn is_terminal(self) -> bool {
        matches!(self, RunStatus::Completed | RunStatus::Errored)
    }
}

/// A workflow instance as stored
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InstanceRecord {
    pub id: InstanceId,
    /// Current machine state name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub run_status: Option<RunStatus>,
    #[serde(default)]
    pub status_message: Option<String>,
    /// Opaque engine snapshot
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub snapshot: Option<Value>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl InstanceRecord {
    pub fn new(id: InstanceId, now: DateTime<Utc>) -> Self {
        Self {
            id,
            state: None,
            run_status: None,
            status_message: None,
            snapshot: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Merge a partial update; fields absent from the patch are kept
    pub fn merge(&mut self, patch: InstancePatch, now: DateTime<Utc>) {
        if let Some(state) = patch.state {
            self.state = Some(state);
        }
        if let Some(run_status) = patch.run_status {
            self.run_status = Some(run_status);
        }
        if let Some(status_message) = patch.status_message {
            self.status_message = status_message;
        }
        if let Some(snapshot) = patch.snapshot {
            self.snapshot = Some(snapshot);
        }
        self.updated_at = now;
    }
}

/// Partial update for an [`InstanceRecord`]
///
/// `status_message` is doubly optional: `Some(None)` clears the message.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct InstancePatch {
    pub state: Option<String>,
    pub run_status: Option<RunStatus>,
    pub status_message: Option<Option<String>>,
    pub snapshot: Option<Value>,
}

impl InstancePatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(mut self, state: impl Into<String>) -> Self {
        self.state = Some(state.into());
        self
    }

    pub fn run_status(mut self, run_status: RunStatus) -> Self {
        self.run_status = Some(run_status);
        self
    }

    pub fn status_message(mut self, message: impl Into<String>) -> Self {
        self.status_message = Some(Some(message.into()));
        self
    }

    pub fn clear_status_message(mut self) -> Self {
        self.status_message = Some(None);
        self
    }

    pub fn snapshot(mut self, snapshot: Value) -> Self {
        self.snapshot = Some(snapshot);
        self
    }
}

/// Recorded outcome of a step; immutable once written
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "camelCase")]
pub enum StepOutcome {
    Success { value: Value },
    Failed { error: String },
}

/// Journal entry for one named step of one instance
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StepRecord {
    pub instance_id: InstanceId,
    pub name: String,
    /// Failed attempts so far
    #[serde(default)]
    pub attempts: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub outcome: Option<StepOutcome>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

impl StepRecord {
    pub fn new(instance_id: InstanceId, name: impl Into<String>) -> Self {
        Self {
            instance_id,
            name: name.into(),
            attempts: 0,
            last_error: None,
            outcome: None,
            completed_at: None,
        }
    }

    pub fn is_complete(&self) -> bool {
        self.outcome.is_some()
    }
}

#[cfg(test)]
#[path = "record_tests.rs"]
mod tests;
