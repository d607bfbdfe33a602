// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Versioned engine snapshots
//!
//! Snapshots are stored opaquely in instance records. The format only grows
//! by adding defaulted fields; a snapshot written by a newer format version is
//! rejected instead of being misread.

use super::definition::Machine;
use super::engine::EngineState;
use super::WorkflowState;
use crate::event::WorkflowEvent;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// Current snapshot format version
pub const SNAPSHOT_VERSION: u32 = 1;

/// Serialized form of an [`EngineState`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot<S> {
    pub version: u32,
    /// Id of the machine that produced the snapshot
    pub machine: String,
    #[serde(flatten)]
    pub engine: EngineState<S>,
}

#[derive(Deserialize)]
struct Header {
    version: u32,
    machine: String,
}

#[derive(Debug, Error)]
pub enum SnapshotError {
    #[error("unsupported snapshot version {found} (supported up to {SNAPSHOT_VERSION})")]
    UnsupportedVersion { found: u32 },
    #[error("snapshot belongs to machine '{found}', expected '{expected}'")]
    MachineMismatch { expected: String, found: String },
    #[error("malformed snapshot: {0}")]
    Json(#[from] serde_json::Error),
}

impl<S: WorkflowState, E: WorkflowEvent> Machine<S, E> {
    /// Serialize an engine state for storage
    pub fn snapshot(&self, state: &EngineState<S>) -> Result<Value, SnapshotError> {
        let snapshot = Snapshot {
            version: SNAPSHOT_VERSION,
            machine: self.id.clone(),
            engine: state.clone(),
        };
        Ok(serde_json::to_value(snapshot)?)
    }

    /// Restore an engine state written by [`Machine::snapshot`]
    pub fn restore(&self, value: &Value) -> Result<EngineState<S>, SnapshotError> {
        let header = Header::deserialize(value)?;
        if header.version == 0 || header.version > SNAPSHOT_VERSION {
            return Err(SnapshotError::UnsupportedVersion {
                found: header.version,
            });
        }
        if header.machine != self.id {
            return Err(SnapshotError::MachineMismatch {
                expected: self.id.clone(),
                found: header.machine,
            });
        }
        let snapshot = Snapshot::<S>::deserialize(value)?;
        Ok(snapshot.engine)
    }
}

#[cfg(test)]
#[path = "snapshot_tests.rs"]
mod tests;
