// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Operations recorded in the write-ahead log
//!
//! Each operation carries the full resulting record, so replay never has to
//! re-run merge logic.

use crate::record::{InstanceRecord, StepRecord};
use serde::{Deserialize, Serialize};
use wp_core::InstanceId;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Operation {
    InstancePut { record: InstanceRecord },
    /// Removes the instance and its step journal
    InstanceRemove { id: InstanceId },
    InstancesClear,
    StepPut { record: StepRecord },
}

impl Operation {
    /// Operation name for tracing
    pub fn name(&self) -> &'static str {
        match self {
            Operation::InstancePut { .. } => "instance_put",
            Operation::InstanceRemove { .. } => "instance_remove",
            Operation::InstancesClear => "instances_clear",
            Operation::StepPut { .. } => "step_put",
        }
    }
}
