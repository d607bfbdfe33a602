// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Materialized state from WAL replay

use crate::operation::Operation;
use crate::record::{InstanceRecord, StepRecord};
use std::collections::BTreeMap;
use wp_core::InstanceId;

/// Materialized state built from WAL operations
#[derive(Debug, Default, Clone, PartialEq)]
pub struct MaterializedState {
    pub instances: BTreeMap<InstanceId, InstanceRecord>,
    pub steps: BTreeMap<(InstanceId, String), StepRecord>,
}

impl MaterializedState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply an operation to update the state
    pub fn apply(&mut self, op: &Operation) {
        match op {
            Operation::InstancePut { record } => {
                self.instances.insert(record.id.clone(), record.clone());
            }

            Operation::InstanceRemove { id } => {
                self.instances.remove(id);
                self.steps.retain(|(instance, _), _| instance != id);
            }

            Operation::InstancesClear => {
                self.instances.clear();
                self.steps.clear();
            }

            Operation::StepPut { record } => {
                let key = (record.instance_id.clone(), record.name.clone());
                self.steps.insert(key, record.clone());
            }
        }
    }

    pub fn step(&self, id: &InstanceId, name: &str) -> Option<&StepRecord> {
        self.steps.get(&(id.clone(), name.to_string()))
    }

    /// One operation per live record, enough to rebuild this state
    pub fn to_operations(&self) -> Vec<Operation> {
        let instances = self
            .instances
            .values()
            .map(|record| Operation::InstancePut {
                record: record.clone(),
            });
        let steps = self.steps.values().map(|record| Operation::StepPut {
            record: record.clone(),
        });
        instances.chain(steps).collect()
    }

    /// Number of live records
    pub fn len(&self) -> usize {
        self.instances.len() + self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instances.is_empty() && self.steps.is_empty()
    }
}

#[cfg(test)]
#[path = "state_tests.rs"]
mod tests;
