// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Step handlers
//!
//! A machine names a step by kind (`send-to-queue`); the registry maps that
//! kind to the code performing the side effect.

use crate::memo::StepFailure;
use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use wp_adapters::{JobMessage, JobQueue, QueueError};
use wp_core::{Context, InstanceId};

/// Side effect run for a step kind
#[async_trait]
pub trait StepHandler: Send + Sync {
    async fn run(&self, id: &InstanceId, context: &Context) -> Result<Value, StepFailure>;
}

impl From<QueueError> for StepFailure {
    fn from(err: QueueError) -> Self {
        if err.is_retryable() {
            StepFailure::Retryable(err.to_string())
        } else {
            StepFailure::Fatal(err.to_string())
        }
    }
}

/// Hands the instance to the external worker
pub struct EnqueueJob<Q> {
    queue: Q,
}

impl<Q: JobQueue> EnqueueJob<Q> {
    pub fn new(queue: Q) -> Self {
        Self { queue }
    }
}

#[async_trait]
impl<Q: JobQueue> StepHandler for EnqueueJob<Q> {
    async fn run(&self, id: &InstanceId, _context: &Context) -> Result<Value, StepFailure> {
        self.queue.send(JobMessage::new(id.clone())).await?;
        Ok(Value::Null)
    }
}

/// Step handlers by kind
#[derive(Clone, Default)]
pub struct StepRegistry {
    handlers: HashMap<String, Arc<dyn StepHandler>>,
}

impl StepRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(mut self, kind: impl Into<String>, handler: impl StepHandler + 'static) -> Self {
        self.handlers.insert(kind.into(), Arc::new(handler));
        self
    }

    pub fn get(&self, kind: &str) -> Option<Arc<dyn StepHandler>> {
        self.handlers.get(kind).cloned()
    }
}

#[cfg(test)]
#[path = "steps_tests.rs"]
mod tests;
