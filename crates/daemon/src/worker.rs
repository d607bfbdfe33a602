// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! In-process job worker
//!
//! Consumes jobs from the channel queue, spends the configured delay on
//! "processing", then reports a `processed` event with a random output in
//! [0, 1) back to the instance.

use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use wp_adapters::JobMessage;
use wp_core::{Clock, ExternalEvent, IdGen, InstanceId, WorkflowEvent, WorkflowState};
use wp_engine::{ServiceError, WorkflowService};
use wp_storage::{InstanceStore, StepJournal};

/// Where the worker delivers results
pub trait EventSink: Send + Sync + 'static {
    fn post_event(&self, id: &InstanceId, event: ExternalEvent) -> Result<(), ServiceError>;
}

impl<St, S, E, C, I> EventSink for WorkflowService<St, S, E, C, I>
where
    St: InstanceStore + StepJournal + 'static,
    S: WorkflowState,
    E: WorkflowEvent,
    C: Clock,
    I: IdGen,
{
    fn post_event(&self, id: &InstanceId, event: ExternalEvent) -> Result<(), ServiceError> {
        WorkflowService::post_event(self, id, event)
    }
}

/// Event reporting a finished job
pub fn processed_event(output: f64) -> ExternalEvent {
    ExternalEvent::new("processed", json!({ "output": output }))
}

/// Process jobs until the queue's senders are gone
pub async fn run<K: EventSink + ?Sized>(
    mut jobs: mpsc::Receiver<JobMessage>,
    sink: Arc<K>,
    delay: Duration,
) {
    while let Some(job) = jobs.recv().await {
        let id = job.workflow_instance_id;
        tracing::info!(instance = %id, "processing job");
        tokio::time::sleep(delay).await;

        let output = fastrand::f64();
        match sink.post_event(&id, processed_event(output)) {
            Ok(()) => tracing::info!(instance = %id, output, "job processed"),
            Err(
                ServiceError::NotFound(_) | ServiceError::Finished(_) | ServiceError::NotRunning(_),
            ) => tracing::warn!(instance = %id, "instance not accepting events, dropping job result"),
            Err(e) => tracing::error!(instance = %id, error = %e, "failed to report job result"),
        }
    }
    tracing::debug!("job queue closed, worker exiting");
}

#[cfg(test)]
#[path = "worker_tests.rs"]
mod tests;
