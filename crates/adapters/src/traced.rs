// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Traced adapter wrappers for consistent observability

use crate::queue::{JobMessage, JobQueue, QueueError};
use async_trait::async_trait;
use tracing::Instrument;

/// Wrapper that adds tracing to any JobQueue
#[derive(Clone)]
pub struct TracedJobQueue<Q> {
    inner: Q,
}

impl<Q> TracedJobQueue<Q> {
    pub fn new(inner: Q) -> Self {
        Self { inner }
    }

    pub fn inner(&self) -> &Q {
        &self.inner
    }
}

#[async_trait]
impl<Q: JobQueue> JobQueue for TracedJobQueue<Q> {
    async fn send(&self, job: JobMessage) -> Result<(), QueueError> {
        let span = tracing::info_span!(
            "queue.send",
            instance = %job.workflow_instance_id
        );

        let start = std::time::Instant::now();
        let result = self.inner.send(job).instrument(span.clone()).await;
        let elapsed_ms = start.elapsed().as_millis() as u64;

        let _guard = span.enter();
        match &result {
            Ok(()) => tracing::info!(elapsed_ms, "job enqueued"),
            Err(e) if e.is_retryable() => {
                tracing::warn!(elapsed_ms, error = %e, "enqueue failed, retryable")
            }
            Err(e) => tracing::error!(elapsed_ms, error = %e, "enqueue rejected"),
        }

        result
    }
}

#[cfg(test)]
#[path = "traced_tests.rs"]
mod tests;
