// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Job queue adapters
//!
//! The "send to queue" step hands a job to an external worker. The worker
//! reports back later by posting a `processed` event for the instance.

mod channel;

pub use channel::ChannelJobQueue;

// Test support - only compiled for tests or when explicitly requested
#[cfg(any(test, feature = "test-support"))]
mod fake;
#[cfg(any(test, feature = "test-support"))]
pub use fake::FakeJobQueue;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use wp_core::InstanceId;

/// Message consumed by the external worker
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobMessage {
    pub workflow_instance_id: InstanceId,
}

impl JobMessage {
    pub fn new(workflow_instance_id: InstanceId) -> Self {
        Self {
            workflow_instance_id,
        }
    }
}

/// Errors from queue operations
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QueueError {
    /// Transient; sending again may succeed
    #[error("queue unavailable: {0}")]
    Unavailable(String),
    /// Permanent; the job will never be accepted
    #[error("job rejected: {0}")]
    Rejected(String),
}

impl QueueError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, QueueError::Unavailable(_))
    }
}

/// Adapter for enqueueing jobs
#[async_trait]
pub trait JobQueue: Clone + Send + Sync + 'static {
    async fn send(&self, job: JobMessage) -> Result<(), QueueError>;
}
