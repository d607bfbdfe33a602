// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! In-process job queue backed by a tokio channel

use super::{JobMessage, JobQueue, QueueError};
use async_trait::async_trait;
use tokio::sync::mpsc;

/// Job queue whose consumer lives in the same process
#[derive(Clone)]
pub struct ChannelJobQueue {
    tx: mpsc::Sender<JobMessage>,
}

impl ChannelJobQueue {
    /// Create a queue holding at most `capacity` undelivered jobs
    pub fn new(capacity: usize) -> (Self, mpsc::Receiver<JobMessage>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self { tx }, rx)
    }
}

#[async_trait]
impl JobQueue for ChannelJobQueue {
    async fn send(&self, job: JobMessage) -> Result<(), QueueError> {
        match self.tx.try_send(job) {
            Ok(()) => Ok(()),
            Err(mpsc::error::TrySendError::Full(_)) => {
                Err(QueueError::Unavailable("queue is full".to_string()))
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                Err(QueueError::Unavailable("queue consumer stopped".to_string()))
            }
        }
    }
}

#[cfg(test)]
#[path = "channel_tests.rs"]
mod tests;
