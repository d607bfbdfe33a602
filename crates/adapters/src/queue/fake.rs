// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Fake job queue for testing
#![cfg_attr(coverage_nightly, coverage(off))]

use super::{JobMessage, JobQueue, QueueError};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

#[derive(Default)]
struct FakeQueueState {
    sent: Vec<JobMessage>,
    attempts: usize,
    scripted: VecDeque<QueueError>,
    always: Option<QueueError>,
}

/// Fake job queue that records jobs and fails on demand
#[derive(Clone, Default)]
pub struct FakeJobQueue {
    inner: Arc<Mutex<FakeQueueState>>,
}

impl FakeJobQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail the next send with `error`; scripted failures are used in order
    pub fn fail_next(&self, error: QueueError) {
        self.lock().scripted.push_back(error);
    }

    /// Fail every send with `error` once scripted failures run out
    pub fn fail_always(&self, error: QueueError) {
        self.lock().always = Some(error);
    }

    /// Jobs accepted so far
    pub fn sent(&self) -> Vec<JobMessage> {
        self.lock().sent.clone()
    }

    /// Number of send calls, successful or not
    pub fn attempts(&self) -> usize {
        self.lock().attempts
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, FakeQueueState> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[async_trait]
impl JobQueue for FakeJobQueue {
    async fn send(&self, job: JobMessage) -> Result<(), QueueError> {
        let mut state = self.lock();
        state.attempts += 1;
        if let Some(error) = state.scripted.pop_front() {
            return Err(error);
        }
        if let Some(error) = &state.always {
            return Err(error.clone());
        }
        state.sent.push(job);
        Ok(())
    }
}

#[cfg(test)]
#[path = "fake_tests.rs"]
mod tests;
