// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Per-instance event mailboxes
//!
//! Events posted for an instance queue up until its orchestrator asks for
//! one. Delivery is at most once: a consumed event is gone.
//!
//! A mailbox exists only while the instance has a live run. It is opened
//! when the run is spawned and closed when the run finishes, so events for
//! finished or unknown instances are refused instead of piling up.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::Notify;
use tokio::time::Instant;
use wp_core::{ExternalEvent, InstanceId};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum IntakeError {
    #[error("timed out after {timeout:?} waiting for an event for {id}")]
    TimedOut { id: InstanceId, timeout: Duration },
    #[error("no open mailbox for {id}")]
    Closed { id: InstanceId },
}

#[derive(Default)]
struct Mailbox {
    queue: Mutex<VecDeque<ExternalEvent>>,
    notify: Notify,
}

impl Mailbox {
    fn take_first<P>(&self, predicate: &P) -> Option<ExternalEvent>
    where
        P: Fn(&ExternalEvent) -> bool,
    {
        let mut queue = self.queue.lock().unwrap_or_else(|e| e.into_inner());
        let index = queue.iter().position(predicate)?;
        queue.remove(index)
    }
}

/// Routes external events to the instance that waits for them
#[derive(Default)]
pub struct EventIntake {
    mailboxes: Mutex<HashMap<InstanceId, Arc<Mailbox>>>,
}

impl EventIntake {
    pub fn new() -> Self {
        Self::default()
    }

    /// Open the mailbox of `id`, keeping anything already queued
    pub fn open(&self, id: &InstanceId) {
        self.mailbox(id);
    }

    fn mailbox(&self, id: &InstanceId) -> Arc<Mailbox> {
        let mut mailboxes = self.mailboxes.lock().unwrap_or_else(|e| e.into_inner());
        Arc::clone(mailboxes.entry(id.clone()).or_default())
    }

    /// Queue an event for `id`
    ///
    /// Fails with [`IntakeError::Closed`] unless the mailbox is open.
    pub fn send(&self, id: &InstanceId, event: ExternalEvent) -> Result<(), IntakeError> {
        let mailbox = {
            let mailboxes = self.mailboxes.lock().unwrap_or_else(|e| e.into_inner());
            match mailboxes.get(id) {
                Some(mailbox) => Arc::clone(mailbox),
                None => return Err(IntakeError::Closed { id: id.clone() }),
            }
        };
        mailbox
            .queue
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push_back(event);
        mailbox.notify.notify_one();
        tracing::debug!(instance = %id, "event queued");
        Ok(())
    }

    pub fn is_open(&self, id: &InstanceId) -> bool {
        let mailboxes = self.mailboxes.lock().unwrap_or_else(|e| e.into_inner());
        mailboxes.contains_key(id)
    }

    /// Wait for the oldest queued event for `id` accepted by `predicate`
    ///
    /// Opens the mailbox if needed. Events the predicate rejects stay queued
    /// in arrival order.
    pub async fn wait_for_event<P>(
        &self,
        id: &InstanceId,
        predicate: P,
        timeout: Duration,
    ) -> Result<ExternalEvent, IntakeError>
    where
        P: Fn(&ExternalEvent) -> bool,
    {
        let mailbox = self.mailbox(id);
        let deadline = Instant::now() + timeout;
        loop {
            let notified = mailbox.notify.notified();
            if let Some(event) = mailbox.take_first(&predicate) {
                return Ok(event);
            }
            if tokio::time::timeout_at(deadline, notified).await.is_err() {
                // A send may have raced the deadline
                return mailbox.take_first(&predicate).ok_or(IntakeError::TimedOut {
                    id: id.clone(),
                    timeout,
                });
            }
        }
    }

    /// Number of events queued for `id`
    pub fn pending(&self, id: &InstanceId) -> usize {
        let mailboxes = self.mailboxes.lock().unwrap_or_else(|e| e.into_inner());
        mailboxes
            .get(id)
            .map(|m| m.queue.lock().unwrap_or_else(|e| e.into_inner()).len())
            .unwrap_or(0)
    }

    /// Drop the mailbox of `id` and anything still queued in it
    pub fn close(&self, id: &InstanceId) {
        let mut mailboxes = self.mailboxes.lock().unwrap_or_else(|e| e.into_inner());
        mailboxes.remove(id);
    }

    /// Drop every mailbox
    pub fn clear(&self) {
        let mut mailboxes = self.mailboxes.lock().unwrap_or_else(|e| e.into_inner());
        mailboxes.clear();
    }
}

#[cfg(test)]
#[path = "intake_tests.rs"]
mod tests;
