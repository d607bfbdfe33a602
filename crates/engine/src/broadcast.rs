// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Instance update fan-out to observers

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use tokio::sync::mpsc::{self, error::TrySendError};
use wp_core::InstanceId;
use wp_storage::InstanceRecord;

/// Default per-observer channel capacity
pub const DEFAULT_OBSERVER_CAPACITY: usize = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ObserverId(pub u64);

impl std::fmt::Display for ObserverId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "observer-{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UpdateKind {
    Instance,
    Removed,
}

/// Envelope pushed to observers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Update {
    pub workflow_instance_id: InstanceId,
    #[serde(rename = "type")]
    pub kind: UpdateKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<InstanceRecord>,
    pub time: DateTime<Utc>,
}

impl Update {
    pub fn instance(record: InstanceRecord, time: DateTime<Utc>) -> Self {
        Self {
            workflow_instance_id: record.id.clone(),
            kind: UpdateKind::Instance,
            payload: Some(record),
            time,
        }
    }

    pub fn removed(id: InstanceId, time: DateTime<Utc>) -> Self {
        Self {
            workflow_instance_id: id,
            kind: UpdateKind::Removed,
            payload: None,
            time,
        }
    }
}

/// Registry of live observers
///
/// Publishing never waits: an observer whose channel is full misses that
/// update, and one whose receiver is gone is dropped from the registry.
pub struct Broadcaster {
    observers: Mutex<HashMap<ObserverId, mpsc::Sender<Update>>>,
    next_id: AtomicU64,
    capacity: usize,
}

impl Default for Broadcaster {
    fn default() -> Self {
        Self::new(DEFAULT_OBSERVER_CAPACITY)
    }
}

impl Broadcaster {
    pub fn new(capacity: usize) -> Self {
        Self {
            observers: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(1),
            capacity: capacity.max(1),
        }
    }

    pub fn subscribe(&self) -> (ObserverId, mpsc::Receiver<Update>) {
        let id = ObserverId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let (tx, rx) = mpsc::channel(self.capacity);
        self.observers
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(id, tx);
        tracing::debug!(%id, "observer subscribed");
        (id, rx)
    }

    pub fn unsubscribe(&self, id: ObserverId) {
        let removed = self
            .observers
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(&id);
        if removed.is_some() {
            tracing::debug!(%id, "observer unsubscribed");
        }
    }

    /// Offer `update` to every observer; returns how many accepted it
    pub fn publish(&self, update: Update) -> usize {
        let mut observers = self.observers.lock().unwrap_or_else(|e| e.into_inner());
        let mut delivered = 0;
        observers.retain(|id, tx| match tx.try_send(update.clone()) {
            Ok(()) => {
                delivered += 1;
                true
            }
            Err(TrySendError::Full(_)) => {
                tracing::warn!(%id, instance = %update.workflow_instance_id, "observer lagging, update dropped");
                true
            }
            Err(TrySendError::Closed(_)) => {
                tracing::debug!(%id, "observer disconnected");
                false
            }
        });
        delivered
    }

    pub fn observer_count(&self) -> usize {
        self.observers
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .len()
    }
}

#[cfg(test)]
#[path = "broadcast_tests.rs"]
mod tests;
