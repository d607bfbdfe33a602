// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! WAL-backed instance store and step journal
//!
//! All writes go through one mutex around the writer and the materialized
//! state, so every upsert is an atomic read-modify-write of its record.

use crate::operation::Operation;
use crate::record::{InstancePatch, InstanceRecord, StepOutcome, StepRecord};
use crate::state::MaterializedState;
use crate::wal::{self, WalWriter};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use thiserror::Error;
use wp_core::{Clock, InstanceId, SystemClock};

/// Errors from store operations
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Durable per-instance records
pub trait InstanceStore: Send + Sync {
    /// Merge `patch` into the record for `id`, creating it if absent
    fn upsert(&self, id: &InstanceId, patch: InstancePatch) -> Result<InstanceRecord, StoreError>;

    fn get(&self, id: &InstanceId) -> Result<Option<InstanceRecord>, StoreError>;

    /// All records, oldest first
    fn list(&self) -> Result<Vec<InstanceRecord>, StoreError>;

    /// Remove a record and its step journal, returning the removed record
    fn remove(&self, id: &InstanceId) -> Result<Option<InstanceRecord>, StoreError>;

    /// Remove every record, returning what was removed
    fn clear(&self) -> Result<Vec<InstanceRecord>, StoreError>;
}

/// Durable record of step attempts and outcomes
pub trait StepJournal: Send + Sync {
    fn step(&self, id: &InstanceId, name: &str) -> Result<Option<StepRecord>, StoreError>;

    /// Count a failed attempt, returning the total number of failed attempts
    fn record_attempt(&self, id: &InstanceId, name: &str, error: &str) -> Result<u32, StoreError>;

    /// Record the final outcome of a step
    ///
    /// An outcome already on record is never replaced; the stored record is
    /// returned unchanged.
    fn record_outcome(
        &self,
        id: &InstanceId,
        name: &str,
        outcome: StepOutcome,
    ) -> Result<StepRecord, StoreError>;
}

/// Configuration for WalStore
#[derive(Debug, Clone)]
pub struct WalStoreConfig {
    /// Number of superseded log entries that triggers a compaction (0 disables)
    pub compaction_threshold: u64,
}

impl Default for WalStoreConfig {
    fn default() -> Self {
        Self {
            compaction_threshold: 1_000,
        }
    }
}

/// Result of a compaction
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompactionResult {
    pub entries_before: u64,
    pub entries_after: u64,
}

struct Inner {
    writer: WalWriter,
    state: MaterializedState,
    /// Entries in the log file
    entries: u64,
}

/// WAL-based storage with crash recovery
pub struct WalStore<C: Clock = SystemClock> {
    inner: Mutex<Inner>,
    config: WalStoreConfig,
    clock: C,
}

impl WalStore<SystemClock> {
    /// Create a store in a temporary directory (for testing)
    pub fn open_temp() -> Result<Self, StoreError> {
        let dir = std::env::temp_dir().join(format!("wp-walstore-{}", uuid::Uuid::new_v4()));
        Self::open(&dir.join("instances.wal"), WalStoreConfig::default(), SystemClock)
    }
}

impl<C: Clock> WalStore<C> {
    /// Open or create a store backed by the log at `path`
    ///
    /// Replays the log into memory. A corrupt tail is logged and dropped by
    /// compacting immediately, so later appends never land behind it.
    pub fn open(path: &Path, config: WalStoreConfig, clock: C) -> Result<Self, StoreError> {
        let scan = wal::scan(path)?;
        let mut state = MaterializedState::new();
        for entry in &scan.entries {
            state.apply(&entry.op);
        }
        let entries = scan.entries.len() as u64;
        let writer = WalWriter::open(path, scan.last_sequence())?;

        tracing::info!(
            path = %path.display(),
            entries,
            instances = state.instances.len(),
            steps = state.steps.len(),
            "WAL replayed"
        );

        let store = Self {
            inner: Mutex::new(Inner {
                writer,
                state,
                entries,
            }),
            config,
            clock,
        };

        if let Some(line) = scan.corrupt_line {
            tracing::warn!(line, "discarding WAL tail after corrupt entry");
            store.compact()?;
        }
        Ok(store)
    }

    pub fn path(&self) -> PathBuf {
        self.lock().writer.path().to_path_buf()
    }

    /// Next sequence number to be written
    pub fn sequence(&self) -> u64 {
        self.lock().writer.sequence()
    }

    /// Number of entries currently in the log file
    pub fn entry_count(&self) -> u64 {
        self.lock().entries
    }

    /// Rewrite the log as one entry per live record
    pub fn compact(&self) -> Result<CompactionResult, StoreError> {
        let mut inner = self.lock();
        self.compact_locked(&mut inner)
    }

    fn compact_locked(&self, inner: &mut Inner) -> Result<CompactionResult, StoreError> {
        let before = inner.entries;
        let ops = inner.state.to_operations();
        let after = ops.len() as u64;
        inner.writer.rewrite(ops, self.timestamp_micros())?;
        inner.entries = after;

        tracing::info!(entries_before = before, entries_after = after, "WAL compacted");
        Ok(CompactionResult {
            entries_before: before,
            entries_after: after,
        })
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn timestamp_micros(&self) -> u64 {
        u64::try_from(self.clock.utc_now().timestamp_micros()).unwrap_or(0)
    }

    /// Durably append `op`, then apply it to the materialized state
    fn commit(&self, inner: &mut Inner, op: Operation) -> Result<(), StoreError> {
        let name = op.name();
        let sequence = inner.writer.append(op.clone(), self.timestamp_micros())?;
        inner.state.apply(&op);
        inner.entries += 1;
        tracing::trace!(op = name, sequence, "WAL append");

        let stale = inner.entries.saturating_sub(inner.state.len() as u64);
        if self.config.compaction_threshold > 0 && stale >= self.config.compaction_threshold {
            self.compact_locked(inner)?;
        }
        Ok(())
    }
}

impl<C: Clock> InstanceStore for WalStore<C> {
    fn upsert(&self, id: &InstanceId, patch: InstancePatch) -> Result<InstanceRecord, StoreError> {
        let mut inner = self.lock();
        let now = self.clock.utc_now();
        let mut record = inner
            .state
            .instances
            .get(id)
            .cloned()
            .unwrap_or_else(|| InstanceRecord::new(id.clone(), now));
        record.merge(patch, now);

        self.commit(
            &mut inner,
            Operation::InstancePut {
                record: record.clone(),
            },
        )?;
        Ok(record)
    }

    fn get(&self, id: &InstanceId) -> Result<Option<InstanceRecord>, StoreError> {
        Ok(self.lock().state.instances.get(id).cloned())
    }

    fn list(&self) -> Result<Vec<InstanceRecord>, StoreError> {
        let mut records: Vec<_> = self.lock().state.instances.values().cloned().collect();
        records.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        Ok(records)
    }

    fn remove(&self, id: &InstanceId) -> Result<Option<InstanceRecord>, StoreError> {
        let mut inner = self.lock();
        let Some(record) = inner.state.instances.get(id).cloned() else {
            return Ok(None);
        };
        self.commit(&mut inner, Operation::InstanceRemove { id: id.clone() })?;
        Ok(Some(record))
    }

    fn clear(&self) -> Result<Vec<InstanceRecord>, StoreError> {
        let mut inner = self.lock();
        let removed: Vec<_> = inner.state.instances.values().cloned().collect();
        self.commit(&mut inner, Operation::InstancesClear)?;
        Ok(removed)
    }
}

impl<C: Clock> StepJournal for WalStore<C> {
    fn step(&self, id: &InstanceId, name: &str) -> Result<Option<StepRecord>, StoreError> {
        Ok(self.lock().state.step(id, name).cloned())
    }

    fn record_attempt(&self, id: &InstanceId, name: &str, error: &str) -> Result<u32, StoreError> {
        let mut inner = self.lock();
        let mut record = inner
            .state
            .step(id, name)
            .cloned()
            .unwrap_or_else(|| StepRecord::new(id.clone(), name));
        if record.is_complete() {
            return Ok(record.attempts);
        }
        record.attempts += 1;
        record.last_error = Some(error.to_string());
        let attempts = record.attempts;

        self.commit(&mut inner, Operation::StepPut { record })?;
        Ok(attempts)
    }

    fn record_outcome(
        &self,
        id: &InstanceId,
        name: &str,
        outcome: StepOutcome,
    ) -> Result<StepRecord, StoreError> {
        let mut inner = self.lock();
        let mut record = inner
            .state
            .step(id, name)
            .cloned()
            .unwrap_or_else(|| StepRecord::new(id.clone(), name));
        if record.is_complete() {
            return Ok(record);
        }
        record.outcome = Some(outcome);
        record.completed_at = Some(self.clock.utc_now());

        self.commit(
            &mut inner,
            Operation::StepPut {
                record: record.clone(),
            },
        )?;
        Ok(record)
    }
}

#[cfg(test)]
#[path = "store_tests.rs"]
mod tests;
