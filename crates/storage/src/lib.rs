// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! Durable storage for Waypoint
//!
//! Instance records and step outcomes share one write-ahead log.

mod operation;
mod record;
mod state;
mod store;
mod wal;

pub use operation::Operation;
pub use record::{InstancePatch, InstanceRecord, RunStatus, StepOutcome, StepRecord};
pub use state::MaterializedState;
pub use store::{
    CompactionResult, InstanceStore, StepJournal, StoreError, WalStore, WalStoreConfig,
};
pub use wal::{WalEntry, WalScan};
