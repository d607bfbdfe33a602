// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Run loop settings

use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    /// How long a run waits for its next event before failing
    #[serde(with = "humantime_serde")]
    pub event_timeout: Duration,
    /// Keep finished instances in the store instead of removing them
    pub retain_finished: bool,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            event_timeout: Duration::from_secs(60),
            retain_finished: false,
        }
    }
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
