// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Project settings from `waypoint.toml`
//!
//! Every section and field is optional. Durations use humantime syntax
//! (`"30s"`, `"2m"`).

use serde::Deserialize;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;
use wp_engine::{RunConfig, StepOptions};
use wp_storage::WalStoreConfig;

/// Settings file name, looked up at the project root
pub const SETTINGS_FILE: &str = "waypoint.toml";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid settings: {0}")]
    Parse(#[from] toml::de::Error),
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub run: RunSection,
    pub step: StepOptions,
    pub store: StoreSection,
    pub worker: WorkerSection,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct RunSection {
    #[serde(with = "humantime_serde")]
    pub event_timeout: Duration,
}

impl Default for RunSection {
    fn default() -> Self {
        Self {
            event_timeout: RunConfig::default().event_timeout,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct StoreSection {
    pub retain_finished: bool,
    /// Stale log entries tolerated before compaction; 0 disables it
    pub compaction_threshold: u64,
}

impl Default for StoreSection {
    fn default() -> Self {
        Self {
            retain_finished: false,
            compaction_threshold: WalStoreConfig::default().compaction_threshold,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct WorkerSection {
    /// Simulated processing time per job
    #[serde(with = "humantime_serde")]
    pub delay: Duration,
}

impl Default for WorkerSection {
    fn default() -> Self {
        Self {
            delay: Duration::from_secs(1),
        }
    }
}

impl Settings {
    /// Load `waypoint.toml` from `project_root`, or defaults if absent
    pub fn load(project_root: &Path) -> Result<Self, ConfigError> {
        let path = project_root.join(SETTINGS_FILE);
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(&path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Self::parse(&content)
    }

    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    pub fn run_config(&self) -> RunConfig {
        RunConfig {
            event_timeout: self.run.event_timeout,
            retain_finished: self.store.retain_finished,
        }
    }

    pub fn store_config(&self) -> WalStoreConfig {
        WalStoreConfig {
            compaction_threshold: self.store.compaction_threshold,
        }
    }
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
