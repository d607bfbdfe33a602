// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Step memoization
//!
//! A step is identified by (instance id, step name). Once its outcome is in
//! the journal the step never runs again: a success is returned from the
//! journal and a permanent failure is reported as [`StepError::AlreadyFailed`].
//!
//! Each call makes at most one attempt. A retryable failure is counted in the
//! journal and handed back with the delay the caller should wait before
//! calling again; once the policy's attempts are used up the failure becomes
//! the step's permanent outcome.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use wp_core::InstanceId;
use wp_storage::{StepJournal, StepOutcome, StoreError};

/// Bounded exponential backoff
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Attempts before a retryable failure becomes permanent
    pub max_attempts: u32,
    #[serde(with = "humantime_serde")]
    pub initial_delay: Duration,
    #[serde(with = "humantime_serde")]
    pub max_delay: Duration,
    /// Treat a timed out attempt as a permanent failure
    pub timeout_is_fatal: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            timeout_is_fatal: false,
        }
    }
}

impl RetryPolicy {
    /// Delay before the attempt following failed attempt number `attempt`
    pub fn backoff(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(31);
        self.initial_delay
            .saturating_mul(1u32 << exponent)
            .min(self.max_delay)
    }
}

/// Per-step execution options
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StepOptions {
    #[serde(with = "humantime_serde")]
    pub timeout: Duration,
    #[serde(flatten)]
    pub retry: RetryPolicy,
}

impl Default for StepOptions {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(60),
            retry: RetryPolicy::default(),
        }
    }
}

/// Failure reported by a step body
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StepFailure {
    #[error("{0}")]
    Retryable(String),
    #[error("{0}")]
    Fatal(String),
}

/// Errors from [`StepMemoizer::run_step`]
#[derive(Debug, Error)]
pub enum StepError {
    #[error("step failed (attempt {attempt}), retry in {retry_after:?}: {message}")]
    Retryable {
        attempt: u32,
        retry_after: Duration,
        message: String,
    },
    #[error("step failed permanently: {message}")]
    Fatal { message: String },
    #[error("step already failed: {message}")]
    AlreadyFailed { message: String },
    #[error("step journal error: {0}")]
    Store(#[from] StoreError),
    #[error("step result encoding error: {0}")]
    Codec(#[from] serde_json::Error),
}

/// Runs named steps at most once per instance
pub struct StepMemoizer<J> {
    journal: Arc<J>,
}

impl<J> Clone for StepMemoizer<J> {
    fn clone(&self) -> Self {
        Self {
            journal: Arc::clone(&self.journal),
        }
    }
}

impl<J: StepJournal> StepMemoizer<J> {
    pub fn new(journal: Arc<J>) -> Self {
        Self { journal }
    }

    /// Run `f` as step `name` of instance `id`, unless its outcome is known
    pub async fn run_step<T, F, Fut>(
        &self,
        id: &InstanceId,
        name: &str,
        options: &StepOptions,
        f: F,
    ) -> Result<T, StepError>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, StepFailure>>,
    {
        if let Some(record) = self.journal.step(id, name)? {
            match record.outcome {
                Some(StepOutcome::Success { value }) => {
                    tracing::debug!(step = name, "step outcome replayed from journal");
                    return Ok(serde_json::from_value(value)?);
                }
                Some(StepOutcome::Failed { error }) => {
                    return Err(StepError::AlreadyFailed { message: error });
                }
                None => {}
            }
        }

        let result = match tokio::time::timeout(options.timeout, f()).await {
            Ok(result) => result,
            Err(_) => {
                let message = format!(
                    "step timed out after {}",
                    humantime::format_duration(options.timeout)
                );
                if options.retry.timeout_is_fatal {
                    Err(StepFailure::Fatal(message))
                } else {
                    Err(StepFailure::Retryable(message))
                }
            }
        };

        match result {
            Ok(value) => {
                let encoded = serde_json::to_value(&value)?;
                self.journal
                    .record_outcome(id, name, StepOutcome::Success { value: encoded })?;
                Ok(value)
            }
            Err(StepFailure::Fatal(message)) => {
                self.fail_permanently(id, name, message.clone())?;
                Err(StepError::Fatal { message })
            }
            Err(StepFailure::Retryable(message)) => {
                let attempt = self.journal.record_attempt(id, name, &message)?;
                if attempt >= options.retry.max_attempts {
                    let message = format!("{} (gave up after {} attempts)", message, attempt);
                    self.fail_permanently(id, name, message.clone())?;
                    return Err(StepError::Fatal { message });
                }
                Err(StepError::Retryable {
                    attempt,
                    retry_after: options.retry.backoff(attempt),
                    message,
                })
            }
        }
    }

    fn fail_permanently(&self, id: &InstanceId, name: &str, error: String) -> Result<(), StepError> {
        self.journal
            .record_outcome(id, name, StepOutcome::Failed { error })?;
        Ok(())
    }
}

#[cfg(test)]
#[path = "memo_tests.rs"]
mod tests;
