// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Run loop for one workflow instance
//!
//! A run restores the instance's engine state (or starts it fresh), then
//! alternates between running requested steps and waiting for the next
//! event until the machine reaches a terminal state. The snapshot is written
//! after every transition and every completed step, so a crashed run picks up
//! where the last write left it.

use crate::broadcast::{Broadcaster, Update};
use crate::config::RunConfig;
use crate::intake::EventIntake;
use crate::memo::{StepError, StepMemoizer, StepOptions};
use crate::steps::StepRegistry;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use thiserror::Error;
use tracing::Instrument;
use wp_core::{
    Clock, Context, EngineState, ExternalEvent, InstanceId, Machine, SnapshotError, Status,
    StepRequest, TransitionError, WorkflowEvent, WorkflowState,
};
use wp_storage::{InstancePatch, InstanceRecord, InstanceStore, RunStatus, StepJournal, StoreError};

/// Infrastructure failures that end a run without a verdict
#[derive(Debug, Error)]
pub enum OrchestratorError {
    #[error("instance store write failed: {0}")]
    Persistence(#[from] StoreError),
    #[error("snapshot error: {0}")]
    Snapshot(#[from] SnapshotError),
    #[error("workflow definition error: {0}")]
    Definition(#[from] TransitionError),
}

/// Verdict of a finished run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunOutcome {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl RunOutcome {
    pub fn success() -> Self {
        Self {
            success: true,
            error: None,
        }
    }

    pub fn failure(error: impl Into<String>) -> Self {
        Self {
            success: false,
            error: Some(error.into()),
        }
    }
}

/// Shared collaborators of every run
pub struct OrchestratorDeps<St> {
    pub store: Arc<St>,
    pub intake: Arc<EventIntake>,
    pub broadcaster: Arc<Broadcaster>,
    pub steps: StepRegistry,
}

pub struct Orchestrator<St, S, E: WorkflowEvent, C> {
    machine: Arc<Machine<S, E>>,
    store: Arc<St>,
    memo: StepMemoizer<St>,
    intake: Arc<EventIntake>,
    broadcaster: Arc<Broadcaster>,
    steps: StepRegistry,
    config: RunConfig,
    step_options: StepOptions,
    clock: C,
}

impl<St, S, E, C> Orchestrator<St, S, E, C>
where
    St: InstanceStore + StepJournal + 'static,
    S: WorkflowState,
    E: WorkflowEvent,
    C: Clock,
{
    pub fn new(machine: Machine<S, E>, deps: OrchestratorDeps<St>, clock: C) -> Self {
        Self {
            machine: Arc::new(machine),
            memo: StepMemoizer::new(Arc::clone(&deps.store)),
            store: deps.store,
            intake: deps.intake,
            broadcaster: deps.broadcaster,
            steps: deps.steps,
            config: RunConfig::default(),
            step_options: StepOptions::default(),
            clock,
        }
    }

    pub fn with_run_config(mut self, config: RunConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_step_options(mut self, options: StepOptions) -> Self {
        self.step_options = options;
        self
    }

    pub fn machine(&self) -> &Machine<S, E> {
        &self.machine
    }

    /// Name of the state a fresh instance starts in
    pub fn initial_state(&self) -> &'static str {
        self.machine.initial().name()
    }

    /// Drive instance `id` until its machine finishes
    ///
    /// Expected failures (step errors, timeouts, unknown events) end the run
    /// with an unsuccessful [`RunOutcome`]. Only infrastructure failures are
    /// returned as errors. The instance's mailbox is open for the duration of
    /// the run and closed however it ends.
    pub async fn run(&self, id: &InstanceId) -> Result<RunOutcome, OrchestratorError> {
        let span = tracing::info_span!("workflow.run", instance = %id, machine = self.machine.id());
        self.intake.open(id);
        let result = self.run_loop(id).instrument(span).await;
        self.intake.close(id);
        result
    }

    async fn run_loop(&self, id: &InstanceId) -> Result<RunOutcome, OrchestratorError> {
        self.report(id, InstancePatch::new().run_status(RunStatus::Running))?;
        let mut engine = self.load_or_start(id)?;

        loop {
            while engine.is_active() {
                let Some(step) = engine.pending.first().cloned() else {
                    break;
                };
                engine = self.process_step(id, engine, &step).await?;
            }
            if !engine.is_active() {
                break;
            }

            self.report(
                id,
                InstancePatch::new()
                    .run_status(RunStatus::WaitingForEvent)
                    .clear_status_message(),
            )?;

            engine = match self
                .intake
                .wait_for_event(id, |_| true, self.config.event_timeout)
                .await
            {
                Ok(event) => self.apply_event(&engine, &event),
                Err(err) => {
                    tracing::warn!(state = engine.state.name(), error = %err, "event wait timed out");
                    self.machine.fail(&engine, &err.to_string())
                }
            };
            self.persist(id, &engine)?;
        }

        self.finish(id, &engine)
    }

    fn load_or_start(&self, id: &InstanceId) -> Result<EngineState<S>, OrchestratorError> {
        let snapshot = self.store.get(id)?.and_then(|record| record.snapshot);
        if let Some(snapshot) = snapshot {
            let engine = self.machine.restore(&snapshot)?;
            tracing::info!(
                state = engine.state.name(),
                pending = engine.pending.len(),
                "resumed from snapshot"
            );
            return Ok(engine);
        }

        let engine = self.machine.start(Context::new())?;
        tracing::info!(
            state = engine.state.name(),
            pending = engine.pending.len(),
            "started"
        );
        self.persist(id, &engine)?;
        Ok(engine)
    }

    fn apply_event(&self, engine: &EngineState<S>, event: &ExternalEvent) -> EngineState<S> {
        let result = match event.decode::<E>() {
            Ok(typed) => self.machine.transition(engine, &typed),
            Err(err) => {
                tracing::debug!(event = %event.event_type, error = %err, "event not recognized");
                self.machine.transition_unrecognized(engine, &event.event_type)
            }
        };

        let next = match result {
            Ok(next) => next,
            Err(err) => {
                tracing::warn!(event = %event.event_type, error = %err, "transition rejected");
                self.machine.fail(engine, &err.to_string())
            }
        };
        tracing::info!(
            event = %event.event_type,
            from = engine.state.name(),
            to = next.state.name(),
            status = ?next.status,
            "transition"
        );
        next
    }

    async fn process_step(
        &self,
        id: &InstanceId,
        mut engine: EngineState<S>,
        step: &StepRequest,
    ) -> Result<EngineState<S>, OrchestratorError> {
        self.report(id, InstancePatch::new().run_status(RunStatus::ProcessingStep))?;

        let Some(handler) = self.steps.get(&step.kind) else {
            let message = format!("no handler for step kind '{}'", step.kind);
            return self.step_failed(id, engine, step, &message);
        };

        loop {
            let context = engine.context.clone();
            let result: Result<Value, StepError> = self
                .memo
                .run_step(id, &step.name, &self.step_options, || {
                    handler.run(id, &context)
                })
                .await;

            match result {
                Ok(_) => {
                    tracing::info!(step = %step.name, "step completed");
                    engine.complete_step(&step.name);
                    self.persist(id, &engine)?;
                    return Ok(engine);
                }
                Err(StepError::Retryable {
                    attempt,
                    retry_after,
                    message,
                }) => {
                    tracing::warn!(
                        step = %step.name,
                        attempt,
                        ?retry_after,
                        error = %message,
                        "step attempt failed"
                    );
                    self.report(
                        id,
                        InstancePatch::new().status_message(format!(
                            "Step {} failed (attempt {}): {}",
                            step.name, attempt, message
                        )),
                    )?;
                    tokio::time::sleep(retry_after).await;
                }
                Err(StepError::Fatal { message }) | Err(StepError::AlreadyFailed { message }) => {
                    return self.step_failed(id, engine, step, &message);
                }
                Err(StepError::Codec(err)) => {
                    return self.step_failed(id, engine, step, &err.to_string());
                }
                Err(StepError::Store(err)) => return Err(OrchestratorError::Persistence(err)),
            }
        }
    }

    /// Route a permanent step failure into the machine as an error event
    fn step_failed(
        &self,
        id: &InstanceId,
        mut engine: EngineState<S>,
        step: &StepRequest,
        message: &str,
    ) -> Result<EngineState<S>, OrchestratorError> {
        tracing::error!(step = %step.name, error = message, "step failed");
        engine.complete_step(&step.name);

        let message = format!("step error ({}): {}", step.kind, message);
        let next = match self.machine.transition(&engine, &E::error(message.clone())) {
            Ok(next) => next,
            Err(err) => {
                tracing::debug!(error = %err, "error event not handled, failing in place");
                self.machine.fail(&engine, &message)
            }
        };
        self.persist(id, &next)?;
        Ok(next)
    }

    fn finish(&self, id: &InstanceId, engine: &EngineState<S>) -> Result<RunOutcome, OrchestratorError> {
        let outcome = match engine.status {
            Status::Done => RunOutcome::success(),
            Status::Error => RunOutcome::failure(
                engine
                    .error
                    .clone()
                    .unwrap_or_else(|| format!("entered {}", engine.state.name())),
            ),
            Status::Active => RunOutcome::failure("Workflow ended unexpectedly"),
        };

        let patch = match &outcome.error {
            None => InstancePatch::new()
                .run_status(RunStatus::Completed)
                .clear_status_message(),
            Some(error) => InstancePatch::new()
                .run_status(RunStatus::Errored)
                .status_message(error.clone()),
        };
        self.report(id, patch)?;
        self.intake.close(id);

        if !self.config.retain_finished && self.store.remove(id)?.is_some() {
            self.broadcaster
                .publish(Update::removed(id.clone(), self.clock.utc_now()));
        }

        match &outcome.error {
            None => tracing::info!(state = engine.state.name(), "run completed"),
            Some(error) => tracing::warn!(state = engine.state.name(), error = %error, "run errored"),
        }
        Ok(outcome)
    }

    /// Write the engine state and its snapshot
    fn persist(&self, id: &InstanceId, engine: &EngineState<S>) -> Result<(), OrchestratorError> {
        let snapshot = self.machine.snapshot(engine)?;
        self.report(
            id,
            InstancePatch::new()
                .state(engine.state.name())
                .snapshot(snapshot),
        )?;
        Ok(())
    }

    /// Upsert and broadcast the resulting record
    fn report(&self, id: &InstanceId, patch: InstancePatch) -> Result<InstanceRecord, OrchestratorError> {
        let record = self.store.upsert(id, patch)?;
        self.broadcaster
            .publish(Update::instance(record.clone(), self.clock.utc_now()));
        Ok(record)
    }
}

#[cfg(test)]
#[path = "orchestrator_tests.rs"]
mod tests;
