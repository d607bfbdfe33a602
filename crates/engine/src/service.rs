// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Workflow service: the control surface over running instances
//!
//! The service owns the live-run registry. At most one run task exists per
//! instance id in this process. A run leaves the registry when it finishes;
//! its outcome is kept in a bounded list of recent outcomes so `wait` still
//! answers for runs that ended before anyone asked.

use crate::broadcast::{Broadcaster, ObserverId, Update};
use crate::intake::EventIntake;
use crate::orchestrator::{Orchestrator, RunOutcome};
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use thiserror::Error;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use wp_core::{Clock, ExternalEvent, IdGen, InstanceId, WorkflowEvent, WorkflowState};
use wp_storage::{InstancePatch, InstanceRecord, InstanceStore, RunStatus, StepJournal, StoreError};

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("instance not found: {0}")]
    NotFound(InstanceId),
    #[error("instance already finished: {0}")]
    Finished(InstanceId),
    #[error("instance has no live run: {0}")]
    NotRunning(InstanceId),
    #[error("store error: {0}")]
    Store(#[from] StoreError),
}

/// Outcomes remembered after their run left the registry
const FINISHED_OUTCOMES: usize = 256;

struct LiveRun {
    handle: JoinHandle<()>,
    outcome: watch::Receiver<Option<RunOutcome>>,
}

#[derive(Default)]
struct RunRegistry {
    live: HashMap<InstanceId, LiveRun>,
    finished: VecDeque<(InstanceId, RunOutcome)>,
}

impl RunRegistry {
    /// Move the run of `id` from the live map to the recent outcomes
    fn retire(&mut self, id: &InstanceId, outcome: RunOutcome) {
        self.live.remove(id);
        self.finished.retain(|(done, _)| done != id);
        if self.finished.len() >= FINISHED_OUTCOMES {
            self.finished.pop_front();
        }
        self.finished.push_back((id.clone(), outcome));
    }

    fn finished_outcome(&self, id: &InstanceId) -> Option<RunOutcome> {
        self.finished
            .iter()
            .find(|(done, _)| done == id)
            .map(|(_, outcome)| outcome.clone())
    }
}

type Runs = Arc<Mutex<RunRegistry>>;

pub struct WorkflowService<St, S, E: WorkflowEvent, C, I> {
    orchestrator: Arc<Orchestrator<St, S, E, C>>,
    store: Arc<St>,
    intake: Arc<EventIntake>,
    broadcaster: Arc<Broadcaster>,
    id_gen: I,
    clock: C,
    runs: Runs,
}

impl<St, S, E, C, I> WorkflowService<St, S, E, C, I>
where
    St: InstanceStore + StepJournal + 'static,
    S: WorkflowState,
    E: WorkflowEvent,
    C: Clock,
    I: IdGen,
{
    /// The store, intake and broadcaster must be the ones the orchestrator
    /// was built with.
    pub fn new(
        orchestrator: Orchestrator<St, S, E, C>,
        store: Arc<St>,
        intake: Arc<EventIntake>,
        broadcaster: Arc<Broadcaster>,
        id_gen: I,
        clock: C,
    ) -> Self {
        Self {
            orchestrator: Arc::new(orchestrator),
            store,
            intake,
            broadcaster,
            id_gen,
            clock,
            runs: Arc::new(Mutex::new(RunRegistry::default())),
        }
    }

    /// Create an instance and start its run
    pub fn create(&self) -> Result<InstanceRecord, ServiceError> {
        let id = self.id_gen.next_instance();
        let record = self.store.upsert(
            &id,
            InstancePatch::new()
                .state(self.orchestrator.initial_state())
                .run_status(RunStatus::Queued),
        )?;
        self.broadcaster
            .publish(Update::instance(record.clone(), self.clock.utc_now()));
        tracing::info!(instance = %id, "instance created");
        self.spawn_run(id);
        Ok(record)
    }

    pub fn get(&self, id: &InstanceId) -> Result<InstanceRecord, ServiceError> {
        self.store
            .get(id)?
            .ok_or_else(|| ServiceError::NotFound(id.clone()))
    }

    pub fn list(&self) -> Result<Vec<InstanceRecord>, ServiceError> {
        Ok(self.store.list()?)
    }

    /// Deliver an event to the live run of a stored instance
    ///
    /// Finished instances refuse events, as do instances whose run is not
    /// live in this process.
    pub fn post_event(&self, id: &InstanceId, event: ExternalEvent) -> Result<(), ServiceError> {
        let record = self
            .store
            .get(id)?
            .ok_or_else(|| ServiceError::NotFound(id.clone()))?;
        if record.run_status.is_some_and(RunStatus::is_terminal) {
            return Err(ServiceError::Finished(id.clone()));
        }
        let event_type = event.event_type.clone();
        if let Err(err) = self.intake.send(id, event) {
            tracing::debug!(instance = %id, error = %err, "event refused");
            return Err(ServiceError::NotRunning(id.clone()));
        }
        tracing::info!(instance = %id, event = %event_type, "event posted");
        Ok(())
    }

    /// Abort every run and delete every instance
    pub fn clear_all(&self) -> Result<Vec<InstanceRecord>, ServiceError> {
        {
            let mut runs = self.runs.lock().unwrap_or_else(|e| e.into_inner());
            for (_, run) in runs.live.drain() {
                run.handle.abort();
            }
            runs.finished.clear();
        }
        self.intake.clear();
        let cleared = self.store.clear()?;
        let now = self.clock.utc_now();
        for record in &cleared {
            self.broadcaster
                .publish(Update::removed(record.id.clone(), now));
        }
        tracing::info!(count = cleared.len(), "all instances cleared");
        Ok(cleared)
    }

    /// Restart runs for stored instances that had not finished
    ///
    /// Returns the ids that were resumed.
    pub fn resume_unfinished(&self) -> Result<Vec<InstanceId>, ServiceError> {
        let mut resumed = Vec::new();
        for record in self.store.list()? {
            let finished = record.run_status.is_some_and(RunStatus::is_terminal);
            if finished {
                continue;
            }
            tracing::info!(instance = %record.id, state = ?record.state, "resuming instance");
            self.spawn_run(record.id.clone());
            resumed.push(record.id);
        }
        Ok(resumed)
    }

    pub fn subscribe(&self) -> (ObserverId, mpsc::Receiver<Update>) {
        self.broadcaster.subscribe()
    }

    pub fn unsubscribe(&self, id: ObserverId) {
        self.broadcaster.unsubscribe(id);
    }

    /// Number of runs currently executing
    pub fn live_runs(&self) -> usize {
        let runs = self.runs.lock().unwrap_or_else(|e| e.into_inner());
        runs.live
            .values()
            .filter(|run| !run.handle.is_finished())
            .count()
    }

    /// Wait for the run of `id` to finish
    ///
    /// Returns `None` if no run was started for `id`, it was aborted, or its
    /// outcome has aged out of the recent outcomes.
    pub async fn wait(&self, id: &InstanceId) -> Option<RunOutcome> {
        let mut outcome = {
            let runs = self.runs.lock().unwrap_or_else(|e| e.into_inner());
            match runs.live.get(id) {
                Some(run) => run.outcome.clone(),
                None => return runs.finished_outcome(id),
            }
        };
        let result = outcome.wait_for(Option::is_some).await.ok()?;
        (*result).clone()
    }

    fn spawn_run(&self, id: InstanceId) {
        let mut runs = self.runs.lock().unwrap_or_else(|e| e.into_inner());
        if runs.live.get(&id).is_some_and(|run| !run.handle.is_finished()) {
            tracing::debug!(instance = %id, "run already live");
            return;
        }

        // Events posted before the task is first polled must be buffered
        self.intake.open(&id);

        let (tx, rx) = watch::channel(None);
        let orchestrator = Arc::clone(&self.orchestrator);
        let registry = Arc::clone(&self.runs);
        let run_id = id.clone();
        let handle = tokio::spawn(async move {
            let outcome = match orchestrator.run(&run_id).await {
                Ok(outcome) => outcome,
                Err(err) => {
                    tracing::error!(instance = %run_id, error = %err, "run failed");
                    RunOutcome::failure(err.to_string())
                }
            };
            // Retire before publishing so a woken waiter sees the run gone
            registry
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .retire(&run_id, outcome.clone());
            let _ = tx.send(Some(outcome));
        });
        runs.live.insert(
            id,
            LiveRun {
                handle,
                outcome: rx,
            },
        );
    }
}

/// Dropping the service stops its runs where they are; their snapshots let
/// the next service resume them.
impl<St, S, E: WorkflowEvent, C, I> Drop for WorkflowService<St, S, E, C, I> {
    fn drop(&mut self) {
        let runs = self.runs.lock().unwrap_or_else(|e| e.into_inner());
        for run in runs.live.values() {
            run.handle.abort();
        }
    }
}

#[cfg(test)]
#[path = "service_tests.rs"]
mod tests;
