// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared setup for scenario tests

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use tempfile::TempDir;
use wp_adapters::FakeJobQueue;
use wp_core::workflows::approval::{self, ApprovalEvent, ApprovalState};
use wp_core::{EngineState, ExternalEvent, InstanceId, SequentialIdGen, SystemClock};
use wp_engine::{
    Broadcaster, EnqueueJob, EventIntake, Orchestrator, OrchestratorDeps, RunConfig,
    RunOutcome, StepOptions, StepRegistry, WorkflowService,
};
use wp_storage::{InstanceRecord, InstanceStore, WalStore, WalStoreConfig};

pub use wp_adapters::QueueError;
pub use wp_storage::{RunStatus, StepJournal, StepOutcome};

pub type Service =
    WorkflowService<WalStore, ApprovalState, ApprovalEvent, SystemClock, SequentialIdGen>;

/// A project directory holding one WAL, reopened as often as a test likes
pub struct World {
    dir: TempDir,
    pub run: RunConfig,
    pub steps: StepOptions,
}

/// One daemon lifetime over the world's WAL
pub struct Daemon {
    pub service: Service,
    pub store: Arc<WalStore>,
    pub queue: FakeJobQueue,
    machine: wp_core::Machine<ApprovalState, ApprovalEvent>,
}

impl World {
    pub fn new() -> Self {
        let mut steps = StepOptions::default();
        steps.retry.initial_delay = Duration::from_millis(1);
        steps.retry.max_delay = Duration::from_millis(5);
        steps.retry.max_attempts = 3;
        Self {
            dir: tempfile::tempdir().unwrap(),
            run: RunConfig {
                event_timeout: Duration::from_secs(5),
                retain_finished: true,
            },
            steps,
        }
    }

    pub fn wal_path(&self) -> PathBuf {
        self.dir.path().join("wal").join("instances.wal")
    }

    pub fn open_store(&self) -> WalStore {
        WalStore::open(&self.wal_path(), WalStoreConfig::default(), SystemClock).unwrap()
    }

    /// Open the WAL and wire a service over it
    pub fn start(&self) -> Daemon {
        self.start_with(FakeJobQueue::new())
    }

    pub fn start_with(&self, queue: FakeJobQueue) -> Daemon {
        let store = Arc::new(self.open_store());
        let intake = Arc::new(EventIntake::new());
        let broadcaster = Arc::new(Broadcaster::default());
        let orchestrator = Orchestrator::new(
            approval::machine().unwrap(),
            OrchestratorDeps {
                store: Arc::clone(&store),
                intake: Arc::clone(&intake),
                broadcaster: Arc::clone(&broadcaster),
                steps: StepRegistry::new()
                    .register(approval::SEND_TO_QUEUE, EnqueueJob::new(queue.clone())),
            },
            SystemClock,
        )
        .with_run_config(self.run.clone())
        .with_step_options(self.steps.clone());
        let service = WorkflowService::new(
            orchestrator,
            Arc::clone(&store),
            intake,
            broadcaster,
            SequentialIdGen::default(),
            SystemClock,
        );
        Daemon {
            service,
            store,
            queue,
            machine: approval::machine().unwrap(),
        }
    }
}

impl Daemon {
    pub fn post(&self, id: &InstanceId, event: ExternalEvent) {
        self.service.post_event(id, event).unwrap();
    }

    pub async fn finish(&self, id: &InstanceId) -> RunOutcome {
        tokio::time::timeout(Duration::from_secs(10), self.service.wait(id))
            .await
            .expect("run did not finish")
            .expect("no run for instance")
    }

    pub fn record(&self, id: &InstanceId) -> InstanceRecord {
        self.store.get(id).unwrap().expect("instance record")
    }

    pub fn engine(&self, id: &InstanceId) -> EngineState<ApprovalState> {
        let snapshot = self.record(id).snapshot.expect("snapshot");
        self.machine.restore(&snapshot).unwrap()
    }

    /// Poll until the record reaches `state`
    pub async fn wait_for_state(&self, id: &InstanceId, state: &str) {
        let deadline = tokio::time::Instant::now() + Duration::from_secs(10);
        loop {
            let current = self.store.get(id).unwrap().and_then(|r| r.state);
            if current.as_deref() == Some(state) {
                return;
            }
            assert!(
                tokio::time::Instant::now() < deadline,
                "instance {id} never reached {state:?}, last {current:?}"
            );
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    }

    /// Poll until step `name` has a recorded outcome
    pub async fn wait_for_step(&self, id: &InstanceId, name: &str) {
        let deadline = tokio::time::Instant::now() + Duration::from_secs(10);
        loop {
            let step = self.store.step(id, name).unwrap();
            if step.is_some_and(|s| s.outcome.is_some()) {
                return;
            }
            assert!(
                tokio::time::Instant::now() < deadline,
                "step {name} of {id} never finished"
            );
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    }
}

pub fn process() -> ExternalEvent {
    ExternalEvent::named("process")
}

pub fn processed(output: f64) -> ExternalEvent {
    ExternalEvent::new("processed", json!({ "output": output }))
}

pub fn approved() -> ExternalEvent {
    ExternalEvent::named("approved")
}

pub fn rejected() -> ExternalEvent {
    ExternalEvent::named("rejected")
}
