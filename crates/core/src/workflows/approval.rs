// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Approval workflow
//!
//! States: Unprocessed → Sending To Queue → Waiting For Approval → Finished
//!
//! Every entry into "Sending To Queue" enqueues a job. The job's result comes
//! back as a `processed` event carrying an `output` in [0, 1). Outputs above
//! the threshold wait for a human decision; anything else is reprocessed.

use crate::context::{Delta, ERROR_MESSAGE, OUTPUT};
use crate::event::WorkflowEvent;
use crate::machine::{Action, DefinitionError, Machine, Rule, StateKind, WorkflowState};
use serde::{Deserialize, Serialize};

/// Machine id recorded in snapshots
pub const MACHINE_ID: &str = "approval";

/// Step kind requested on every entry into [`ApprovalState::SendingToQueue`]
pub const SEND_TO_QUEUE: &str = "send-to-queue";

/// Outputs strictly above this wait for approval
pub const THRESHOLD: f64 = 0.5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ApprovalState {
    Unprocessed,
    #[serde(rename = "Sending To Queue")]
    SendingToQueue,
    #[serde(rename = "Waiting For Approval")]
    WaitingForApproval,
    Finished,
    Error,
}

impl WorkflowState for ApprovalState {
    fn name(&self) -> &'static str {
        match self {
            ApprovalState::Unprocessed => "Unprocessed",
            ApprovalState::SendingToQueue => "Sending To Queue",
            ApprovalState::WaitingForApproval => "Waiting For Approval",
            ApprovalState::Finished => "Finished",
            ApprovalState::Error => "Error",
        }
    }

    fn kind(&self) -> StateKind {
        match self {
            ApprovalState::Finished => StateKind::Final,
            ApprovalState::Error => StateKind::Error,
            _ => StateKind::Normal,
        }
    }

    fn all() -> &'static [Self] {
        &[
            ApprovalState::Unprocessed,
            ApprovalState::SendingToQueue,
            ApprovalState::WaitingForApproval,
            ApprovalState::Finished,
            ApprovalState::Error,
        ]
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ApprovalEvent {
    Process,
    Processed {
        output: f64,
    },
    Approved,
    Rejected,
    Error {
        #[serde(rename = "errorMessage")]
        error_message: String,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ApprovalEventKind {
    Process,
    Processed,
    Approved,
    Rejected,
    Error,
}

impl WorkflowEvent for ApprovalEvent {
    type Kind = ApprovalEventKind;

    fn kind(&self) -> ApprovalEventKind {
        match self {
            ApprovalEvent::Process => ApprovalEventKind::Process,
            ApprovalEvent::Processed { .. } => ApprovalEventKind::Processed,
            ApprovalEvent::Approved => ApprovalEventKind::Approved,
            ApprovalEvent::Rejected => ApprovalEventKind::Rejected,
            ApprovalEvent::Error { .. } => ApprovalEventKind::Error,
        }
    }

    fn type_name(&self) -> &'static str {
        match self {
            ApprovalEvent::Process => "process",
            ApprovalEvent::Processed { .. } => "processed",
            ApprovalEvent::Approved => "approved",
            ApprovalEvent::Rejected => "rejected",
            ApprovalEvent::Error { .. } => "error",
        }
    }

    fn error(message: impl Into<String>) -> Self {
        ApprovalEvent::Error {
            error_message: message.into(),
        }
    }
}

pub type ApprovalMachine = Machine<ApprovalState, ApprovalEvent>;

fn output_of(event: Option<&ApprovalEvent>) -> Option<f64> {
    match event {
        Some(ApprovalEvent::Processed { output }) => Some(*output),
        _ => None,
    }
}

/// Build the approval workflow definition
pub fn machine() -> Result<ApprovalMachine, DefinitionError> {
    use ApprovalEventKind as Kind;
    use ApprovalState::*;

    Machine::builder(MACHINE_ID, Unprocessed)
        .entry(SendingToQueue, Action::step(SEND_TO_QUEUE))
        .rule(Rule::on(Kind::Process, SendingToQueue).from(Unprocessed))
        .rule(
            Rule::on(Kind::Processed, WaitingForApproval)
                .from(SendingToQueue)
                .when(|_, event| output_of(event).is_some_and(|output| output > THRESHOLD))
                .assign(|_, event| {
                    let output = output_of(event).unwrap_or_default();
                    Delta::new().set(OUTPUT, output).set(
                        ERROR_MESSAGE,
                        format!(
                            "Output {:.2} passed the {} threshold, waiting for approval",
                            output, THRESHOLD
                        ),
                    )
                }),
        )
        .rule(
            Rule::on(Kind::Processed, SendingToQueue)
                .from(SendingToQueue)
                .reenter()
                .assign(|_, event| {
                    let output = output_of(event).unwrap_or_default();
                    Delta::new().set(OUTPUT, output).set(
                        ERROR_MESSAGE,
                        format!(
                            "Output {:.2} is below the {} threshold, reprocessing",
                            output, THRESHOLD
                        ),
                    )
                }),
        )
        .rule(Rule::on(Kind::Approved, Finished).from(WaitingForApproval))
        .rule(
            Rule::on(Kind::Rejected, SendingToQueue)
                .from(WaitingForApproval)
                .reenter(),
        )
        .rule(Rule::on(Kind::Error, Error).assign(|_, event| match event {
            Some(ApprovalEvent::Error { error_message }) => {
                Delta::new().set(ERROR_MESSAGE, error_message.clone())
            }
            _ => Delta::new(),
        }))
        .fallback(Error, |event_type| format!("Unknown event: {}", event_type))
        .build()
}

#[cfg(test)]
#[path = "approval_tests.rs"]
mod tests;
