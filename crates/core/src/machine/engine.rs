// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The pure transition function

use super::definition::{Action, Machine, Rule, Trigger};
use super::{StateKind, WorkflowState};
use crate::context::{Context, Delta, ERROR_MESSAGE};
use crate::event::WorkflowEvent;
use crate::step::StepRequest;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Upper bound on chained eventless transitions
pub const MAX_EVENTLESS_HOPS: usize = 64;

/// Engine status, derived from the kind of the current state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    Active,
    Done,
    Error,
}

/// Everything needed to resume a machine exactly where it stopped
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EngineState<S> {
    pub state: S,
    pub context: Context,
    pub status: Status,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Logical step counter, used to name steps deterministically
    #[serde(default)]
    pub step_seq: u64,
    /// Requested steps whose outcome has not been applied yet
    #[serde(default)]
    pub pending: Vec<StepRequest>,
}

impl<S: WorkflowState> EngineState<S> {
    pub fn is_active(&self) -> bool {
        self.status == Status::Active
    }

    /// Mark a pending step as done
    pub fn complete_step(&mut self, name: &str) {
        self.pending.retain(|step| step.name != name);
    }
}

/// Errors raised by a transition
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransitionError {
    #[error("no transition from '{state}' for event '{event}'")]
    UnknownTransition { state: &'static str, event: String },
    #[error("state '{state}' is terminal")]
    Terminal { state: &'static str },
    #[error("eventless transitions from '{state}' did not settle")]
    EventlessLoop { state: &'static str },
}

type Outcome<S> = Result<EngineState<S>, TransitionError>;

impl<S: WorkflowState, E: WorkflowEvent> Machine<S, E> {
    /// Initial engine state: entry actions of the initial state have run and
    /// eventless rules have settled
    pub fn start(&self, context: Context) -> Outcome<S> {
        let mut next = EngineState {
            state: self.initial,
            context,
            status: Status::Active,
            error: None,
            step_seq: 0,
            pending: Vec::new(),
        };
        let entry = self.entry_actions(self.initial);
        run_actions(&mut next, entry, None);
        self.settle(&mut next)?;
        Ok(next)
    }

    /// Apply a typed event
    pub fn transition(&self, current: &EngineState<S>, event: &E) -> Outcome<S> {
        ensure_active(current)?;
        let kind = event.kind();
        let rule = self
            .select(current, Some(event), |t| *t == Trigger::Event(kind))
            .or_else(|| self.select(current, Some(event), |t| *t == Trigger::AnyEvent));

        match rule {
            Some(rule) => self.fire(current, rule, Some(event)),
            None => self.fall_back(current, event.type_name()),
        }
    }

    /// Apply an event whose type this workflow does not recognize
    ///
    /// Only wildcard rules and the fallback can match it.
    pub fn transition_unrecognized(&self, current: &EngineState<S>, event_type: &str) -> Outcome<S> {
        ensure_active(current)?;
        match self.select(current, None, |t| *t == Trigger::AnyEvent) {
            Some(rule) => self.fire(current, rule, None),
            None => self.fall_back(current, event_type),
        }
    }

    /// Route a fatal condition into the error terminal
    ///
    /// Enters the fallback target when one is defined, otherwise marks the
    /// current state as failed in place. Terminal states are left unchanged.
    pub fn fail(&self, current: &EngineState<S>, message: &str) -> EngineState<S> {
        if !current.is_active() {
            return current.clone();
        }
        let mut next = current.clone();
        next.context
            .apply(Delta::new().set(ERROR_MESSAGE, message.to_string()));

        if let Some(target) = self.fallback.as_ref().map(|f| f.target) {
            let mut entered = next.clone();
            match self.enter(&mut entered, target, true, None) {
                Ok(()) => return entered,
                Err(err) => {
                    tracing::debug!(machine = %self.id, error = %err, "fallback entry failed");
                }
            }
        }

        next.status = Status::Error;
        next.error = Some(message.to_string());
        next
    }

    fn select(
        &self,
        current: &EngineState<S>,
        event: Option<&E>,
        trigger: impl Fn(&Trigger<E::Kind>) -> bool,
    ) -> Option<&Rule<S, E>> {
        let state = current.state;
        let specific = self.rules.iter().filter(move |r| r.from == Some(state));
        let any_state = self.rules.iter().filter(|r| r.from.is_none());
        specific
            .chain(any_state)
            .filter(|r| trigger(&r.trigger) && r.applies_in(state))
            .find(|r| r.admits(&current.context, event))
    }

    fn fire(&self, current: &EngineState<S>, rule: &Rule<S, E>, event: Option<&E>) -> Outcome<S> {
        let mut next = current.clone();
        run_actions(&mut next, &rule.actions, event);
        let run_entry = rule.reenter || rule.target != current.state;
        self.enter(&mut next, rule.target, run_entry, event)?;
        Ok(next)
    }

    fn fall_back(&self, current: &EngineState<S>, event_type: &str) -> Outcome<S> {
        let Some(fallback) = &self.fallback else {
            tracing::debug!(
                machine = %self.id,
                state = current.state.name(),
                event = event_type,
                "no rule matched"
            );
            return Err(TransitionError::UnknownTransition {
                state: current.state.name(),
                event: event_type.to_string(),
            });
        };
        tracing::debug!(
            machine = %self.id,
            state = current.state.name(),
            event = event_type,
            target = fallback.target.name(),
            "no rule matched, taking fallback"
        );
        let mut next = current.clone();
        let message = (fallback.message)(event_type);
        next.context.apply(Delta::new().set(ERROR_MESSAGE, message));
        self.enter(&mut next, fallback.target, true, None)?;
        Ok(next)
    }

    fn enter(
        &self,
        next: &mut EngineState<S>,
        target: S,
        run_entry: bool,
        event: Option<&E>,
    ) -> Result<(), TransitionError> {
        next.state = target;
        if run_entry {
            run_actions(next, self.entry_actions(target), event);
        }
        self.settle(next)
    }

    /// Follow eventless rules until none applies, then derive the status
    fn settle(&self, next: &mut EngineState<S>) -> Result<(), TransitionError> {
        let mut hops = 0;
        while let Some(rule) = self.select(next, None, |t| *t == Trigger::Always) {
            if hops == MAX_EVENTLESS_HOPS {
                tracing::debug!(
                    machine = %self.id,
                    state = next.state.name(),
                    hops,
                    "eventless transitions did not settle"
                );
                return Err(TransitionError::EventlessLoop {
                    state: next.state.name(),
                });
            }
            hops += 1;
            let previous = next.state;
            run_actions(next, &rule.actions, None);
            next.state = rule.target;
            if rule.reenter || rule.target != previous {
                run_actions(next, self.entry_actions(rule.target), None);
            }
        }

        match next.state.kind() {
            StateKind::Normal => next.status = Status::Active,
            StateKind::Final => next.status = Status::Done,
            StateKind::Error => {
                next.status = Status::Error;
                next.error = Some(
                    next.context
                        .error_message()
                        .map(str::to_string)
                        .unwrap_or_else(|| format!("entered {}", next.state.name())),
                );
            }
        }
        Ok(())
    }
}

fn ensure_active<S: WorkflowState>(current: &EngineState<S>) -> Result<(), TransitionError> {
    if current.is_active() {
        Ok(())
    } else {
        Err(TransitionError::Terminal {
            state: current.state.name(),
        })
    }
}

fn run_actions<S, E>(next: &mut EngineState<S>, actions: &[Action<E>], event: Option<&E>) {
    for action in actions {
        match action {
            Action::Assign(assign) => {
                let delta = assign(&next.context, event);
                next.context.apply(delta);
            }
            Action::Step(kind) => {
                next.step_seq += 1;
                next.pending.push(StepRequest::new(kind.clone(), next.step_seq));
            }
        }
    }
}

#[cfg(test)]
#[path = "engine_tests.rs"]
mod tests;
