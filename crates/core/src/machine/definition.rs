// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Machine definitions and their builder

use super::{StateKind, WorkflowState};
use crate::context::{Context, Delta};
use crate::event::WorkflowEvent;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

/// Pure predicate over the context and the triggering event
pub type Guard<E> = Arc<dyn Fn(&Context, Option<&E>) -> bool + Send + Sync>;

/// Pure function computing a context delta
pub type Assign<E> = Arc<dyn Fn(&Context, Option<&E>) -> Delta + Send + Sync>;

/// Something a rule or a state entry does
///
/// Actions never perform side effects. `Step` only requests a durable step,
/// which the orchestrator runs through the step memoizer.
pub enum Action<E> {
    Assign(Assign<E>),
    Step(String),
}

impl<E> Action<E> {
    pub fn assign<F>(f: F) -> Self
    where
        F: Fn(&Context, Option<&E>) -> Delta + Send + Sync + 'static,
    {
        Action::Assign(Arc::new(f))
    }

    pub fn step(kind: impl Into<String>) -> Self {
        Action::Step(kind.into())
    }
}

impl<E> Clone for Action<E> {
    fn clone(&self) -> Self {
        match self {
            Action::Assign(f) => Action::Assign(Arc::clone(f)),
            Action::Step(kind) => Action::Step(kind.clone()),
        }
    }
}

impl<E> fmt::Debug for Action<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Action::Assign(_) => f.write_str("Assign(..)"),
            Action::Step(kind) => f.debug_tuple("Step").field(kind).finish(),
        }
    }
}

/// What fires a rule
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trigger<K> {
    /// A specific event kind
    Event(K),
    /// Any event, including ones the workflow does not recognize
    AnyEvent,
    /// No event: evaluated on entering a state
    Always,
}

/// One entry of the transition table
pub struct Rule<S, E: WorkflowEvent> {
    pub(crate) from: Option<S>,
    pub(crate) trigger: Trigger<E::Kind>,
    pub(crate) guard: Option<Guard<E>>,
    pub(crate) target: S,
    pub(crate) reenter: bool,
    pub(crate) actions: Vec<Action<E>>,
}

impl<S: WorkflowState, E: WorkflowEvent> Rule<S, E> {
    fn new(trigger: Trigger<E::Kind>, target: S) -> Self {
        Self {
            from: None,
            trigger,
            guard: None,
            target,
            reenter: false,
            actions: Vec::new(),
        }
    }

    /// Transition to `target` on events of `kind`
    pub fn on(kind: E::Kind, target: S) -> Self {
        Self::new(Trigger::Event(kind), target)
    }

    /// Transition to `target` on any event
    pub fn any_event(target: S) -> Self {
        Self::new(Trigger::AnyEvent, target)
    }

    /// Eventless transition to `target`
    pub fn always(target: S) -> Self {
        Self::new(Trigger::Always, target)
    }

    /// Restrict the rule to one source state (rules without one apply in any
    /// non-terminal state)
    pub fn from(mut self, state: S) -> Self {
        self.from = Some(state);
        self
    }

    pub fn when<F>(mut self, guard: F) -> Self
    where
        F: Fn(&Context, Option<&E>) -> bool + Send + Sync + 'static,
    {
        self.guard = Some(Arc::new(guard));
        self
    }

    /// Run entry actions even when the target is the current state
    pub fn reenter(mut self) -> Self {
        self.reenter = true;
        self
    }

    pub fn assign<F>(mut self, f: F) -> Self
    where
        F: Fn(&Context, Option<&E>) -> Delta + Send + Sync + 'static,
    {
        self.actions.push(Action::assign(f));
        self
    }

    pub fn step(mut self, kind: impl Into<String>) -> Self {
        self.actions.push(Action::step(kind));
        self
    }

    pub(crate) fn applies_in(&self, state: S) -> bool {
        match self.from {
            Some(from) => from == state,
            None => !state.kind().is_terminal(),
        }
    }

    pub(crate) fn admits(&self, context: &Context, event: Option<&E>) -> bool {
        self.guard.as_ref().map_or(true, |guard| guard(context, event))
    }
}

impl<S: fmt::Debug, E: WorkflowEvent> fmt::Debug for Rule<S, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Rule")
            .field("from", &self.from)
            .field("trigger", &self.trigger)
            .field("guarded", &self.guard.is_some())
            .field("target", &self.target)
            .field("reenter", &self.reenter)
            .field("actions", &self.actions)
            .finish()
    }
}

/// Default transition for events no rule matches
pub(crate) struct Fallback<S> {
    pub(crate) target: S,
    pub(crate) message: Arc<dyn Fn(&str) -> String + Send + Sync>,
}

/// Errors detected while building a machine
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DefinitionError {
    #[error("machine id must not be empty")]
    EmptyId,
    #[error("initial state '{0}' is terminal")]
    TerminalInitial(&'static str),
    #[error("terminal state '{0}' has outgoing rules")]
    RulesFromTerminal(&'static str),
    #[error("fallback target '{0}' is not terminal")]
    FallbackNotTerminal(&'static str),
    #[error("machine '{0}' has no final state")]
    NoFinalState(String),
}

/// A validated workflow definition
pub struct Machine<S, E: WorkflowEvent> {
    pub(crate) id: String,
    pub(crate) initial: S,
    pub(crate) rules: Vec<Rule<S, E>>,
    pub(crate) entry: HashMap<S, Vec<Action<E>>>,
    pub(crate) fallback: Option<Fallback<S>>,
}

impl<S: WorkflowState, E: WorkflowEvent> Machine<S, E> {
    pub fn builder(id: impl Into<String>, initial: S) -> MachineBuilder<S, E> {
        MachineBuilder {
            id: id.into(),
            initial,
            rules: Vec::new(),
            entry: HashMap::new(),
            fallback: None,
        }
    }

    /// Definition id, stored in every snapshot
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn initial(&self) -> S {
        self.initial
    }

    pub fn has_fallback(&self) -> bool {
        self.fallback.is_some()
    }

    pub(crate) fn entry_actions(&self, state: S) -> &[Action<E>] {
        self.entry.get(&state).map(Vec::as_slice).unwrap_or_default()
    }
}

impl<S: fmt::Debug, E: WorkflowEvent> fmt::Debug for Machine<S, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Machine")
            .field("id", &self.id)
            .field("initial", &self.initial)
            .field("rules", &self.rules.len())
            .finish_non_exhaustive()
    }
}

/// Collects rules and entry actions, then validates them
pub struct MachineBuilder<S, E: WorkflowEvent> {
    id: String,
    initial: S,
    rules: Vec<Rule<S, E>>,
    entry: HashMap<S, Vec<Action<E>>>,
    fallback: Option<Fallback<S>>,
}

impl<S: WorkflowState, E: WorkflowEvent> MachineBuilder<S, E> {
    /// Add a rule; rules are tried in the order they are added
    pub fn rule(mut self, rule: Rule<S, E>) -> Self {
        self.rules.push(rule);
        self
    }

    /// Add an action run every time `state` is entered
    pub fn entry(mut self, state: S, action: Action<E>) -> Self {
        self.entry.entry(state).or_default().push(action);
        self
    }

    /// Route unmatched events to `target`, recording `message(event_type)` as
    /// the context's error message
    pub fn fallback<F>(mut self, target: S, message: F) -> Self
    where
        F: Fn(&str) -> String + Send + Sync + 'static,
    {
        self.fallback = Some(Fallback {
            target,
            message: Arc::new(message),
        });
        self
    }

    pub fn build(self) -> Result<Machine<S, E>, DefinitionError> {
        if self.id.is_empty() {
            return Err(DefinitionError::EmptyId);
        }
        if self.initial.kind().is_terminal() {
            return Err(DefinitionError::TerminalInitial(self.initial.name()));
        }
        if !S::all().iter().any(|s| s.kind() == StateKind::Final) {
            return Err(DefinitionError::NoFinalState(self.id));
        }
        if let Some(rule) = self
            .rules
            .iter()
            .find(|rule| rule.from.is_some_and(|from| from.kind().is_terminal()))
        {
            let state = rule.from.map(|s| s.name()).unwrap_or_default();
            return Err(DefinitionError::RulesFromTerminal(state));
        }
        if let Some(fallback) = &self.fallback {
            if !fallback.target.kind().is_terminal() {
                return Err(DefinitionError::FallbackNotTerminal(fallback.target.name()));
            }
        }

        Ok(Machine {
            id: self.id,
            initial: self.initial,
            rules: self.rules,
            entry: self.entry,
            fallback: self.fallback,
        })
    }
}
