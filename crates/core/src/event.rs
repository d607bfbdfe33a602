// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Workflow events
//!
//! Inside the engine every workflow speaks its own closed event enum. At the
//! boundary (socket requests, queue consumers) events travel as
//! [`ExternalEvent`], a `{type, payload}` pair that is decoded at the
//! orchestrator.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt::Debug;
use std::hash::Hash;
use thiserror::Error;

/// A closed set of events understood by one workflow definition
///
/// Implementors are expected to be internally tagged enums
/// (`#[serde(tag = "type")]`) whose tag matches [`WorkflowEvent::type_name`].
pub trait WorkflowEvent:
    Clone + Debug + PartialEq + Serialize + DeserializeOwned + Send + Sync + 'static
{
    /// Payload-free discriminant used to key the transition table
    type Kind: Copy + Eq + Hash + Debug + Send + Sync + 'static;

    fn kind(&self) -> Self::Kind;

    /// Wire name of this event
    fn type_name(&self) -> &'static str;

    /// Internal event injected into the machine on a fatal condition
    fn error(message: impl Into<String>) -> Self;
}

/// An event as delivered from outside the engine
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExternalEvent {
    #[serde(rename = "type")]
    pub event_type: String,
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub payload: Value,
}

impl ExternalEvent {
    pub fn new(event_type: impl Into<String>, payload: Value) -> Self {
        Self {
            event_type: event_type.into(),
            payload,
        }
    }

    /// An event with no payload
    pub fn named(event_type: impl Into<String>) -> Self {
        Self::new(event_type, Value::Null)
    }

    /// Encode a typed workflow event for delivery
    pub fn from_event<E: WorkflowEvent>(event: &E) -> Result<Self, DecodeError> {
        let mut fields = match serde_json::to_value(event)? {
            Value::Object(fields) => fields,
            other => return Err(DecodeError::NotAnObject(other.to_string())),
        };
        fields.remove("type");
        let payload = if fields.is_empty() {
            Value::Null
        } else {
            Value::Object(fields)
        };
        Ok(Self::new(event.type_name(), payload))
    }

    /// Decode into a workflow's typed event
    ///
    /// Object payload fields are lifted next to the `type` tag. Non-object
    /// payloads are ignored.
    pub fn decode<E: WorkflowEvent>(&self) -> Result<E, DecodeError> {
        let mut fields = match &self.payload {
            Value::Object(fields) => fields.clone(),
            _ => Map::new(),
        };
        fields.insert("type".to_string(), Value::String(self.event_type.clone()));
        let event = serde_json::from_value(Value::Object(fields))?;
        Ok(event)
    }
}

/// Errors converting between wire and typed events
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("event does not match any known type: {0}")]
    Json(#[from] serde_json::Error),
    #[error("event must serialize to an object, got {0}")]
    NotAnObject(String),
}

#[cfg(test)]
#[path = "event_tests.rs"]
mod tests;
