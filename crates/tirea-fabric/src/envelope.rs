//! Transport envelope for shipping state between peers.
//!
//! A peer first sends a full snapshot of a named state (`set`), then
//! incremental traces (`update`) recorded against it. The receiving side
//! keeps plain JSON per state name and replays updates onto it.

use crate::apply::replay;
use crate::error::{FabricError, FabricResult};
use crate::mutation::Mutation;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use tracing::debug;

/// Value of the `type` field carried by every envelope.
pub const ENVELOPE_TYPE: &str = "@tirea/fabric-ws";

/// Envelope payload, tagged by `dataType`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "dataType", rename_all = "snake_case")]
pub enum Message {
    /// Replace the named state with a full snapshot.
    Set {
        value: Value,
        #[serde(rename = "stateName")]
        state_name: String,
    },
    /// Replay a trace onto the named state.
    Update {
        trace: Vec<Mutation>,
        #[serde(rename = "stateName")]
        state_name: String,
    },
}

/// A message on the wire.
///
/// ```
/// use tirea_fabric::{Envelope, TraceRoot};
/// use serde_json::json;
///
/// let root = TraceRoot::new(json!({"n": 0})).unwrap();
/// root.value().set("n", 1).unwrap();
///
/// let wire = serde_json::to_value(Envelope::update(root.take_trace(), "counter")).unwrap();
/// assert_eq!(wire["dataType"], "update");
/// assert_eq!(wire["stateName"], "counter");
/// assert_eq!(wire["trace"][0]["op"], "set");
/// ```
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    #[serde(rename = "type")]
    pub discriminant: String,
    #[serde(flatten)]
    pub message: Message,
}

impl Envelope {
    /// Full snapshot of `state_name`.
    pub fn set(value: Value, state_name: impl Into<String>) -> Self {
        Self {
            discriminant: ENVELOPE_TYPE.to_owned(),
            message: Message::Set {
                value,
                state_name: state_name.into(),
            },
        }
    }

    /// Incremental trace for `state_name`.
    pub fn update(trace: Vec<Mutation>, state_name: impl Into<String>) -> Self {
        Self {
            discriminant: ENVELOPE_TYPE.to_owned(),
            message: Message::Update {
                trace,
                state_name: state_name.into(),
            },
        }
    }

    pub fn state_name(&self) -> &str {
        match &self.message {
            Message::Set { state_name, .. } | Message::Update { state_name, .. } => state_name,
        }
    }

    /// Parse an incoming JSON value, rejecting foreign messages.
    pub fn from_value(value: Value) -> FabricResult<Self> {
        if !is_envelope(&value) {
            return Err(FabricError::malformed(format!(
                "expected envelope type {ENVELOPE_TYPE}"
            )));
        }
        Ok(serde_json::from_value(value)?)
    }
}

/// Whether `value` is an object whose `type` is [`ENVELOPE_TYPE`].
pub fn is_envelope(value: &Value) -> bool {
    value
        .get("type")
        .and_then(Value::as_str)
        .is_some_and(|t| t == ENVELOPE_TYPE)
}

/// Apply `envelope` to a map of named states.
///
/// `set` replaces (or creates) the state. `update` replays the trace onto
/// the existing state; the state is left untouched if any record fails, and
/// [`FabricError::UnknownState`] is returned when no base value exists.
pub fn apply_envelope(states: &mut HashMap<String, Value>, envelope: Envelope) -> FabricResult<()> {
    match envelope.message {
        Message::Set { value, state_name } => {
            debug!(state = %state_name, "state replaced");
            states.insert(state_name, value);
        }
        Message::Update { trace, state_name } => {
            let base = states
                .get_mut(&state_name)
                .ok_or_else(|| FabricError::UnknownState {
                    name: state_name.clone(),
                })?;
            *base = replay(base, &trace)?;
            debug!(state = %state_name, records = trace.len(), "state updated");
        }
    }
    Ok(())
}
