//! Dialog stack frames and their persisted form
//!
//! The stack is stored bottom first: the root frame is at index 0 and the
//! active frame is the last element. The same order is used on the wire.

pub mod memory;

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

use crate::errors::{DialogError, DialogResult};

/// One frame of the dialog stack
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DialogInstance {
    /// Id of the dialog that owns this frame
    pub dialog_id: String,
    /// Dialog private state
    #[serde(default)]
    pub state: Map<String, Value>,
    /// Last result handed to this frame; an explicit `null` is kept
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "present_value"
    )]
    pub result: Option<Value>,
}

impl DialogInstance {
    pub fn new(dialog_id: impl Into<String>) -> Self {
        Self {
            dialog_id: dialog_id.into(),
            state: Map::new(),
            result: None,
        }
    }
}

/// Persisted snapshot of one dialog stack
///
/// Container frames embed their own `DialogState` inside their frame state,
/// so the structure nests to any depth.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct DialogState {
    pub dialog_stack: Vec<DialogInstance>,
}

impl DialogState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.dialog_stack.is_empty()
    }

    pub fn depth(&self) -> usize {
        self.dialog_stack.len()
    }

    /// Decode a persisted snapshot
    ///
    /// `null` and `{}` decode to an empty stack (first contact). Anything that
    /// is not a well formed stack is reported as `CorruptState`.
    pub fn from_value(value: &Value) -> DialogResult<Self> {
        match value {
            Value::Null => Ok(Self::new()),
            Value::Object(map) if map.is_empty() => Ok(Self::new()),
            Value::Object(_) => {
                let state: DialogState = serde_json::from_value(value.clone())
                    .map_err(|e| DialogError::CorruptState(e.to_string()))?;
                if let Some(frame) = state.dialog_stack.iter().find(|f| f.dialog_id.is_empty()) {
                    return Err(DialogError::CorruptState(format!(
                        "frame with empty dialog id (state keys: {:?})",
                        frame.state.keys().collect::<Vec<_>>()
                    )));
                }
                Ok(state)
            }
            other => Err(DialogError::CorruptState(format!(
                "expected an object, found {}",
                json_kind(other)
            ))),
        }
    }

    /// Encode for persistence
    pub fn to_value(&self) -> DialogResult<Value> {
        Ok(serde_json::to_value(self)?)
    }
}

/// Only called when the field is present, so `"result": null` stays `Some`
fn present_value<'de, D>(deserializer: D) -> Result<Option<Value>, D::Error>
where
    D: Deserializer<'de>,
{
    Value::deserialize(deserializer).map(Some)
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
