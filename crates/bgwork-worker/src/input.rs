//! Scheduler input data and payload extraction.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::WorkerError;
use crate::protocol::{DART_TASK_KEY, IS_IN_DEBUG_MODE_KEY, PAYLOAD_PREFIX};

/// Payload handed to the script: prefix-stripped keys, JSON values.
pub type Payload = serde_json::Map<String, Value>;

/// A single value in the scheduler's input data.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum InputValue {
    Bool(bool),
    Int(i64),
    Double(f64),
    String(String),
    BoolArray(Vec<bool>),
    IntArray(Vec<i64>),
    DoubleArray(Vec<f64>),
    StringArray(Vec<String>),
}

impl InputValue {
    /// Convert to the value that crosses the channel. Arrays become ordered
    /// sequences of their elements; scalars pass through unchanged.
    pub fn to_value(&self) -> Value {
        match self {
            InputValue::Bool(b) => Value::Bool(*b),
            InputValue::Int(n) => Value::from(*n),
            InputValue::Double(n) => Value::from(*n),
            InputValue::String(s) => Value::String(s.clone()),
            InputValue::BoolArray(items) => items.iter().copied().map(Value::Bool).collect(),
            InputValue::IntArray(items) => items.iter().copied().map(Value::from).collect(),
            InputValue::DoubleArray(items) => items.iter().copied().map(Value::from).collect(),
            InputValue::StringArray(items) => items.iter().cloned().map(Value::String).collect(),
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            InputValue::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            InputValue::Bool(b) => Some(*b),
            _ => None,
        }
    }
}

impl From<bool> for InputValue {
    fn from(value: bool) -> Self {
        InputValue::Bool(value)
    }
}

impl From<i64> for InputValue {
    fn from(value: i64) -> Self {
        InputValue::Int(value)
    }
}

impl From<f64> for InputValue {
    fn from(value: f64) -> Self {
        InputValue::Double(value)
    }
}

impl From<&str> for InputValue {
    fn from(value: &str) -> Self {
        InputValue::String(value.to_string())
    }
}

impl From<String> for InputValue {
    fn from(value: String) -> Self {
        InputValue::String(value)
    }
}

impl From<Vec<i64>> for InputValue {
    fn from(value: Vec<i64>) -> Self {
        InputValue::IntArray(value)
    }
}

impl From<Vec<String>> for InputValue {
    fn from(value: Vec<String>) -> Self {
        InputValue::StringArray(value)
    }
}

/// Input data supplied by the scheduler when it dispatches a work unit.
///
/// Immutable once built; everything derived from it (task identifier, debug
/// flag, payload) is recomputed on demand.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WorkInputData {
    values: BTreeMap<String, InputValue>,
}

impl WorkInputData {
    pub fn builder() -> WorkInputDataBuilder {
        WorkInputDataBuilder::default()
    }

    pub fn get(&self, key: &str) -> Option<&InputValue> {
        self.values.get(key)
    }

    pub fn get_string(&self, key: &str) -> Option<&str> {
        self.get(key)?.as_str()
    }

    pub fn get_bool(&self, key: &str, default: bool) -> bool {
        self.get(key).and_then(InputValue::as_bool).unwrap_or(default)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// The task identifier the script dispatches on.
    pub fn task_identifier(&self) -> Result<&str, WorkerError> {
        self.get_string(DART_TASK_KEY)
            .ok_or_else(|| WorkerError::MissingInput(DART_TASK_KEY.to_string()))
    }

    pub fn is_in_debug(&self) -> bool {
        self.get_bool(IS_IN_DEBUG_MODE_KEY, false)
    }

    /// Payload entries: keys carrying the payload prefix, with the prefix
    /// stripped once. If two keys collide after stripping, the later key in
    /// sort order wins.
    pub fn payload(&self) -> Payload {
        self.values
            .iter()
            .filter_map(|(key, value)| {
                key.strip_prefix(PAYLOAD_PREFIX)
                    .map(|name| (name.to_string(), value.to_value()))
            })
            .collect()
    }
}

impl FromIterator<(String, InputValue)> for WorkInputData {
    fn from_iter<I: IntoIterator<Item = (String, InputValue)>>(iter: I) -> Self {
        Self {
            values: iter.into_iter().collect(),
        }
    }
}

impl From<BTreeMap<String, InputValue>> for WorkInputData {
    fn from(values: BTreeMap<String, InputValue>) -> Self {
        Self { values }
    }
}

/// Builder for [`WorkInputData`].
#[derive(Debug, Default)]
pub struct WorkInputDataBuilder {
    values: BTreeMap<String, InputValue>,
}

impl WorkInputDataBuilder {
    pub fn put(mut self, key: impl Into<String>, value: impl Into<InputValue>) -> Self {
        self.values.insert(key.into(), value.into());
        self
    }

    pub fn task(self, task: impl Into<String>) -> Self {
        self.put(DART_TASK_KEY, task.into())
    }

    pub fn debug(self, enabled: bool) -> Self {
        self.put(IS_IN_DEBUG_MODE_KEY, enabled)
    }

    /// Add a payload entry; `name` is stored under the payload prefix.
    pub fn payload(self, name: &str, value: impl Into<InputValue>) -> Self {
        self.put(format!("{PAYLOAD_PREFIX}{name}"), value)
    }

    pub fn build(self) -> WorkInputData {
        WorkInputData {
            values: self.values,
        }
    }
}
