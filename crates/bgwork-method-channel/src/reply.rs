use serde::{Deserialize, Serialize};
use serde_json::Value;

/// The single reply every method call completes with.
///
/// Mirrors the three ways a script-side handler can answer: a value, a
/// structured error, or the absence of any handler for the method.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum MethodReply {
    /// The handler completed and produced a value (possibly null)
    Success { value: Value },
    /// The handler failed with an error code
    Error {
        code: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        message: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        details: Option<Value>,
    },
    /// No handler is registered for the method
    NotImplemented,
}

impl MethodReply {
    pub fn success(value: Value) -> Self {
        MethodReply::Success { value }
    }

    pub fn error(code: impl Into<String>, message: Option<String>, details: Option<Value>) -> Self {
        MethodReply::Error {
            code: code.into(),
            message,
            details,
        }
    }

    /// Check if this is an error reply
    pub fn is_error(&self) -> bool {
        matches!(self, MethodReply::Error { .. })
    }

    /// Get the success value, if any
    pub fn as_value(&self) -> Option<&Value> {
        match self {
            MethodReply::Success { value } => Some(value),
            _ => None,
        }
    }
}

impl From<Value> for MethodReply {
    fn from(value: Value) -> Self {
        MethodReply::success(value)
    }
}
