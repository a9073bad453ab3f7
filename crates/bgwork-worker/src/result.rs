use std::fmt;

use bgwork_method_channel::MethodReply;
use serde::{Deserialize, Serialize};
use tracing::error;

/// Terminal, scheduler-visible outcome of one work unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionResult {
    Success,
    Retry,
    Failure,
}

impl ExecutionResult {
    /// Map the script's reply to `onResultSend`.
    ///
    /// Only a literal `true` counts as success. Any other success value,
    /// including `null` and non-boolean values, asks for a retry.
    pub fn from_reply(reply: &MethodReply) -> Self {
        match reply {
            MethodReply::Success { value } if value.as_bool() == Some(true) => {
                ExecutionResult::Success
            }
            MethodReply::Success { .. } => ExecutionResult::Retry,
            MethodReply::Error { code, message, .. } => {
                error!(
                    code = %code,
                    error_message = message.as_deref().unwrap_or_default(),
                    "Script reported an error for the background task"
                );
                ExecutionResult::Failure
            }
            MethodReply::NotImplemented => ExecutionResult::Failure,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ExecutionResult::Success => "success",
            ExecutionResult::Retry => "retry",
            ExecutionResult::Failure => "failure",
        }
    }
}

impl fmt::Display for ExecutionResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
