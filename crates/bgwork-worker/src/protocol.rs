//! Fixed contract shared by the scheduler, the host, and the script side.
//!
//! Key names and method names here are versioned together with the script-side
//! dispatcher; changing any of them breaks already-deployed scripts.

use std::fmt;
use std::str::FromStr;

/// Name of the channel the background dispatcher listens on.
pub const BACKGROUND_CHANNEL_NAME: &str = "bgwork/background_channel_work_manager";

/// Input data key holding the task identifier.
pub const DART_TASK_KEY: &str = "bgwork.DART_TASK";
/// Input data key holding the debug flag.
pub const IS_IN_DEBUG_MODE_KEY: &str = "bgwork.IS_IN_DEBUG_MODE_KEY";
/// Input data key prefix marking payload entries.
pub const PAYLOAD_PREFIX: &str = "payload_";

/// `onResultSend` argument carrying the task identifier.
pub const DART_TASK_ARGUMENT: &str = "dart_task";
/// `onResultSend` argument carrying the payload map.
pub const INPUT_DATA_ARGUMENT: &str = "input_data";

/// Preference key the callback dispatcher handle is persisted under.
pub const CALLBACK_DISPATCHER_HANDLE_KEY: &str = "bgwork.CALLBACK_DISPATCHER_HANDLE_KEY";

/// The closed set of methods exchanged on the background channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BackgroundMethod {
    /// Script to host: the script-side handler is wired up.
    BackgroundChannelInitialized,
    /// Host to script: deliver the task identity and payload.
    OnResultSend,
}

impl BackgroundMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            BackgroundMethod::BackgroundChannelInitialized => "backgroundChannelInitialized",
            BackgroundMethod::OnResultSend => "onResultSend",
        }
    }
}

impl fmt::Display for BackgroundMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Returned for method names outside the background protocol.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Unknown background method: {0}")]
pub struct UnknownMethod(pub String);

impl FromStr for BackgroundMethod {
    type Err = UnknownMethod;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "backgroundChannelInitialized" => Ok(BackgroundMethod::BackgroundChannelInitialized),
            "onResultSend" => Ok(BackgroundMethod::OnResultSend),
            other => Err(UnknownMethod(other.to_string())),
        }
    }
}
