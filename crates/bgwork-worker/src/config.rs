//! Worker configuration.

use serde::{Deserialize, Serialize};

use crate::error::WorkerError;
use crate::protocol::BACKGROUND_CHANNEL_NAME;
use crate::result::ExecutionResult;

/// Configuration shared by every work unit of a host.
///
/// ```rust
/// use bgwork_worker::WorkerConfig;
///
/// let config = WorkerConfig::from_toml_str(r#"coordinator_thread_name = "bg-main""#).unwrap();
/// assert_eq!(config.coordinator_thread_name, "bg-main");
/// assert_eq!(config, WorkerConfig::default().with_coordinator_thread_name("bg-main"));
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerConfig {
    /// Channel the script-side dispatcher listens on
    pub channel_name: String,
    /// Name of the coordinator OS thread
    pub coordinator_thread_name: String,
    /// Result reported in completion diagnostics when a unit was stopped
    pub stopped_result_marker: ExecutionResult,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            channel_name: BACKGROUND_CHANNEL_NAME.to_string(),
            coordinator_thread_name: "bgwork-coordinator".to_string(),
            stopped_result_marker: ExecutionResult::Failure,
        }
    }
}

impl WorkerConfig {
    pub fn from_toml_str(source: &str) -> Result<Self, WorkerError> {
        let config: Self = toml::from_str(source)?;
        config.validate()?;
        Ok(config)
    }

    pub fn with_channel_name(mut self, name: impl Into<String>) -> Self {
        self.channel_name = name.into();
        self
    }

    pub fn with_coordinator_thread_name(mut self, name: impl Into<String>) -> Self {
        self.coordinator_thread_name = name.into();
        self
    }

    pub fn with_stopped_result_marker(mut self, marker: ExecutionResult) -> Self {
        self.stopped_result_marker = marker;
        self
    }

    pub fn validate(&self) -> Result<(), WorkerError> {
        if self.channel_name.trim().is_empty() {
            return Err(WorkerError::Config("channel_name must not be empty".into()));
        }
        if self.coordinator_thread_name.contains('\0') {
            return Err(WorkerError::Config(
                "coordinator_thread_name must not contain NUL".into(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = WorkerConfig::default();
        assert_eq!(config.channel_name, BACKGROUND_CHANNEL_NAME);
        assert_eq!(config.stopped_result_marker, ExecutionResult::Failure);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_from_toml() {
        let config = WorkerConfig::from_toml_str(
            r#"
            channel_name = "custom/background"
            stopped_result_marker = "retry"
            "#,
        )
        .unwrap();

        assert_eq!(config.channel_name, "custom/background");
        assert_eq!(config.coordinator_thread_name, "bgwork-coordinator");
        assert_eq!(config.stopped_result_marker, ExecutionResult::Retry);
    }

    #[test]
    fn test_invalid_toml() {
        assert!(matches!(
            WorkerConfig::from_toml_str("channel_name = 3"),
            Err(WorkerError::Config(_))
        ));
        assert!(matches!(
            WorkerConfig::from_toml_str(r#"channel_name = "  ""#),
            Err(WorkerError::Config(_))
        ));
    }
}
