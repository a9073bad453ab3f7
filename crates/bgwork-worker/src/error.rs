//! Unified error type for background work.

use bgwork_method_channel::ChannelError;

/// Every variant is folded into an [`ExecutionResult`](crate::ExecutionResult)
/// at the worker boundary; none escapes to the scheduler.
#[derive(Debug, thiserror::Error)]
pub enum WorkerError {
    #[error("Missing input data: {0}")]
    MissingInput(String),

    #[error("No callback handle stored under '{0}'")]
    MissingCallbackHandle(String),

    #[error("Failed to resolve callback for handle {0}")]
    UnresolvedCallback(i64),

    #[error("Callback store error: {0}")]
    Store(String),

    #[error("Runtime error: {0}")]
    Runtime(String),

    #[error("Runtime loader failed to initialize: {0}")]
    Loader(String),

    #[error("Coordinator thread has shut down")]
    CoordinatorClosed,

    #[error("Channel error: {0}")]
    Channel(#[from] ChannelError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl WorkerError {
    /// Errors raised while mapping the stored handle to an entry point.
    pub fn is_resolution_error(&self) -> bool {
        matches!(
            self,
            WorkerError::MissingCallbackHandle(_)
                | WorkerError::UnresolvedCallback(_)
                | WorkerError::Store(_)
        )
    }
}

impl From<serde_json::Error> for WorkerError {
    fn from(err: serde_json::Error) -> Self {
        WorkerError::Serialization(err.to_string())
    }
}

impl From<toml::de::Error> for WorkerError {
    fn from(err: toml::de::Error) -> Self {
        WorkerError::Config(err.to_string())
    }
}
