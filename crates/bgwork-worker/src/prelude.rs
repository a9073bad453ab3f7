//! Prelude module for convenient imports.
//!
//! ```rust,no_run
//! use bgwork_worker::prelude::*;
//! ```

pub use crate::callback::{
    CallbackHandle, CallbackHandleStore, CallbackInformation, CallbackResolver,
    InMemoryCallbackRegistry, InMemoryCallbackStore, JsonFileCallbackStore,
};
pub use crate::completion::CompletionFuture;
pub use crate::config::WorkerConfig;
pub use crate::coordinator::Coordinator;
pub use crate::debug::{DebugNotifier, NoopDebugNotifier, TracingDebugNotifier};
pub use crate::error::WorkerError;
pub use crate::input::{InputValue, Payload, WorkInputData};
pub use crate::result::ExecutionResult;
pub use crate::runtime::{RuntimeFactory, RuntimeLoader, ScriptCallback, ScriptRuntime, SharedLoader};
pub use crate::worker::{BackgroundWorker, WorkerServices};
