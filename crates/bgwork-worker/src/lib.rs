//! # Background Work Bridge
//!
//! **Runs one scheduled unit of background work inside a fresh script runtime.**
//!
//! When the host scheduler dispatches a work unit, a [`BackgroundWorker`] boots a
//! runtime instance, resolves the persisted callback handle into a script entry
//! point, and hands the task identity and payload to the script over a
//! [`MethodChannel`](bgwork_method_channel::MethodChannel). The script answers
//! with success, retry, or failure; the worker then tears the runtime down and
//! resolves the scheduler's [`CompletionFuture`] exactly once.
//!
//! ## Architecture
//!
//! - **[`BackgroundWorker`]**: lifecycle root, `start_work` / `on_stopped`
//! - **[`Coordinator`]**: the single thread that owns and destroys runtimes
//! - **[`CompletionFuture`]**: write-once outcome the scheduler awaits
//! - **[`WorkInputData`]**: scheduler input and payload extraction
//! - **Collaborators**: [`RuntimeFactory`], [`RuntimeLoader`],
//!   [`CallbackHandleStore`], [`CallbackResolver`], [`DebugNotifier`]

pub mod callback;
pub mod completion;
pub mod config;
pub mod coordinator;
pub mod debug;
pub mod error;
pub mod input;
pub mod prelude;
pub mod protocol;
pub mod result;
pub mod runtime;
#[cfg(any(test, feature = "test-utils"))]
pub mod testing;
pub mod worker;

pub use callback::{
    CallbackHandle, CallbackHandleStore, CallbackInformation, CallbackResolver,
    InMemoryCallbackRegistry, InMemoryCallbackStore, JsonFileCallbackStore,
};
pub use completion::{Completer, CompletionFuture, completion_pair};
pub use config::WorkerConfig;
pub use coordinator::{Coordinator, RuntimeId, RuntimeSlots};
pub use debug::{DebugNotifier, NoopDebugNotifier, TaskCompleted, TaskStarting, TracingDebugNotifier};
pub use error::WorkerError;
pub use input::{InputValue, Payload, WorkInputData};
pub use protocol::BackgroundMethod;
pub use result::ExecutionResult;
pub use runtime::{RuntimeFactory, RuntimeLoader, ScriptCallback, ScriptRuntime, SharedLoader};
pub use worker::{BackgroundWorker, WorkerServices};
