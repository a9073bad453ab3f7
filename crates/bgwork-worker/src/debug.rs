//! Diagnostic notifications for work units running in debug mode.
//!
//! Both calls are fire-and-forget: a notifier cannot influence the unit's
//! [`ExecutionResult`](crate::ExecutionResult).

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::info;
use uuid::Uuid;

use crate::callback::{CallbackHandle, CallbackInformation};
use crate::input::Payload;
use crate::result::ExecutionResult;

/// Emitted after the callback resolved, before the runtime executes it.
#[derive(Debug, Clone, Serialize)]
pub struct TaskStarting {
    pub unit_id: Uuid,
    pub task: String,
    pub payload: Payload,
    pub callback_handle: CallbackHandle,
    pub callback: CallbackInformation,
    pub bundle_path: String,
    pub started_at: DateTime<Utc>,
}

/// Emitted once when the unit finishes or is stopped.
#[derive(Debug, Clone, Serialize)]
pub struct TaskCompleted {
    pub unit_id: Uuid,
    pub task: String,
    pub payload: Payload,
    pub duration_ms: u64,
    /// The reported result, or the configured marker when the unit was stopped
    pub result: ExecutionResult,
    pub stopped: bool,
}

pub trait DebugNotifier: Send + Sync {
    fn post_task_starting(&self, event: TaskStarting);
    fn post_task_complete(&self, event: TaskCompleted);
}

/// Used whenever the unit's debug flag is off.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopDebugNotifier;

impl DebugNotifier for NoopDebugNotifier {
    fn post_task_starting(&self, _event: TaskStarting) {}
    fn post_task_complete(&self, _event: TaskCompleted) {}
}

/// Emits diagnostics as structured `tracing` events.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingDebugNotifier;

impl DebugNotifier for TracingDebugNotifier {
    fn post_task_starting(&self, event: TaskStarting) {
        info!(
            unit = %event.unit_id,
            task = %event.task,
            payload = %serde_json::Value::Object(event.payload),
            handle = %event.callback_handle,
            callback = %event.callback.callback_name,
            library = %event.callback.callback_library_path,
            bundle = %event.bundle_path,
            started_at = %event.started_at.to_rfc3339(),
            "Background task starting"
        );
    }

    fn post_task_complete(&self, event: TaskCompleted) {
        info!(
            unit = %event.unit_id,
            task = %event.task,
            payload = %serde_json::Value::Object(event.payload),
            elapsed_ms = event.duration_ms,
            result = %event.result,
            stopped = event.stopped,
            "Background task complete"
        );
    }
}
