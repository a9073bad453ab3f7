//! Background Worker: runs one scheduled work unit in its own script runtime.
//!
//! Lifecycle of a unit:
//!
//! ```text
//! start_work -> create runtime (coordinator) -> loader ready -> resolve callback
//!            -> open channel + execute callback (coordinator)
//!            <- backgroundChannelInitialized
//!            -> onResultSend { dart_task, input_data }
//!            <- reply -> stop_engine(result)
//! on_stopped -> stop_engine(None)
//! ```
//!
//! `stop_engine` is the single teardown path. Whichever caller flips the
//! `finished` flag first emits the completion diagnostic, resolves the
//! completion (if it carries a result), and posts runtime destruction to the
//! coordinator. Every later caller returns immediately.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, OnceLock, PoisonError, Weak};
use std::time::Duration;

use async_trait::async_trait;
use bgwork_method_channel::{MethodCall, MethodCallHandler, MethodChannel, MethodReply};
use chrono::Utc;
use serde_json::{Value, json};
use tokio::time::Instant;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::callback::{CallbackHandleStore, CallbackResolver, resolve_callback};
use crate::completion::{Completer, CompletionFuture, completion_pair};
use crate::config::WorkerConfig;
use crate::coordinator::{Coordinator, RuntimeId};
use crate::debug::{
    DebugNotifier, NoopDebugNotifier, TaskCompleted, TaskStarting, TracingDebugNotifier,
};
use crate::error::WorkerError;
use crate::input::WorkInputData;
use crate::protocol::{BackgroundMethod, DART_TASK_ARGUMENT, INPUT_DATA_ARGUMENT};
use crate::result::ExecutionResult;
use crate::runtime::{RuntimeFactory, RuntimeLoader, ScriptCallback};

/// Collaborators shared by every work unit of a host.
#[derive(Clone)]
pub struct WorkerServices {
    pub coordinator: Coordinator,
    pub runtime_factory: Arc<dyn RuntimeFactory>,
    pub loader: Arc<dyn RuntimeLoader>,
    pub handle_store: Arc<dyn CallbackHandleStore>,
    pub resolver: Arc<dyn CallbackResolver>,
    /// Used only for units whose debug flag is set
    pub debug_notifier: Arc<dyn DebugNotifier>,
    pub config: WorkerConfig,
}

impl WorkerServices {
    /// Services with `tracing` diagnostics and default configuration.
    pub fn new(
        coordinator: Coordinator,
        runtime_factory: Arc<dyn RuntimeFactory>,
        loader: Arc<dyn RuntimeLoader>,
        handle_store: Arc<dyn CallbackHandleStore>,
        resolver: Arc<dyn CallbackResolver>,
    ) -> Self {
        Self {
            coordinator,
            runtime_factory,
            loader,
            handle_store,
            resolver,
            debug_notifier: Arc::new(TracingDebugNotifier),
            config: WorkerConfig::default(),
        }
    }

    pub fn with_debug_notifier(mut self, notifier: Arc<dyn DebugNotifier>) -> Self {
        self.debug_notifier = notifier;
        self
    }

    pub fn with_config(mut self, config: WorkerConfig) -> Self {
        self.config = config;
        self
    }
}

/// Bridge between one scheduled work unit and one script runtime.
///
/// The scheduler drives it through [`start_work`](Self::start_work) and
/// [`on_stopped`](Self::on_stopped); both may be called from any thread.
pub struct BackgroundWorker {
    services: WorkerServices,
    input: WorkInputData,
    /// Random per-unit identifier carried by diagnostics
    unit_id: Uuid,
    debug: Arc<dyn DebugNotifier>,
    completer: Completer,
    completion: CompletionFuture,
    started: AtomicBool,
    start_time: OnceLock<Instant>,
    runtime: Mutex<Option<RuntimeId>>,
    channel: Arc<OnceLock<MethodChannel>>,
    announced: AtomicBool,
    delivered: AtomicBool,
    finished: AtomicBool,
}

impl BackgroundWorker {
    pub fn new(services: WorkerServices, input: WorkInputData) -> Arc<Self> {
        let debug: Arc<dyn DebugNotifier> = if input.is_in_debug() {
            Arc::clone(&services.debug_notifier)
        } else {
            Arc::new(NoopDebugNotifier)
        };
        let (completer, completion) = completion_pair();

        Arc::new(Self {
            services,
            input,
            unit_id: Uuid::now_v7(),
            debug,
            completer,
            completion,
            started: AtomicBool::new(false),
            start_time: OnceLock::new(),
            runtime: Mutex::new(None),
            channel: Arc::new(OnceLock::new()),
            announced: AtomicBool::new(false),
            delivered: AtomicBool::new(false),
            finished: AtomicBool::new(false),
        })
    }

    pub fn unit_id(&self) -> Uuid {
        self.unit_id
    }

    pub fn input(&self) -> &WorkInputData {
        &self.input
    }

    /// Begin the unit and return the pending completion immediately.
    ///
    /// Must be called within a Tokio runtime. Calling it again returns the
    /// same completion without starting a second runtime.
    pub fn start_work(self: &Arc<Self>) -> CompletionFuture {
        let completion = self.completion.clone();
        if self.started.swap(true, Ordering::AcqRel) {
            warn!(unit = %self.unit_id, "start_work called more than once");
            return completion;
        }
        let _ = self.start_time.set(Instant::now());

        let worker = Arc::clone(self);
        tokio::spawn(async move {
            if let Err(err) = worker.launch().await {
                if err.is_resolution_error() {
                    error!(unit = %worker.unit_id, error = %err, "Failed to resolve background callback");
                } else {
                    error!(unit = %worker.unit_id, error = %err, "Background work failed to start");
                }
                worker.finish(Some(ExecutionResult::Failure));
            }
        });

        completion
    }

    /// The scheduler stopped the unit. Tears the runtime down without
    /// resolving the completion; the scheduler already owns that outcome.
    pub fn on_stopped(&self) {
        info!(unit = %self.unit_id, "Background work stopped by scheduler");
        self.stop_engine(None);
    }

    /// Time since `start_work`, zero if not started.
    pub fn elapsed(&self) -> Duration {
        self.start_time
            .get()
            .map(Instant::elapsed)
            .unwrap_or_default()
    }

    pub fn is_finished(&self) -> bool {
        self.finished.load(Ordering::SeqCst)
    }

    async fn launch(self: &Arc<Self>) -> Result<(), WorkerError> {
        let factory = Arc::clone(&self.services.runtime_factory);
        let id = self
            .services
            .coordinator
            .run(move |slots| factory.create().map(|runtime| slots.insert(runtime)))
            .await??;

        let stopped = {
            let mut runtime = self.runtime.lock().unwrap_or_else(PoisonError::into_inner);
            *runtime = Some(id);
            self.is_finished()
        };
        if stopped {
            debug!(unit = %self.unit_id, "Stopped while the runtime was being created");
            self.destroy_runtime();
            return Ok(());
        }

        self.services.loader.ensure_initialized().await?;

        let (handle, callback) = resolve_callback(
            self.services.handle_store.as_ref(),
            self.services.resolver.as_ref(),
        )?;
        let task = self.input.task_identifier()?.to_string();
        let bundle_path = self.services.loader.bundle_path();

        {
            // announce only while unfinished; `finish` reads `announced` under this lock
            let _runtime = self.runtime.lock().unwrap_or_else(PoisonError::into_inner);
            if self.is_finished() {
                debug!(unit = %self.unit_id, "Stopped while loading, callback not executed");
                return Ok(());
            }
            self.debug.post_task_starting(TaskStarting {
                unit_id: self.unit_id,
                task: task.clone(),
                payload: self.input.payload(),
                callback_handle: handle,
                callback: callback.clone(),
                bundle_path: bundle_path.clone(),
                started_at: Utc::now(),
            });
            self.announced.store(true, Ordering::Release);
        }

        let handler: Arc<dyn MethodCallHandler> = Arc::new(BackgroundChannelHandler {
            worker: Arc::downgrade(self),
        });
        let channel_slot = Arc::clone(&self.channel);
        let channel_name = self.services.config.channel_name.clone();
        let script = ScriptCallback {
            bundle_path,
            callback,
        };

        let opened = self
            .services
            .coordinator
            .run(move |slots| -> Result<bool, WorkerError> {
                let Some(runtime) = slots.get_mut(id) else {
                    return Ok(false);
                };
                let channel = channel_slot
                    .get_or_init(|| MethodChannel::new(runtime.messenger(), channel_name));
                channel.set_method_call_handler(Some(handler));
                runtime.execute_callback(script)?;
                Ok(true)
            })
            .await??;

        if opened {
            debug!(unit = %self.unit_id, task = %task, runtime = %id, "Callback executing, waiting for channel");
        } else {
            debug!(unit = %self.unit_id, "Runtime released before the channel opened");
        }
        Ok(())
    }

    /// Answer the script's ready signal by sending it the task.
    fn deliver_task(self: Arc<Self>) {
        if self.is_finished() {
            debug!(unit = %self.unit_id, "Ready signal after finish ignored");
            return;
        }
        let Some(channel) = self.channel.get().cloned() else {
            warn!(unit = %self.unit_id, "Ready signal before the channel was opened");
            return;
        };
        if self.delivered.swap(true, Ordering::AcqRel) {
            warn!(unit = %self.unit_id, "Duplicate ready signal ignored");
            return;
        }

        let task = match self.input.task_identifier() {
            Ok(task) => task.to_string(),
            Err(err) => {
                error!(unit = %self.unit_id, error = %err, "Cannot deliver task");
                self.stop_engine(Some(ExecutionResult::Failure));
                return;
            }
        };
        let arguments = json!({
            DART_TASK_ARGUMENT: task,
            INPUT_DATA_ARGUMENT: Value::Object(self.input.payload()),
        });

        tokio::spawn(async move {
            let result = match channel
                .invoke_method(BackgroundMethod::OnResultSend.as_str(), arguments)
                .await
            {
                Ok(reply) => ExecutionResult::from_reply(&reply),
                Err(err) => {
                    error!(unit = %self.unit_id, error = %err, "Channel failed while waiting for the task result");
                    ExecutionResult::Failure
                }
            };
            self.stop_engine(Some(result));
        });
    }

    fn stop_engine(&self, result: Option<ExecutionResult>) {
        self.finish(result);
    }

    fn finish(&self, result: Option<ExecutionResult>) {
        if self.finished.swap(true, Ordering::SeqCst) {
            debug!(unit = %self.unit_id, result = ?result, "Work unit already finished");
            return;
        }
        let notify = {
            let _runtime = self.runtime.lock().unwrap_or_else(PoisonError::into_inner);
            self.announced.load(Ordering::Acquire)
        };

        let elapsed = self.elapsed();
        let elapsed_ms = u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX);
        if notify {
            self.debug.post_task_complete(TaskCompleted {
                unit_id: self.unit_id,
                task: self.input.task_identifier().unwrap_or_default().to_string(),
                payload: self.input.payload(),
                duration_ms: elapsed_ms,
                result: result.unwrap_or(self.services.config.stopped_result_marker),
                stopped: result.is_none(),
            });
        }

        match result {
            Some(result) => {
                self.completer.resolve(result);
                info!(unit = %self.unit_id, result = %result, elapsed_ms, "Background work finished");
            }
            None => {
                info!(unit = %self.unit_id, elapsed_ms, "Background work torn down without a result");
            }
        }

        self.destroy_runtime();
    }

    /// Post destruction to the coordinator. Safe to call repeatedly.
    fn destroy_runtime(&self) {
        let Some(id) = *self.runtime.lock().unwrap_or_else(PoisonError::into_inner) else {
            return;
        };
        let channel = Arc::clone(&self.channel);
        let unit_id = self.unit_id;

        let posted = self.services.coordinator.post(move |slots| {
            if let Some(channel) = channel.get() {
                channel.set_method_call_handler(None);
            }
            if slots.destroy(id) {
                debug!(unit = %unit_id, runtime = %id, "Work unit runtime released");
            }
        });
        if let Err(err) = posted {
            warn!(unit = %self.unit_id, error = %err, "Could not schedule runtime destruction");
        }
    }
}

impl std::fmt::Debug for BackgroundWorker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BackgroundWorker")
            .field("unit_id", &self.unit_id)
            .field("finished", &self.is_finished())
            .finish_non_exhaustive()
    }
}

/// Host-side handler for the background channel.
struct BackgroundChannelHandler {
    worker: Weak<BackgroundWorker>,
}

#[async_trait]
impl MethodCallHandler for BackgroundChannelHandler {
    async fn on_method_call(&self, call: MethodCall) -> MethodReply {
        match call.method.parse::<BackgroundMethod>() {
            Ok(BackgroundMethod::BackgroundChannelInitialized) => {
                if let Some(worker) = self.worker.upgrade() {
                    worker.deliver_task();
                }
                MethodReply::success(Value::Null)
            }
            Ok(method @ BackgroundMethod::OnResultSend) => {
                warn!(method = %method, "Script invoked a host-to-script method");
                MethodReply::NotImplemented
            }
            Err(err) => {
                debug!(error = %err, "Unhandled background channel method");
                MethodReply::NotImplemented
            }
        }
    }
}
