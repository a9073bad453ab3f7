//! Scripted runtime doubles for driving workers without a real engine.
//!
//! [`ScriptedRuntimeFactory`] builds runtimes whose "script side" is a small
//! async program talking over a [`LocalMessenger`] pair, following a
//! [`ScriptBehavior`]. Everything the script observes is recorded in a
//! [`ScriptLog`].

use std::future::pending;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use bgwork_method_channel::{LocalMessenger, MethodCall, MethodCallHandler, Messenger, MethodReply};
use serde_json::Value;

use crate::callback::{
    CallbackHandle, CallbackInformation, InMemoryCallbackRegistry, InMemoryCallbackStore,
};
use crate::config::WorkerConfig;
use crate::coordinator::Coordinator;
use crate::debug::{DebugNotifier, TaskCompleted, TaskStarting};
use crate::error::WorkerError;
use crate::input::WorkInputData;
use crate::protocol::{BACKGROUND_CHANNEL_NAME, BackgroundMethod};
use crate::runtime::{RuntimeFactory, ScriptCallback, ScriptRuntime, SharedLoader};
use crate::worker::{BackgroundWorker, WorkerServices};

/// Handle registered by [`TestHarness`].
pub const TEST_CALLBACK_HANDLE: CallbackHandle = CallbackHandle(1001);

pub fn dispatcher_callback() -> CallbackInformation {
    CallbackInformation::new("callbackDispatcher", "", "package:app/main.dart")
}

/// How the script side of a scripted runtime behaves.
#[derive(Debug, Clone)]
pub enum ScriptBehavior {
    /// Signal readiness, then answer `onResultSend` with the reply.
    Reply(MethodReply),
    /// Signal readiness, then answer `onResultSend` after a delay.
    ReplyAfter(Duration, MethodReply),
    /// Never signal readiness.
    NeverReady,
    /// Signal readiness but never answer `onResultSend`.
    NeverReply,
    /// Signal readiness without installing a handler of its own.
    NoHandler,
    /// Signal readiness twice, then reply.
    ReadyTwice(MethodReply),
}

#[derive(Debug, Clone, PartialEq)]
pub enum ScriptEvent {
    Created,
    CallbackExecuted(ScriptCallback),
    ReadySent,
    TaskDelivered(Value),
    Destroyed { thread: Option<String> },
}

/// Everything scripted runtimes of one factory observed, in order.
#[derive(Debug, Default)]
pub struct ScriptLog {
    events: Mutex<Vec<ScriptEvent>>,
}

impl ScriptLog {
    fn record(&self, event: ScriptEvent) {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(event);
    }

    pub fn events(&self) -> Vec<ScriptEvent> {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn count(&self, pred: impl Fn(&ScriptEvent) -> bool) -> usize {
        self.events().iter().filter(|e| pred(e)).count()
    }

    pub fn created(&self) -> usize {
        self.count(|e| matches!(e, ScriptEvent::Created))
    }

    pub fn destroyed(&self) -> usize {
        self.count(|e| matches!(e, ScriptEvent::Destroyed { .. }))
    }

    pub fn ready_signals(&self) -> usize {
        self.count(|e| matches!(e, ScriptEvent::ReadySent))
    }

    pub fn callbacks_executed(&self) -> usize {
        self.count(|e| matches!(e, ScriptEvent::CallbackExecuted(_)))
    }

    /// Arguments of every `onResultSend` the script received.
    pub fn deliveries(&self) -> Vec<Value> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                ScriptEvent::TaskDelivered(arguments) => Some(arguments),
                _ => None,
            })
            .collect()
    }

    /// Names of the threads runtimes were destroyed on.
    pub fn destroy_threads(&self) -> Vec<String> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                ScriptEvent::Destroyed { thread } => Some(thread.unwrap_or_default()),
                _ => None,
            })
            .collect()
    }

    /// Every delivery was preceded by a ready signal.
    pub fn ready_precedes_delivery(&self) -> bool {
        let mut ready = 0usize;
        let mut delivered = 0usize;
        for event in self.events() {
            match event {
                ScriptEvent::ReadySent => ready += 1,
                ScriptEvent::TaskDelivered(_) => {
                    delivered += 1;
                    if delivered > ready {
                        return false;
                    }
                }
                _ => {}
            }
        }
        true
    }
}

/// Builds [`ScriptedRuntime`]s sharing one [`ScriptLog`].
pub struct ScriptedRuntimeFactory {
    behavior: ScriptBehavior,
    channel_name: String,
    log: Arc<ScriptLog>,
}

impl ScriptedRuntimeFactory {
    pub fn new(behavior: ScriptBehavior) -> Self {
        Self {
            behavior,
            channel_name: BACKGROUND_CHANNEL_NAME.to_string(),
            log: Arc::new(ScriptLog::default()),
        }
    }

    pub fn with_channel_name(mut self, name: impl Into<String>) -> Self {
        self.channel_name = name.into();
        self
    }

    pub fn log(&self) -> Arc<ScriptLog> {
        Arc::clone(&self.log)
    }
}

impl RuntimeFactory for ScriptedRuntimeFactory {
    fn create(&self) -> Result<Box<dyn ScriptRuntime>, WorkerError> {
        let (host, script) = LocalMessenger::pair();
        self.log.record(ScriptEvent::Created);
        Ok(Box::new(ScriptedRuntime {
            host: Arc::new(host),
            script,
            behavior: self.behavior.clone(),
            channel_name: self.channel_name.clone(),
            log: Arc::clone(&self.log),
            destroyed: false,
        }))
    }
}

pub struct ScriptedRuntime {
    host: Arc<LocalMessenger>,
    script: LocalMessenger,
    behavior: ScriptBehavior,
    channel_name: String,
    log: Arc<ScriptLog>,
    destroyed: bool,
}

impl ScriptRuntime for ScriptedRuntime {
    fn messenger(&self) -> Arc<dyn Messenger> {
        self.host.clone()
    }

    fn execute_callback(&mut self, callback: ScriptCallback) -> Result<(), WorkerError> {
        if self.destroyed {
            return Err(WorkerError::Runtime("runtime already destroyed".into()));
        }
        self.log.record(ScriptEvent::CallbackExecuted(callback));
        tokio::spawn(run_script(
            self.script.clone(),
            self.channel_name.clone(),
            self.behavior.clone(),
            Arc::clone(&self.log),
        ));
        Ok(())
    }

    fn destroy(&mut self) {
        if self.destroyed {
            return;
        }
        self.destroyed = true;
        self.script.close();
        self.host.close();
        self.log.record(ScriptEvent::Destroyed {
            thread: std::thread::current().name().map(str::to_string),
        });
    }
}

async fn run_script(
    script: LocalMessenger,
    channel: String,
    behavior: ScriptBehavior,
    log: Arc<ScriptLog>,
) {
    let (reply, delay, ready_count) = match behavior {
        ScriptBehavior::NeverReady => return,
        ScriptBehavior::Reply(reply) => (Some(reply), None, 1),
        ScriptBehavior::ReplyAfter(delay, reply) => (Some(reply), Some(delay), 1),
        ScriptBehavior::NeverReply => (None, None, 1),
        ScriptBehavior::ReadyTwice(reply) => (Some(reply), None, 2),
        ScriptBehavior::NoHandler => {
            log.record(ScriptEvent::ReadySent);
            let _ = script.send(&channel, ready_call()).await;
            return;
        }
    };

    script.set_handler(
        &channel,
        Some(Arc::new(ScriptDispatcher {
            reply,
            delay,
            log: Arc::clone(&log),
        })),
    );
    for _ in 0..ready_count {
        log.record(ScriptEvent::ReadySent);
        let _ = script.send(&channel, ready_call()).await;
    }
}

fn ready_call() -> MethodCall {
    MethodCall::no_arguments(BackgroundMethod::BackgroundChannelInitialized.as_str())
}

struct ScriptDispatcher {
    reply: Option<MethodReply>,
    delay: Option<Duration>,
    log: Arc<ScriptLog>,
}

#[async_trait]
impl MethodCallHandler for ScriptDispatcher {
    async fn on_method_call(&self, call: MethodCall) -> MethodReply {
        if call.method != BackgroundMethod::OnResultSend.as_str() {
            return MethodReply::NotImplemented;
        }
        self.log.record(ScriptEvent::TaskDelivered(call.arguments));
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        match &self.reply {
            Some(reply) => reply.clone(),
            None => pending().await,
        }
    }
}

#[derive(Debug, Clone)]
pub enum DebugEvent {
    Starting(TaskStarting),
    Completed(TaskCompleted),
}

/// Debug notifier that keeps every event.
#[derive(Debug, Default)]
pub struct RecordingDebugNotifier {
    events: Mutex<Vec<DebugEvent>>,
}

impl RecordingDebugNotifier {
    pub fn events(&self) -> Vec<DebugEvent> {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn completions(&self) -> Vec<TaskCompleted> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                DebugEvent::Completed(event) => Some(event),
                DebugEvent::Starting(_) => None,
            })
            .collect()
    }

    pub fn starts(&self) -> Vec<TaskStarting> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                DebugEvent::Starting(event) => Some(event),
                DebugEvent::Completed(_) => None,
            })
            .collect()
    }
}

impl DebugNotifier for RecordingDebugNotifier {
    fn post_task_starting(&self, event: TaskStarting) {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(DebugEvent::Starting(event));
    }

    fn post_task_complete(&self, event: TaskCompleted) {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(DebugEvent::Completed(event));
    }
}

/// Fully wired services around a scripted runtime.
pub struct TestHarness {
    pub services: WorkerServices,
    pub log: Arc<ScriptLog>,
    pub notifier: Arc<RecordingDebugNotifier>,
    pub registry: Arc<InMemoryCallbackRegistry>,
    pub store: Arc<InMemoryCallbackStore>,
}

impl TestHarness {
    pub fn new(behavior: ScriptBehavior) -> Self {
        Self::with_config(
            behavior,
            WorkerConfig::default().with_coordinator_thread_name("bgwork-test-coordinator"),
        )
    }

    pub fn with_config(behavior: ScriptBehavior, config: WorkerConfig) -> Self {
        let coordinator = Coordinator::spawn(&config.coordinator_thread_name)
            .expect("failed to spawn test coordinator");
        let factory = ScriptedRuntimeFactory::new(behavior)
            .with_channel_name(config.channel_name.clone());
        let log = factory.log();

        let registry = Arc::new(InMemoryCallbackRegistry::new());
        registry.register(TEST_CALLBACK_HANDLE, dispatcher_callback());
        let store = Arc::new(InMemoryCallbackStore::with_handle(TEST_CALLBACK_HANDLE));
        let notifier = Arc::new(RecordingDebugNotifier::default());

        let services = WorkerServices::new(
            coordinator,
            Arc::new(factory),
            Arc::new(SharedLoader::ready("/data/app/bundle")),
            store.clone(),
            registry.clone(),
        )
        .with_debug_notifier(notifier.clone())
        .with_config(config);

        Self {
            services,
            log,
            notifier,
            registry,
            store,
        }
    }

    pub fn worker(&self, input: WorkInputData) -> Arc<BackgroundWorker> {
        BackgroundWorker::new(self.services.clone(), input)
    }
}

/// Poll `condition` until it holds or two seconds pass.
pub async fn eventually(mut condition: impl FnMut() -> bool) -> bool {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
    while tokio::time::Instant::now() < deadline {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(2)).await;
    }
    condition()
}
