//! # Background Work E2E Tests
//!
//! Drives complete work units through a scripted runtime:
//! 1. Callback handle read from a JSON preferences file
//! 2. Missing preferences file fails the unit without running a callback
//! 3. TOML configuration with a custom channel and coordinator thread
//! 4. Scheduler stop while the script is still working
//! 5. Stopped marker surfaces in debug diagnostics

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use bgwork_method_channel::MethodReply;
use bgwork_worker::protocol::CALLBACK_DISPATCHER_HANDLE_KEY;
use bgwork_worker::testing::{
    ScriptBehavior, ScriptedRuntimeFactory, TestHarness, dispatcher_callback, eventually,
};
use bgwork_worker::{
    BackgroundWorker, CallbackHandle, Coordinator, ExecutionResult, InMemoryCallbackRegistry,
    JsonFileCallbackStore, SharedLoader, WorkInputData, WorkerConfig, WorkerServices,
};
use serde_json::json;

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn prefs_services(
    prefs: &std::path::Path,
    behavior: ScriptBehavior,
    loads: Arc<AtomicUsize>,
) -> anyhow::Result<(WorkerServices, Arc<bgwork_worker::testing::ScriptLog>)> {
    let coordinator = Coordinator::spawn("bgwork-e2e-coordinator")?;
    let factory = ScriptedRuntimeFactory::new(behavior);
    let log = factory.log();

    let registry = Arc::new(InMemoryCallbackRegistry::new());
    registry.register(CallbackHandle(7), dispatcher_callback());

    let loader = SharedLoader::new("/data/app/bundle", move || {
        let loads = Arc::clone(&loads);
        async move {
            loads.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    });

    let services = WorkerServices::new(
        coordinator,
        Arc::new(factory),
        Arc::new(loader),
        Arc::new(JsonFileCallbackStore::new(prefs)),
        registry,
    );
    Ok((services, log))
}

#[tokio::test]
async fn test_handle_from_preferences_file() -> anyhow::Result<()> {
    init_tracing();
    let dir = tempfile::tempdir()?;
    let prefs = dir.path().join("prefs.json");
    std::fs::write(
        &prefs,
        serde_json::to_string(&json!({ CALLBACK_DISPATCHER_HANDLE_KEY: 7, "theme": "dark" }))?,
    )?;

    let loads = Arc::new(AtomicUsize::new(0));
    let (services, log) = prefs_services(
        &prefs,
        ScriptBehavior::Reply(MethodReply::success(json!(true))),
        Arc::clone(&loads),
    )?;

    for n in 0..2_i64 {
        let input = WorkInputData::builder()
            .task("refresh")
            .payload("attempt", n)
            .build();
        let worker = BackgroundWorker::new(services.clone(), input);
        let result = tokio::time::timeout(Duration::from_secs(2), worker.start_work()).await?;
        assert_eq!(result, Some(ExecutionResult::Success));
    }

    assert_eq!(loads.load(Ordering::SeqCst), 1);
    assert!(eventually(|| log.destroyed() == 2).await);
    assert_eq!(log.created(), 2);
    assert_eq!(
        log.deliveries(),
        vec![
            json!({"dart_task": "refresh", "input_data": {"attempt": 0}}),
            json!({"dart_task": "refresh", "input_data": {"attempt": 1}}),
        ]
    );
    Ok(())
}

#[tokio::test]
async fn test_missing_preferences_file_fails_unit() -> anyhow::Result<()> {
    init_tracing();
    let dir = tempfile::tempdir()?;
    let loads = Arc::new(AtomicUsize::new(0));
    let (services, log) = prefs_services(
        &dir.path().join("absent.json"),
        ScriptBehavior::Reply(MethodReply::success(json!(true))),
        loads,
    )?;

    let worker = BackgroundWorker::new(services, WorkInputData::builder().task("refresh").build());
    let result = tokio::time::timeout(Duration::from_secs(2), worker.start_work()).await?;

    assert_eq!(result, Some(ExecutionResult::Failure));
    assert!(eventually(|| log.destroyed() == 1).await);
    assert_eq!(log.callbacks_executed(), 0);
    assert!(log.deliveries().is_empty());
    Ok(())
}

#[tokio::test]
async fn test_toml_config_routes_channel_and_thread() -> anyhow::Result<()> {
    init_tracing();
    let config = WorkerConfig::from_toml_str(
        r#"
        channel_name = "acme/background_jobs"
        coordinator_thread_name = "acme-coordinator"
        "#,
    )?;
    let harness = TestHarness::with_config(
        ScriptBehavior::Reply(MethodReply::success(json!(true))),
        config,
    );

    let worker = harness.worker(WorkInputData::builder().task("upload").build());
    let result = tokio::time::timeout(Duration::from_secs(2), worker.start_work()).await?;

    assert_eq!(result, Some(ExecutionResult::Success));
    assert!(eventually(|| harness.log.destroyed() == 1).await);
    assert_eq!(harness.log.destroy_threads(), vec!["acme-coordinator".to_string()]);
    Ok(())
}

#[tokio::test]
async fn test_stop_while_script_is_working() {
    init_tracing();
    let harness = TestHarness::new(ScriptBehavior::ReplyAfter(
        Duration::from_millis(300),
        MethodReply::success(json!(true)),
    ));
    let worker = harness.worker(WorkInputData::builder().task("sync").build());
    let completion = worker.start_work();

    assert!(eventually(|| harness.log.deliveries().len() == 1).await);
    worker.on_stopped();

    assert!(eventually(|| harness.log.destroyed() == 1).await);
    assert!(worker.is_finished());
    tokio::time::sleep(Duration::from_millis(400)).await;
    assert_eq!(completion.peek(), None);
    assert_eq!(harness.log.destroyed(), 1);
}

#[tokio::test]
async fn test_stopped_marker_reported_in_diagnostics() {
    init_tracing();
    let harness = TestHarness::with_config(
        ScriptBehavior::NeverReady,
        WorkerConfig::default()
            .with_coordinator_thread_name("bgwork-marker-coordinator")
            .with_stopped_result_marker(ExecutionResult::Retry),
    );
    let worker = harness.worker(
        WorkInputData::builder()
            .task("cleanup")
            .debug(true)
            .payload("scope", "cache")
            .build(),
    );
    let completion = worker.start_work();

    assert!(eventually(|| harness.notifier.starts().len() == 1).await);
    worker.on_stopped();

    assert!(eventually(|| harness.log.destroyed() == 1).await);
    let completions = harness.notifier.completions();
    assert_eq!(completions.len(), 1);
    assert!(completions[0].stopped);
    assert_eq!(completions[0].result, ExecutionResult::Retry);
    assert_eq!(completions[0].task, "cleanup");
    assert_eq!(completions[0].payload.get("scope"), Some(&json!("cache")));
    assert_eq!(completion.peek(), None);
}
