//! # Shared Coordinator Tests
//!
//! Many work units from different runtime factories share one coordinator
//! thread and one loader. Every runtime must be created and destroyed on that
//! thread, and every unit must resolve to the result its own script sent.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use bgwork_method_channel::MethodReply;
use bgwork_worker::testing::{
    ScriptBehavior, ScriptLog, ScriptedRuntimeFactory, TEST_CALLBACK_HANDLE, dispatcher_callback,
    eventually,
};
use bgwork_worker::{
    BackgroundWorker, Coordinator, ExecutionResult, InMemoryCallbackRegistry,
    InMemoryCallbackStore, NoopDebugNotifier, SharedLoader, WorkInputData, WorkerServices,
};
use serde_json::json;

const COORDINATOR_THREAD: &str = "bgwork-shared-coordinator";

struct Fleet {
    succeeding: WorkerServices,
    retrying: WorkerServices,
    succeeding_log: Arc<ScriptLog>,
    retrying_log: Arc<ScriptLog>,
    loads: Arc<AtomicUsize>,
}

impl Fleet {
    fn new() -> anyhow::Result<Self> {
        let coordinator = Coordinator::spawn(COORDINATOR_THREAD)?;
        let loads = Arc::new(AtomicUsize::new(0));
        let loader = Arc::new(SharedLoader::new("/data/app/bundle", {
            let loads = Arc::clone(&loads);
            move || {
                let loads = Arc::clone(&loads);
                async move {
                    tokio::time::sleep(Duration::from_millis(20)).await;
                    loads.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                }
            }
        }));

        let registry = Arc::new(InMemoryCallbackRegistry::new());
        registry.register(TEST_CALLBACK_HANDLE, dispatcher_callback());
        let store = Arc::new(InMemoryCallbackStore::with_handle(TEST_CALLBACK_HANDLE));

        let succeeding_factory =
            ScriptedRuntimeFactory::new(ScriptBehavior::Reply(MethodReply::success(json!(true))));
        let retrying_factory = ScriptedRuntimeFactory::new(ScriptBehavior::ReplyAfter(
            Duration::from_millis(5),
            MethodReply::success(json!("later")),
        ));
        let succeeding_log = succeeding_factory.log();
        let retrying_log = retrying_factory.log();

        let services = |factory: ScriptedRuntimeFactory| {
            WorkerServices::new(
                coordinator.clone(),
                Arc::new(factory),
                loader.clone(),
                store.clone(),
                registry.clone(),
            )
            .with_debug_notifier(Arc::new(NoopDebugNotifier))
        };

        Ok(Self {
            succeeding: services(succeeding_factory),
            retrying: services(retrying_factory),
            succeeding_log,
            retrying_log,
            loads,
        })
    }
}

fn input(n: i64) -> WorkInputData {
    WorkInputData::builder().task("batch").payload("n", n).build()
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_units_share_one_coordinator_thread() -> anyhow::Result<()> {
    let fleet = Fleet::new()?;

    let mut units = Vec::new();
    for n in 0..24_i64 {
        let services = if n % 2 == 0 {
            fleet.succeeding.clone()
        } else {
            fleet.retrying.clone()
        };
        let worker = BackgroundWorker::new(services, input(n));
        units.push((n, worker.start_work()));
    }

    for (n, completion) in units {
        let result = tokio::time::timeout(Duration::from_secs(5), completion).await?;
        let expected = if n % 2 == 0 {
            ExecutionResult::Success
        } else {
            ExecutionResult::Retry
        };
        assert_eq!(result, Some(expected), "unit {n}");
    }

    assert_eq!(fleet.loads.load(Ordering::SeqCst), 1);
    for log in [&fleet.succeeding_log, &fleet.retrying_log] {
        assert!(eventually(|| log.destroyed() == 12).await);
        assert_eq!(log.created(), 12);
        assert_eq!(log.deliveries().len(), 12);
        assert!(log.ready_precedes_delivery());
        assert!(
            log.destroy_threads()
                .iter()
                .all(|thread| thread == COORDINATOR_THREAD)
        );
    }
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_stops_racing_replies_settle_every_unit() -> anyhow::Result<()> {
    let fleet = Fleet::new()?;

    let mut units = Vec::new();
    for n in 0..16_i64 {
        let worker = BackgroundWorker::new(fleet.retrying.clone(), input(n));
        let completion = worker.start_work();
        if n % 4 == 0 {
            let stopper = Arc::clone(&worker);
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_millis(n as u64)).await;
                stopper.on_stopped();
            });
        }
        units.push((worker, completion));
    }

    assert!(eventually(|| units.iter().all(|(worker, _)| worker.is_finished())).await);
    for (_, completion) in &units {
        // a stopped unit may have resolved first or stayed pending
        assert!(matches!(
            completion.peek(),
            None | Some(ExecutionResult::Retry)
        ));
    }
    assert!(eventually(|| fleet.retrying_log.destroyed() == fleet.retrying_log.created()).await);
    assert_eq!(fleet.retrying_log.created(), 16);
    assert!(fleet.retrying_log.ready_precedes_delivery());
    Ok(())
}
