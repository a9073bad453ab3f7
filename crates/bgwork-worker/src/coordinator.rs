//! Coordinator: the single thread that owns script runtimes.
//!
//! Runtimes are not thread-safe, so every operation on one (creation, opening
//! channels, executing callbacks, destruction) is posted here as a job and runs
//! strictly in submission order. The thread hosts a current-thread Tokio
//! runtime so jobs may spawn local async work.

use std::collections::HashMap;
use std::fmt;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::thread::ThreadId;

use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, info};

use crate::error::WorkerError;
use crate::runtime::ScriptRuntime;

/// Identifies a runtime owned by the coordinator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RuntimeId(u64);

impl fmt::Display for RuntimeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "rt-{}", self.0)
    }
}

/// Live runtimes. Only reachable from coordinator jobs.
#[derive(Default)]
pub struct RuntimeSlots {
    next_id: u64,
    runtimes: HashMap<RuntimeId, Box<dyn ScriptRuntime>>,
}

impl RuntimeSlots {
    pub fn insert(&mut self, runtime: Box<dyn ScriptRuntime>) -> RuntimeId {
        self.next_id += 1;
        let id = RuntimeId(self.next_id);
        self.runtimes.insert(id, runtime);
        id
    }

    pub fn get_mut(&mut self, id: RuntimeId) -> Option<&mut Box<dyn ScriptRuntime>> {
        self.runtimes.get_mut(&id)
    }

    pub fn contains(&self, id: RuntimeId) -> bool {
        self.runtimes.contains_key(&id)
    }

    /// Destroy and forget the runtime. Returns `false` if it was already gone.
    pub fn destroy(&mut self, id: RuntimeId) -> bool {
        match self.runtimes.remove(&id) {
            Some(mut runtime) => {
                runtime.destroy();
                debug!(runtime = %id, "Runtime destroyed");
                true
            }
            None => false,
        }
    }

    pub fn len(&self) -> usize {
        self.runtimes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.runtimes.is_empty()
    }

    fn destroy_all(&mut self) {
        let ids: Vec<_> = self.runtimes.keys().copied().collect();
        for id in ids {
            self.destroy(id);
        }
    }
}

type Job = Box<dyn FnOnce(&mut RuntimeSlots) + Send>;

/// Handle to the coordination thread. Clones share the same thread; the
/// thread exits once every handle is dropped and queued jobs have run.
#[derive(Clone)]
pub struct Coordinator {
    tx: mpsc::UnboundedSender<Job>,
    thread_id: ThreadId,
    thread_name: Arc<str>,
}

impl Coordinator {
    pub fn spawn(thread_name: &str) -> Result<Self, WorkerError> {
        let (tx, mut rx) = mpsc::unbounded_channel::<Job>();
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()?;

        let handle = std::thread::Builder::new()
            .name(thread_name.to_string())
            .spawn(move || {
                let mut slots = RuntimeSlots::default();
                runtime.block_on(async {
                    while let Some(job) = rx.recv().await {
                        if catch_unwind(AssertUnwindSafe(|| job(&mut slots))).is_err() {
                            error!("Coordinator job panicked");
                        }
                    }
                });
                slots.destroy_all();
                debug!("Coordinator thread exiting");
            })?;

        info!(thread = thread_name, "Coordinator started");
        Ok(Self {
            tx,
            thread_id: handle.thread().id(),
            thread_name: Arc::from(thread_name),
        })
    }

    /// Queue a job without waiting for it.
    pub fn post<F>(&self, job: F) -> Result<(), WorkerError>
    where
        F: FnOnce(&mut RuntimeSlots) + Send + 'static,
    {
        self.tx
            .send(Box::new(job))
            .map_err(|_| WorkerError::CoordinatorClosed)
    }

    /// Queue a job and wait for its return value.
    pub async fn run<F, R>(&self, job: F) -> Result<R, WorkerError>
    where
        F: FnOnce(&mut RuntimeSlots) -> R + Send + 'static,
        R: Send + 'static,
    {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.post(move |slots| {
            let _ = reply_tx.send(job(slots));
        })?;
        reply_rx.await.map_err(|_| WorkerError::CoordinatorClosed)
    }

    /// Whether the caller is running on the coordinator thread.
    pub fn is_current(&self) -> bool {
        std::thread::current().id() == self.thread_id
    }

    pub fn thread_name(&self) -> &str {
        &self.thread_name
    }
}

impl fmt::Debug for Coordinator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Coordinator")
            .field("thread_name", &self.thread_name)
            .finish_non_exhaustive()
    }
}
