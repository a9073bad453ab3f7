//! Script runtime abstractions.
//!
//! A [`ScriptRuntime`] is single-use and not thread-safe: it is created, driven,
//! and destroyed only on the [`Coordinator`](crate::Coordinator) thread.

use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use bgwork_method_channel::Messenger;
use futures::future::BoxFuture;
use tokio::sync::OnceCell;
use tracing::{debug, info};

use crate::callback::CallbackInformation;
use crate::error::WorkerError;

/// Entry point the runtime is asked to execute.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScriptCallback {
    pub bundle_path: String,
    pub callback: CallbackInformation,
}

/// One isolated, single-use script engine instance.
pub trait ScriptRuntime {
    /// Transport for channels bound to this instance.
    fn messenger(&self) -> Arc<dyn Messenger>;

    /// Start executing the entry point. Returns once execution is scheduled;
    /// the script signals readiness over the channel.
    fn execute_callback(&mut self, callback: ScriptCallback) -> Result<(), WorkerError>;

    /// Release the engine. Must tolerate repeated calls.
    fn destroy(&mut self);
}

/// Builds runtime instances; always called on the coordinator thread.
pub trait RuntimeFactory: Send + Sync {
    fn create(&self) -> Result<Box<dyn ScriptRuntime>, WorkerError>;
}

/// Process-wide engine loading that must complete before any callback runs.
#[async_trait]
pub trait RuntimeLoader: Send + Sync {
    /// Wait until the engine's assets are loaded.
    async fn ensure_initialized(&self) -> Result<(), WorkerError>;

    /// Location of the application bundle the callback is loaded from.
    fn bundle_path(&self) -> String;
}

type InitFn = Box<dyn Fn() -> BoxFuture<'static, Result<(), WorkerError>> + Send + Sync>;

/// Loader whose initialization runs at most once and is shared by every work
/// unit. A failed initialization is retried by the next caller.
pub struct SharedLoader {
    bundle_path: String,
    init: InitFn,
    initialized: OnceCell<()>,
}

impl SharedLoader {
    pub fn new<F, Fut>(bundle_path: impl Into<String>, init: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), WorkerError>> + Send + 'static,
    {
        Self {
            bundle_path: bundle_path.into(),
            init: Box::new(move || Box::pin(init())),
            initialized: OnceCell::new(),
        }
    }

    /// A loader with nothing to initialize.
    pub fn ready(bundle_path: impl Into<String>) -> Self {
        Self::new(bundle_path, || async { Ok(()) })
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized.initialized()
    }
}

#[async_trait]
impl RuntimeLoader for SharedLoader {
    async fn ensure_initialized(&self) -> Result<(), WorkerError> {
        if self.initialized.initialized() {
            return Ok(());
        }
        self.initialized
            .get_or_try_init(|| async {
                info!(bundle = %self.bundle_path, "Initializing runtime loader");
                (self.init)().await
            })
            .await?;
        debug!("Runtime loader ready");
        Ok(())
    }

    fn bundle_path(&self) -> String {
        self.bundle_path.clone()
    }
}

impl std::fmt::Debug for SharedLoader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SharedLoader")
            .field("bundle_path", &self.bundle_path)
            .field("initialized", &self.is_initialized())
            .finish_non_exhaustive()
    }
}
