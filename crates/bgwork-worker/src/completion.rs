//! Write-once completion shared between the worker and the scheduler.
//!
//! ```text
//! Pending -> Resolved(result)      (first resolve wins)
//! Resolved -> Resolved             (later resolves are no-ops)
//! ```

use std::future::IntoFuture;
use std::sync::Arc;

use futures::future::BoxFuture;
use tokio::sync::watch;

use crate::result::ExecutionResult;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CompletionState {
    Pending,
    Resolved(ExecutionResult),
}

impl CompletionState {
    fn is_resolved(&self) -> bool {
        matches!(self, CompletionState::Resolved(_))
    }

    fn result(&self) -> Option<ExecutionResult> {
        match self {
            CompletionState::Pending => None,
            CompletionState::Resolved(result) => Some(*result),
        }
    }
}

/// Create a linked completer/future pair in the `Pending` state.
pub fn completion_pair() -> (Completer, CompletionFuture) {
    let (tx, rx) = watch::channel(CompletionState::Pending);
    (Completer { tx: Arc::new(tx) }, CompletionFuture { rx })
}

/// Write side. Clones share one state; any clone may resolve it.
#[derive(Debug, Clone)]
pub struct Completer {
    tx: Arc<watch::Sender<CompletionState>>,
}

impl Completer {
    /// Resolve with `result`. Returns `true` only for the call that performed
    /// the `Pending -> Resolved` transition.
    pub fn resolve(&self, result: ExecutionResult) -> bool {
        self.tx.send_if_modified(|state| match state {
            CompletionState::Pending => {
                *state = CompletionState::Resolved(result);
                true
            }
            CompletionState::Resolved(_) => false,
        })
    }

    pub fn is_resolved(&self) -> bool {
        self.tx.borrow().is_resolved()
    }
}

/// Read side handed to the scheduler.
///
/// Awaiting it yields `Some(result)` once resolved, or `None` if every
/// [`Completer`] was dropped while still pending.
#[derive(Debug, Clone)]
pub struct CompletionFuture {
    rx: watch::Receiver<CompletionState>,
}

impl CompletionFuture {
    /// The result, if already resolved. Never blocks.
    pub fn peek(&self) -> Option<ExecutionResult> {
        self.rx.borrow().result()
    }

    pub fn is_resolved(&self) -> bool {
        self.rx.borrow().is_resolved()
    }

    pub async fn wait(mut self) -> Option<ExecutionResult> {
        let resolved = match self.rx.wait_for(CompletionState::is_resolved).await {
            Ok(state) => state.result(),
            Err(_) => None,
        };
        resolved.or_else(|| self.peek())
    }
}

impl IntoFuture for CompletionFuture {
    type Output = Option<ExecutionResult>;
    type IntoFuture = BoxFuture<'static, Option<ExecutionResult>>;

    fn into_future(self) -> Self::IntoFuture {
        Box::pin(self.wait())
    }
}
