//! In-process messenger pair.
//!
//! Each [`LocalMessenger`] is one end of a pair: handlers registered on one end
//! receive the calls sent from the other. Handlers run on spawned Tokio tasks,
//! so a reply is produced off the caller's task, the same as with a real engine.
//! Closing (or dropping) an end fails every call still waiting on it.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock, Weak};

use async_trait::async_trait;
use tokio::sync::watch;
use tracing::{debug, warn};

use crate::{
    call::MethodCall,
    error::ChannelError,
    messenger::{MethodCallHandler, Messenger},
    reply::MethodReply,
};

struct Endpoint {
    handlers: RwLock<HashMap<String, Arc<dyn MethodCallHandler>>>,
    closed: watch::Sender<bool>,
}

impl Default for Endpoint {
    fn default() -> Self {
        Self {
            handlers: RwLock::new(HashMap::new()),
            closed: watch::channel(false).0,
        }
    }
}

impl Endpoint {
    fn handler(&self, channel: &str) -> Option<Arc<dyn MethodCallHandler>> {
        self.handlers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(channel)
            .cloned()
    }

    fn is_closed(&self) -> bool {
        *self.closed.borrow()
    }
}

/// One end of an in-process messenger pair.
#[derive(Clone)]
pub struct LocalMessenger {
    local: Arc<Endpoint>,
    peer: Weak<Endpoint>,
}

impl LocalMessenger {
    /// Create two connected ends, conventionally `(host, script)`.
    pub fn pair() -> (Self, Self) {
        let a = Arc::new(Endpoint::default());
        let b = Arc::new(Endpoint::default());
        let first = Self {
            local: Arc::clone(&a),
            peer: Arc::downgrade(&b),
        };
        let second = Self {
            local: b,
            peer: Arc::downgrade(&a),
        };
        (first, second)
    }

    /// Close this end: registered handlers are dropped, the peer's sends fail
    /// with `Disconnected` and this end's sends fail with `Closed`.
    /// Idempotent.
    pub fn close(&self) {
        if self.local.closed.send_replace(true) {
            return;
        }
        self.local
            .handlers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
        debug!("Local messenger closed");
    }

    pub fn is_closed(&self) -> bool {
        self.local.is_closed()
    }

    /// Whether a handler is registered on this end for `channel`.
    pub fn has_handler(&self, channel: &str) -> bool {
        self.local.handler(channel).is_some()
    }
}

/// Resolves once the endpoint behind `rx` is closed or dropped.
async fn closed(mut rx: watch::Receiver<bool>) {
    let _ = rx.wait_for(|closed| *closed).await;
}

#[async_trait]
impl Messenger for LocalMessenger {
    async fn send(&self, channel: &str, call: MethodCall) -> Result<MethodReply, ChannelError> {
        if self.is_closed() {
            warn!(channel, method = %call.method, "Send on closed messenger");
            return Err(ChannelError::Closed);
        }

        let (handler, peer_closed) = match self.peer.upgrade() {
            Some(peer) if !peer.is_closed() => (peer.handler(channel), peer.closed.subscribe()),
            _ => return Err(ChannelError::disconnected(channel)),
        };

        let Some(handler) = handler else {
            debug!(channel, method = %call.method, "No handler on peer");
            return Ok(MethodReply::NotImplemented);
        };

        debug!(channel, method = %call.method, "Dispatching call to peer");
        let mut reply = tokio::spawn(async move { handler.on_method_call(call).await });
        tokio::select! {
            joined = &mut reply => joined.map_err(|_| ChannelError::disconnected(channel)),
            _ = closed(peer_closed) => {
                reply.abort();
                Err(ChannelError::disconnected(channel))
            }
        }
    }

    fn set_handler(&self, channel: &str, handler: Option<Arc<dyn MethodCallHandler>>) {
        if self.is_closed() {
            warn!(channel, "Ignoring handler registration on closed messenger");
            return;
        }
        let mut handlers = self
            .local
            .handlers
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        match handler {
            Some(handler) => {
                handlers.insert(channel.to_string(), handler);
            }
            None => {
                handlers.remove(channel);
            }
        }
    }
}
