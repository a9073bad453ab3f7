use std::sync::Arc;

use async_trait::async_trait;

use crate::{call::MethodCall, error::ChannelError, reply::MethodReply};

/// Trait for handling method calls arriving on a channel
#[async_trait]
pub trait MethodCallHandler: Send + Sync {
    /// Handle one inbound call. Every call is answered with exactly one reply;
    /// unknown methods should answer [`MethodReply::NotImplemented`].
    async fn on_method_call(&self, call: MethodCall) -> MethodReply;
}

/// Transport that carries method calls between two sides of a runtime.
///
/// Implementations must be `Send + Sync`: replies are delivered to whichever
/// task awaits [`Messenger::send`], which need not be the task that owns the runtime.
#[async_trait]
pub trait Messenger: Send + Sync {
    /// Send a call to the handler registered for `channel` on the other side
    /// and wait for its reply.
    async fn send(&self, channel: &str, call: MethodCall) -> Result<MethodReply, ChannelError>;

    /// Install (or with `None`, remove) the handler for calls arriving on `channel`.
    fn set_handler(&self, channel: &str, handler: Option<Arc<dyn MethodCallHandler>>);
}
