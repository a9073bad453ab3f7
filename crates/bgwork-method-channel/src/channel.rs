use std::sync::Arc;

use serde_json::Value;
use tracing::debug;

use crate::{
    call::MethodCall,
    error::ChannelError,
    messenger::{MethodCallHandler, Messenger},
    reply::MethodReply,
};

/// A named channel bound to one [`Messenger`].
///
/// Cheap to clone; clones address the same channel on the same messenger.
#[derive(Clone)]
pub struct MethodChannel {
    name: String,
    messenger: Arc<dyn Messenger>,
}

impl MethodChannel {
    pub fn new(messenger: Arc<dyn Messenger>, name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            messenger,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Register the handler for calls the other side makes on this channel.
    pub fn set_method_call_handler(&self, handler: Option<Arc<dyn MethodCallHandler>>) {
        self.messenger.set_handler(&self.name, handler);
    }

    /// Invoke `method` on the other side and wait for its reply.
    pub async fn invoke_method(
        &self,
        method: impl Into<String>,
        arguments: Value,
    ) -> Result<MethodReply, ChannelError> {
        let call = MethodCall::new(method, arguments);
        debug!(channel = %self.name, method = %call.method, "Invoking method");
        self.messenger.send(&self.name, call).await
    }
}

impl std::fmt::Debug for MethodChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MethodChannel")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}
