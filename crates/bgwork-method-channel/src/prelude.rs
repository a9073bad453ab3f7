//! Prelude module for convenient imports.
//!
//! ```rust,no_run
//! use bgwork_method_channel::prelude::*;
//! ```

pub use crate::call::MethodCall;
pub use crate::channel::MethodChannel;
pub use crate::error::ChannelError;
#[cfg(feature = "local")]
pub use crate::local::LocalMessenger;
pub use crate::messenger::{MethodCallHandler, Messenger};
pub use crate::reply::MethodReply;
