//! # Method Channels
//!
//! A transport-agnostic, bidirectional method-call channel between a host and an
//! embedded script runtime. The host and the script each register a
//! [`MethodCallHandler`] on a named channel and invoke methods on the other side;
//! every call completes with exactly one [`MethodReply`].
//!
//! ## Features
//! - Three-way replies: success, error, not implemented
//! - Pluggable transports through the [`Messenger`] trait
//! - An in-process [`LocalMessenger`] pair for embedding and testing (`local` feature)
//!
//! ```rust
//! use std::sync::Arc;
//! use async_trait::async_trait;
//! use bgwork_method_channel::prelude::*;
//!
//! struct Echo;
//!
//! #[async_trait]
//! impl MethodCallHandler for Echo {
//!     async fn on_method_call(&self, call: MethodCall) -> MethodReply {
//!         MethodReply::success(call.arguments)
//!     }
//! }
//!
//! # async fn example() -> Result<(), ChannelError> {
//! let (host, script) = LocalMessenger::pair();
//! let script = Arc::new(script);
//! MethodChannel::new(script.clone(), "echo").set_method_call_handler(Some(Arc::new(Echo)));
//!
//! let channel = MethodChannel::new(Arc::new(host), "echo");
//! let reply = channel.invoke_method("ping", serde_json::json!(1)).await?;
//! assert_eq!(reply, MethodReply::success(serde_json::json!(1)));
//! # Ok(())
//! # }
//! ```

pub mod call;
pub mod channel;
pub mod error;
#[cfg(feature = "local")]
pub mod local;
pub mod messenger;
pub mod prelude;
pub mod reply;

pub use call::MethodCall;
pub use channel::MethodChannel;
pub use error::ChannelError;
#[cfg(feature = "local")]
pub use local::LocalMessenger;
pub use messenger::{MethodCallHandler, Messenger};
pub use reply::MethodReply;
