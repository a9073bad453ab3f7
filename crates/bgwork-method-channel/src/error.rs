use thiserror::Error;

/// Transport-level errors for method channels (no domain logic)
#[derive(Debug, Error)]
pub enum ChannelError {
    #[error("Channel '{channel}' is disconnected: the peer went away before replying")]
    Disconnected { channel: String },

    #[error("Messenger is closed")]
    Closed,

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl ChannelError {
    pub fn disconnected(channel: impl Into<String>) -> Self {
        ChannelError::Disconnected {
            channel: channel.into(),
        }
    }
}

impl From<serde_json::Error> for ChannelError {
    fn from(err: serde_json::Error) -> Self {
        ChannelError::Serialization(err.to_string())
    }
}
