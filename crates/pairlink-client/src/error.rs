//! Client error types

use std::borrow::Cow;
use thiserror::Error;

/// Errors that can occur in client operations
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ClientError {
    /// None of the configured shards accepted a connection
    #[error("No relay shard available")]
    NoShardAvailable,

    /// Transport-level failure (connect, read, write)
    #[error("Transport error: {0}")]
    Transport(Cow<'static, str>),

    /// Operation timed out
    #[error("Operation timed out")]
    Timeout,

    /// Client was shut down
    #[error("Client closed")]
    Closed,

    /// Message could not be encoded
    #[error("Serialization error: {0}")]
    Serialization(Cow<'static, str>),

    /// Shard URL could not be parsed
    #[error("Invalid shard URL: {0}")]
    InvalidUrl(String),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfig(Cow<'static, str>),
}

impl ClientError {
    /// Returns true if retrying (possibly against another shard) may succeed
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            ClientError::Transport(_) | ClientError::Timeout | ClientError::NoShardAvailable
        )
    }

    /// Create a transport error with static context (zero allocation)
    #[must_use]
    pub const fn transport(context: &'static str) -> Self {
        ClientError::Transport(Cow::Borrowed(context))
    }

    /// Create an invalid configuration error with static context (zero allocation)
    #[must_use]
    pub const fn invalid_config(context: &'static str) -> Self {
        ClientError::InvalidConfig(Cow::Borrowed(context))
    }
}

impl From<tokio_tungstenite::tungstenite::Error> for ClientError {
    fn from(err: tokio_tungstenite::tungstenite::Error) -> Self {
        ClientError::Transport(Cow::Owned(err.to_string()))
    }
}

impl From<pairlink_relay::RelayError> for ClientError {
    fn from(err: pairlink_relay::RelayError) -> Self {
        ClientError::Serialization(Cow::Owned(err.to_string()))
    }
}

/// Result type for client operations
pub type Result<T> = std::result::Result<T, ClientError>;
