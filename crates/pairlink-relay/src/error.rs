//! Error types for the relay
//!
//! Errors are split between failures the broker reports back to a client
//! (registration conflicts, unknown hosts) and failures of the surrounding
//! transport (socket I/O, closed channels). The former never tear a connection
//! down; the latter are treated as liveness events.

use std::borrow::Cow;
use thiserror::Error;

/// Errors that can occur in relay operations
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RelayError {
    // ============ Registry Errors ============
    /// Key or peer id already held by a live connection
    #[error("Already registered: {0}")]
    AlreadyRegistered(String),

    /// No live host under the given key
    #[error("Host not found: {0}")]
    HostNotFound(String),

    /// No live connection under the given peer id
    #[error("Peer not found: {0}")]
    PeerNotFound(String),

    /// Connection id not present in the registry
    #[error("Unknown connection: {0}")]
    UnknownConnection(String),

    // ============ Protocol Errors ============
    /// Frame could not be decoded into a known message
    #[error("Invalid message: {0}")]
    InvalidMessage(Cow<'static, str>),

    /// Message could not be encoded
    #[error("Serialization error: {0}")]
    Serialization(Cow<'static, str>),

    // ============ Operational Errors ============
    /// Relay has reached its connection limit
    #[error("Relay at capacity")]
    ServerFull,

    /// Connection exceeded its message budget
    #[error("Rate limit exceeded")]
    RateLimited,

    /// Network I/O error
    #[error("I/O error: {0}")]
    Io(String),

    /// Broker channel closed or reply dropped
    #[error("Channel error: {0}")]
    Channel(Cow<'static, str>),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfig(Cow<'static, str>),
}

impl RelayError {
    /// Returns true if the error comes from the transport rather than the protocol
    ///
    /// Transport errors are liveness events: the affected connection is cleaned
    /// up and nothing is reported back to the peer.
    #[must_use]
    pub fn is_transport(&self) -> bool {
        matches!(self, RelayError::Io(_) | RelayError::Channel(_))
    }

    /// Create a channel error with static context (zero allocation)
    #[must_use]
    pub const fn channel(context: &'static str) -> Self {
        RelayError::Channel(Cow::Borrowed(context))
    }

    /// Create an invalid configuration error with static context (zero allocation)
    #[must_use]
    pub const fn invalid_config(context: &'static str) -> Self {
        RelayError::InvalidConfig(Cow::Borrowed(context))
    }
}

impl From<std::io::Error> for RelayError {
    fn from(err: std::io::Error) -> Self {
        RelayError::Io(err.to_string())
    }
}

impl From<serde_json::Error> for RelayError {
    fn from(err: serde_json::Error) -> Self {
        RelayError::InvalidMessage(Cow::Owned(err.to_string()))
    }
}

/// Result type for relay operations
pub type Result<T> = std::result::Result<T, RelayError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = RelayError::HostNotFound("A7K9".to_string());
        assert_eq!(err.to_string(), "Host not found: A7K9");

        assert_eq!(RelayError::ServerFull.to_string(), "Relay at capacity");
        assert_eq!(RelayError::RateLimited.to_string(), "Rate limit exceeded");
    }

    #[test]
    fn test_transport_classification() {
        assert!(RelayError::Io("reset".to_string()).is_transport());
        assert!(RelayError::channel("broker gone").is_transport());
        assert!(!RelayError::AlreadyRegistered("k".to_string()).is_transport());
        assert!(!RelayError::RateLimited.is_transport());
    }

    #[test]
    fn test_from_json_error() {
        let err = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
        let relay_err: RelayError = err.into();
        assert!(matches!(relay_err, RelayError::InvalidMessage(_)));
    }
}
