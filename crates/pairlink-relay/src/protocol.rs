//! Relay protocol message definitions.
//!
//! Every frame on the wire is a UTF-8 JSON object carrying a `type` tag in
//! SCREAMING_SNAKE_CASE and camelCase fields:
//!
//! ```text
//! {"type":"JOIN","key":"A7K9"}
//! {"type":"GUEST_JOINED","guestId":"5f0c…"}
//! {"type":"MULTIPLEX","channel":"cmd","targetId":null,"payload":{…},"timestamp":1700000000000}
//! ```
//!
//! Payloads are carried as opaque [`serde_json::Value`]s; the relay never
//! looks inside them.

use crate::error::{RelayError, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Reply text for a join or claim that cannot be satisfied
pub const HOST_NOT_FOUND: &str = "Host not found";

/// Reply text for a key already held by a live host
pub const KEY_ALREADY_REGISTERED: &str = "Key already registered";

/// Reply text for a peer id already held by another live connection
pub const PEER_ID_IN_USE: &str = "Peer id already registered";

/// Reply text for a claim naming a guest id owned by another connection
pub const GUEST_ID_IN_USE: &str = "Guest id in use";

/// Reply text for an empty key or id
pub const INVALID_KEY: &str = "Invalid key";

/// Reply text for a guest that is already matched
pub const ALREADY_MATCHED: &str = "Already matched";

/// Reply text for a host attempting to join or claim another host
pub const HOST_CANNOT_JOIN: &str = "Hosts cannot join";

/// Reply text for a guest attempting to register as host
pub const GUEST_CANNOT_HOST: &str = "Guests cannot register as host";

/// Reply text for a host re-registering while a guest is attached
pub const SESSION_ACTIVE: &str = "Session already active";

/// Reply text for a connection over its message budget
pub const RATE_LIMITED: &str = "Rate limit exceeded";

/// Multiplexed application message
///
/// `target_id = None` fans out to every other member of the sender's
/// session; `Some(id)` is point-to-point. `from` is stamped by the relay on
/// delivery and ignored on the way in.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Envelope {
    /// Application-defined stream name (e.g. `cmd`, `sync`, `signal`)
    pub channel: String,
    /// Destination peer id, or `None` for fan-out
    #[serde(default)]
    pub target_id: Option<String>,
    /// Opaque payload
    #[serde(default)]
    pub payload: Value,
    /// Sender timestamp in milliseconds since the Unix epoch
    #[serde(default)]
    pub timestamp: u64,
    /// Public id of the sending peer (set by the relay)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from: Option<String>,
}

impl Envelope {
    /// Create an envelope for a channel
    #[must_use]
    pub fn new(channel: impl Into<String>, payload: Value) -> Self {
        Self {
            channel: channel.into(),
            target_id: None,
            payload,
            timestamp: 0,
            from: None,
        }
    }

    /// Address the envelope to a single peer
    #[must_use]
    pub fn with_target(mut self, target_id: impl Into<String>) -> Self {
        self.target_id = Some(target_id.into());
        self
    }

    /// Set the sender timestamp
    #[must_use]
    pub fn with_timestamp(mut self, timestamp: u64) -> Self {
        self.timestamp = timestamp;
        self
    }
}

/// Messages sent by clients to the relay
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(
    tag = "type",
    rename_all = "SCREAMING_SNAKE_CASE",
    rename_all_fields = "camelCase"
)]
pub enum ClientMessage {
    /// Register the caller as host for a shareable key
    Register {
        /// Human-shareable key chosen by the host
        key: String,
    },

    /// Ask to be matched with the host registered under a key
    Join {
        /// Key of the host to join
        key: String,
    },

    /// Handshake material for the matched peer
    Signal {
        /// Destination peer id (required from hosts)
        #[serde(default, skip_serializing_if = "Option::is_none")]
        target_id: Option<String>,
        /// Opaque offer/answer/candidate payload
        #[serde(default)]
        payload: Value,
    },

    /// Register the caller's peer id as a host participant
    HostRegister {
        /// Opaque peer id
        id: String,
    },

    /// Register the caller's peer id as a guest participant
    GuestRegister {
        /// Opaque peer id
        id: String,
    },

    /// Claim a host by id rather than by key
    ClaimHost {
        /// Host peer id (or key)
        host_id: String,
        /// Guest peer id of the caller
        guest_id: String,
    },

    /// Application-level liveness ping
    Heartbeat {
        /// Caller's id (informational)
        #[serde(default, skip_serializing_if = "Option::is_none")]
        id: Option<String>,
    },

    /// Tunneled application message
    Multiplex(Envelope),
}

impl ClientMessage {
    /// Decode a client frame
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::InvalidMessage`] for malformed JSON or an unknown
    /// `type` tag.
    pub fn from_json(text: &str) -> Result<Self> {
        Ok(serde_json::from_str(text)?)
    }

    /// Encode as a JSON text frame
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::Serialization`] if encoding fails.
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string(self).map_err(|e| RelayError::Serialization(e.to_string().into()))
    }

    /// Get the wire type name
    #[must_use]
    pub fn message_type(&self) -> &'static str {
        match self {
            ClientMessage::Register { .. } => "REGISTER",
            ClientMessage::Join { .. } => "JOIN",
            ClientMessage::Signal { .. } => "SIGNAL",
            ClientMessage::HostRegister { .. } => "HOST_REGISTER",
            ClientMessage::GuestRegister { .. } => "GUEST_REGISTER",
            ClientMessage::ClaimHost { .. } => "CLAIM_HOST",
            ClientMessage::Heartbeat { .. } => "HEARTBEAT",
            ClientMessage::Multiplex(_) => "MULTIPLEX",
        }
    }
}

/// Messages sent by the relay to clients
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(
    tag = "type",
    rename_all = "SCREAMING_SNAKE_CASE",
    rename_all_fields = "camelCase"
)]
pub enum ServerMessage {
    /// Registration (by key or peer id) accepted
    Registered {
        /// Key or peer id that was registered
        key: String,
    },

    /// A guest claimed this host
    GuestJoined {
        /// Public id of the guest
        guest_id: String,
    },

    /// The matched guest disconnected
    GuestLeft {
        /// Public id of the guest
        guest_id: String,
    },

    /// Claim accepted; the caller is now matched
    Matched {
        /// Public id of the host
        host_id: String,
    },

    /// Claim by id rejected
    ClaimFailed {
        /// Reason for rejection
        reason: String,
    },

    /// Relayed handshake material
    Signal {
        /// Public id of the sender
        from: String,
        /// Opaque payload
        #[serde(default)]
        payload: Value,
    },

    /// Relayed application message
    Multiplex(Envelope),

    /// Request rejected
    Error {
        /// Human-readable reason
        message: String,
    },

    /// The matched host is gone (or, on the client, the relay is unreachable)
    ConnectionLost,
}

impl ServerMessage {
    /// Decode a relay frame
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::InvalidMessage`] for malformed JSON or an unknown
    /// `type` tag.
    pub fn from_json(text: &str) -> Result<Self> {
        Ok(serde_json::from_str(text)?)
    }

    /// Encode as a JSON text frame
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::Serialization`] if encoding fails.
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string(self).map_err(|e| RelayError::Serialization(e.to_string().into()))
    }

    /// Build an `ERROR` reply
    #[must_use]
    pub fn error(message: impl Into<String>) -> Self {
        ServerMessage::Error {
            message: message.into(),
        }
    }

    /// Get the wire type name
    #[must_use]
    pub fn event_type(&self) -> &'static str {
        match self {
            ServerMessage::Registered { .. } => "REGISTERED",
            ServerMessage::GuestJoined { .. } => "GUEST_JOINED",
            ServerMessage::GuestLeft { .. } => "GUEST_LEFT",
            ServerMessage::Matched { .. } => "MATCHED",
            ServerMessage::ClaimFailed { .. } => "CLAIM_FAILED",
            ServerMessage::Signal { .. } => "SIGNAL",
            ServerMessage::Multiplex(_) => "MULTIPLEX",
            ServerMessage::Error { .. } => "ERROR",
            ServerMessage::ConnectionLost => "CONNECTION_LOST",
        }
    }
}
