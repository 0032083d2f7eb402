//! Connection registry
//!
//! Holds every live connection plus two indexes into it:
//!
//! - `hosts`: shareable key -> host connection
//! - `peers`: opaque peer id -> connection
//!
//! All lookups are single hash probes. The registry is a plain owned value;
//! the broker is its only writer, so it carries no locks of its own.
//!
//! Staleness is decided by the liveness sweep, not here: a connection the
//! sweep has marked [`Liveness::Dead`], or whose writer has already gone away,
//! no longer holds its key or peer ids against newcomers.

use crate::error::{RelayError, Result};
use crate::protocol::ServerMessage;
use crate::session::GuestState;
use std::collections::HashMap;
use std::fmt;
use std::time::Instant;
use tokio::sync::mpsc;

/// Opaque connection identifier (16 random bytes, hex on the wire)
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId([u8; 16]);

impl ConnectionId {
    /// Generate a random connection ID
    #[must_use]
    pub fn random() -> Self {
        use rand::RngCore;
        let mut bytes = [0u8; 16];
        rand::thread_rng().fill_bytes(&mut bytes);
        Self(bytes)
    }

    /// Create from raw bytes
    #[must_use]
    pub const fn from_bytes(bytes: [u8; 16]) -> Self {
        Self(bytes)
    }

    /// Hex encoding used as the connection's default public id
    #[must_use]
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(&self.0[..6]))
    }
}

impl fmt::Debug for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ConnectionId({})", hex::encode(&self.0[..6]))
    }
}

/// Role a connection has taken
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    /// Connected, nothing registered yet
    Unassigned,
    /// Registered a key or host id
    Host,
    /// Registered a guest id or joined a host
    Guest,
}

/// Liveness state maintained by the sweep
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Liveness {
    /// Pong (or heartbeat) seen since the last sweep
    Alive,
    /// Pinged by the last sweep, no pong yet
    AwaitingPong,
    /// Missed a full sweep interval; scheduled for termination
    Dead,
}

/// Frame queued for a connection's writer task
#[derive(Debug, Clone, PartialEq)]
pub enum Outbound {
    /// JSON text frame
    Message(ServerMessage),
    /// WebSocket ping control frame
    Ping,
    /// Close the socket
    Close,
}

/// Sender half feeding a connection's writer task
pub type OutboundTx = mpsc::UnboundedSender<Outbound>;

/// A live transport-level connection
#[derive(Debug)]
pub struct Connection {
    /// Connection identifier
    pub id: ConnectionId,
    /// Current role
    pub role: Role,
    /// Key registered by this connection (hosts)
    pub key: Option<String>,
    /// Peer ids declared by this connection, oldest first
    pub peer_ids: Vec<String>,
    /// Host connection whose session this connection belongs to
    pub session: Option<ConnectionId>,
    /// Matching state (guests)
    pub guest_state: Option<GuestState>,
    /// Liveness state
    pub liveness: Liveness,
    /// Last pong or heartbeat
    pub last_pong: Instant,
    /// Time of accept
    pub connected_at: Instant,
    outbound: OutboundTx,
}

impl Connection {
    /// Create a new unassigned connection
    #[must_use]
    pub fn new(id: ConnectionId, outbound: OutboundTx) -> Self {
        let now = Instant::now();
        Self {
            id,
            role: Role::Unassigned,
            key: None,
            peer_ids: Vec::new(),
            session: None,
            guest_state: None,
            liveness: Liveness::Alive,
            last_pong: now,
            connected_at: now,
            outbound,
        }
    }

    /// Queue a message for delivery
    ///
    /// Returns false if the writer is gone; the caller treats that as a
    /// liveness event, never as an error.
    pub fn send(&self, message: ServerMessage) -> bool {
        self.outbound.send(Outbound::Message(message)).is_ok()
    }

    /// Queue a ping control frame
    pub fn ping(&self) -> bool {
        self.outbound.send(Outbound::Ping).is_ok()
    }

    /// Ask the writer to close the socket
    pub fn close(&self) {
        let _ = self.outbound.send(Outbound::Close);
    }

    /// Id other peers see for this connection
    ///
    /// The first declared peer id, or the hex connection id when none was
    /// declared.
    #[must_use]
    pub fn public_id(&self) -> String {
        self.peer_ids
            .first()
            .cloned()
            .unwrap_or_else(|| self.id.to_hex())
    }

    /// Check if the connection can be displaced from its key or peer ids
    #[must_use]
    pub fn is_stale(&self) -> bool {
        self.liveness == Liveness::Dead || self.outbound.is_closed()
    }

    /// Record a pong or heartbeat
    pub fn touch(&mut self) {
        self.liveness = Liveness::Alive;
        self.last_pong = Instant::now();
    }
}

/// Registry of live connections
#[derive(Debug, Default)]
pub struct Registry {
    /// All connections (id -> connection)
    connections: HashMap<ConnectionId, Connection>,
    /// Host registrations (key -> connection id)
    hosts: HashMap<String, ConnectionId>,
    /// Peer index (peer id -> connection id)
    peers: HashMap<String, ConnectionId>,
}

impl Registry {
    /// Create an empty registry
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a freshly accepted connection
    ///
    /// The connection's hex id is indexed as a peer id so it can be addressed
    /// before it declares one of its own.
    pub fn insert_connection(&mut self, connection: Connection) {
        let id = connection.id;
        self.peers.insert(id.to_hex(), id);
        self.connections.insert(id, connection);
    }

    /// Remove a connection together with its key and peer ids
    pub fn remove_connection(&mut self, id: ConnectionId) -> Option<Connection> {
        let connection = self.connections.remove(&id)?;

        if let Some(key) = &connection.key {
            if self.hosts.get(key) == Some(&id) {
                self.hosts.remove(key);
            }
        }

        let hex_id = id.to_hex();
        for peer_id in connection.peer_ids.iter().chain(std::iter::once(&hex_id)) {
            if self.peers.get(peer_id) == Some(&id) {
                self.peers.remove(peer_id);
            }
        }

        Some(connection)
    }

    /// Register `id` as the host for `key`
    ///
    /// A host holds a single key; registering a new one releases the old.
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::AlreadyRegistered`] if another live connection
    /// holds the key, or [`RelayError::UnknownConnection`] if `id` is not in
    /// the registry.
    pub fn register_host(&mut self, key: &str, id: ConnectionId) -> Result<()> {
        if !self.connections.contains_key(&id) {
            return Err(RelayError::UnknownConnection(id.to_hex()));
        }

        if let Some(&existing) = self.hosts.get(key) {
            if existing != id {
                if self.is_live(existing) {
                    return Err(RelayError::AlreadyRegistered(key.to_string()));
                }
                tracing::debug!("Replacing stale host {} for key {}", existing, key);
                if let Some(stale) = self.connections.get_mut(&existing) {
                    stale.key = None;
                }
            }
        }

        let previous = self
            .connections
            .get_mut(&id)
            .and_then(|conn| conn.key.replace(key.to_string()));

        if let Some(previous) = previous {
            if previous != key && self.hosts.get(&previous) == Some(&id) {
                self.hosts.remove(&previous);
            }
        }

        self.hosts.insert(key.to_string(), id);
        Ok(())
    }

    /// Look up the live host registered under `key`
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::HostNotFound`] if the key is unknown or its
    /// connection is stale.
    pub fn lookup_host(&self, key: &str) -> Result<ConnectionId> {
        match self.hosts.get(key) {
            Some(&id) if self.is_live(id) => Ok(id),
            _ => Err(RelayError::HostNotFound(key.to_string())),
        }
    }

    /// Remove a host registration, returning the connection that held it
    pub fn remove_host(&mut self, key: &str) -> Option<ConnectionId> {
        let id = self.hosts.remove(key)?;
        if let Some(conn) = self.connections.get_mut(&id) {
            if conn.key.as_deref() == Some(key) {
                conn.key = None;
            }
        }
        Some(id)
    }

    /// Index `peer_id` as an alias of connection `id`
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::AlreadyRegistered`] if another live connection
    /// holds the peer id, or [`RelayError::UnknownConnection`] if `id` is not
    /// in the registry.
    pub fn register_peer(&mut self, peer_id: &str, id: ConnectionId) -> Result<()> {
        if !self.connections.contains_key(&id) {
            return Err(RelayError::UnknownConnection(id.to_hex()));
        }

        if let Some(&existing) = self.peers.get(peer_id) {
            if existing == id {
                return Ok(());
            }
            if self.is_live(existing) {
                return Err(RelayError::AlreadyRegistered(peer_id.to_string()));
            }
            if let Some(stale) = self.connections.get_mut(&existing) {
                stale.peer_ids.retain(|p| p != peer_id);
            }
        }

        self.peers.insert(peer_id.to_string(), id);
        if let Some(conn) = self.connections.get_mut(&id) {
            conn.peer_ids.push(peer_id.to_string());
        }
        Ok(())
    }

    /// Look up the live connection behind a peer id
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::PeerNotFound`] if the id is unknown or its
    /// connection is stale.
    pub fn lookup_peer(&self, peer_id: &str) -> Result<ConnectionId> {
        match self.peers.get(peer_id) {
            Some(&id) if self.is_live(id) => Ok(id),
            _ => Err(RelayError::PeerNotFound(peer_id.to_string())),
        }
    }

    /// Remove a peer id, returning the connection that held it
    pub fn remove_peer(&mut self, peer_id: &str) -> Option<ConnectionId> {
        let id = self.peers.remove(peer_id)?;
        if let Some(conn) = self.connections.get_mut(&id) {
            conn.peer_ids.retain(|p| p != peer_id);
        }
        Some(id)
    }

    /// Check if a connection exists and is not stale
    #[must_use]
    pub fn is_live(&self, id: ConnectionId) -> bool {
        self.connections.get(&id).is_some_and(|c| !c.is_stale())
    }

    /// Record a pong or heartbeat for a connection
    pub fn mark_alive(&mut self, id: ConnectionId) {
        if let Some(conn) = self.connections.get_mut(&id) {
            conn.touch();
        }
    }

    /// Mark a connection dead so its registrations can be displaced
    pub fn mark_dead(&mut self, id: ConnectionId) {
        if let Some(conn) = self.connections.get_mut(&id) {
            conn.liveness = Liveness::Dead;
        }
    }

    /// Get a connection
    #[must_use]
    pub fn connection(&self, id: ConnectionId) -> Option<&Connection> {
        self.connections.get(&id)
    }

    /// Get a mutable connection
    pub fn connection_mut(&mut self, id: ConnectionId) -> Option<&mut Connection> {
        self.connections.get_mut(&id)
    }

    /// Iterate over all connections
    pub fn connections(&self) -> impl Iterator<Item = &Connection> {
        self.connections.values()
    }

    /// Iterate mutably over all connections
    pub fn connections_mut(&mut self) -> impl Iterator<Item = &mut Connection> {
        self.connections.values_mut()
    }

    /// Queue a message for a connection; false if absent or writer gone
    pub fn send_to(&self, id: ConnectionId, message: ServerMessage) -> bool {
        self.connections
            .get(&id)
            .is_some_and(|conn| conn.send(message))
    }

    /// Public id of a connection
    #[must_use]
    pub fn public_id(&self, id: ConnectionId) -> Option<String> {
        self.connections.get(&id).map(Connection::public_id)
    }

    /// Number of connections
    #[must_use]
    pub fn len(&self) -> usize {
        self.connections.len()
    }

    /// Check if the registry holds no connections
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }

    /// Number of registered host keys
    #[must_use]
    pub fn host_count(&self) -> usize {
        self.hosts.len()
    }

    /// Number of indexed peer ids (including connection ids)
    #[must_use]
    pub fn peer_count(&self) -> usize {
        self.peers.len()
    }
}
