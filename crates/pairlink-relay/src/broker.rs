//! Matching broker
//!
//! The broker owns the [`Registry`] and the [`SessionTable`] and is their only
//! writer. The server runs it inside a single task and feeds it commands, so
//! every check-and-claim below executes without interleaving: two guests
//! racing for the same host are simply processed one after the other, and the
//! second one finds the session already `Active`.
//!
//! ## Message handling
//!
//! | Message          | Effect                                              |
//! |------------------|-----------------------------------------------------|
//! | `REGISTER`       | key -> host, session opened (`Waiting`)             |
//! | `HOST_REGISTER`  | peer id -> host, session opened (`Waiting`)         |
//! | `GUEST_REGISTER` | peer id -> guest (`Searching`)                      |
//! | `JOIN`           | claim by key; `GUEST_JOINED` + `MATCHED` or `ERROR` |
//! | `CLAIM_HOST`     | claim by id; `GUEST_JOINED` + `MATCHED` or `CLAIM_FAILED` |
//! | `SIGNAL`         | relayed within the session, `from` stamped          |
//! | `MULTIPLEX`      | relayed within the session, `from` stamped          |
//! | `HEARTBEAT`      | liveness refresh, no reply                          |

use crate::config::RelayServerConfig;
use crate::error::{RelayError, Result};
use crate::liveness::{LivenessMonitor, SweepReport};
use crate::protocol::{
    ALREADY_MATCHED, ClientMessage, Envelope, GUEST_CANNOT_HOST, GUEST_ID_IN_USE, HOST_CANNOT_JOIN,
    HOST_NOT_FOUND, INVALID_KEY, KEY_ALREADY_REGISTERED, PEER_ID_IN_USE, RATE_LIMITED,
    SESSION_ACTIVE, ServerMessage,
};
use crate::registry::{Connection, ConnectionId, Outbound, OutboundTx, Registry, Role};
use crate::router;
use crate::session::{GuestState, SessionStatus, SessionTable};
use serde_json::Value;
use std::collections::HashMap;
use std::time::{Duration, Instant};

/// Fixed-window message counter per connection
#[derive(Debug)]
struct RateLimiter {
    /// Messages per connection per window
    limit: usize,
    /// Window start and count for each connection
    counts: HashMap<ConnectionId, (Instant, usize)>,
    /// Window duration
    window: Duration,
}

impl RateLimiter {
    fn new(limit: usize, window: Duration) -> Self {
        Self {
            limit,
            counts: HashMap::new(),
            window,
        }
    }

    /// Check if another message is allowed
    fn check(&mut self, id: ConnectionId) -> bool {
        let now = Instant::now();
        let entry = self.counts.entry(id).or_insert((now, 0));

        if now.duration_since(entry.0) >= self.window {
            entry.0 = now;
            entry.1 = 0;
        }

        if entry.1 >= self.limit {
            return false;
        }

        entry.1 += 1;
        true
    }

    fn remove(&mut self, id: ConnectionId) {
        self.counts.remove(&id);
    }

    /// Drop windows that expired long ago
    fn cleanup(&mut self) {
        let now = Instant::now();
        let window = self.window;
        self.counts
            .retain(|_, (start, _)| now.duration_since(*start) < window * 2);
    }
}

/// Point-in-time broker counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RelayStats {
    /// Live connections
    pub connections: usize,
    /// Registered host keys
    pub hosts: usize,
    /// Indexed peer ids
    pub peers: usize,
    /// Sessions waiting for a guest
    pub waiting: usize,
    /// Sessions with a guest
    pub active: usize,
    /// Finished sessions kept for their host
    pub closed: usize,
}

/// Single-writer owner of all matching state
#[derive(Debug)]
pub struct Broker {
    registry: Registry,
    sessions: SessionTable,
    limiter: RateLimiter,
    liveness: LivenessMonitor,
    config: RelayServerConfig,
}

impl Broker {
    /// Create a broker with the given configuration
    #[must_use]
    pub fn new(config: RelayServerConfig) -> Self {
        Self {
            registry: Registry::new(),
            sessions: SessionTable::new(),
            limiter: RateLimiter::new(config.rate_limit, config.rate_window),
            liveness: LivenessMonitor::new(),
            config,
        }
    }

    /// Registry (read-only)
    #[must_use]
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Session table (read-only)
    #[must_use]
    pub fn sessions(&self) -> &SessionTable {
        &self.sessions
    }

    /// Admit a new connection
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::ServerFull`] when the connection limit is reached;
    /// the connection is told to close.
    pub fn connect(&mut self, id: ConnectionId, outbound: OutboundTx) -> Result<()> {
        if self.registry.len() >= self.config.max_connections {
            tracing::warn!("Rejecting connection {}: relay at capacity", id);
            let _ = outbound.send(Outbound::Close);
            return Err(RelayError::ServerFull);
        }

        self.registry.insert_connection(Connection::new(id, outbound));
        tracing::debug!("Connection {} admitted ({} total)", id, self.registry.len());
        Ok(())
    }

    /// Process one decoded client message
    pub fn handle(&mut self, id: ConnectionId, message: ClientMessage) {
        if self.registry.connection(id).is_none() {
            tracing::debug!(
                "Ignoring {} from unknown connection {}",
                message.message_type(),
                id
            );
            return;
        }

        let is_heartbeat = matches!(message, ClientMessage::Heartbeat { .. });
        if !is_heartbeat && !self.limiter.check(id) {
            tracing::warn!("Rate limited {} from {}", message.message_type(), id);
            self.reply(id, ServerMessage::error(RATE_LIMITED));
            return;
        }

        tracing::trace!("{} from {}", message.message_type(), id);

        match message {
            ClientMessage::Register { key } => self.handle_register(id, &key),
            ClientMessage::Join { key } => self.handle_join(id, &key),
            ClientMessage::Signal { target_id, payload } => {
                self.handle_signal(id, target_id.as_deref(), payload);
            }
            ClientMessage::HostRegister { id: peer_id } => self.handle_host_register(id, &peer_id),
            ClientMessage::GuestRegister { id: peer_id } => {
                self.handle_guest_register(id, &peer_id);
            }
            ClientMessage::ClaimHost { host_id, guest_id } => {
                self.handle_claim_host(id, &host_id, &guest_id);
            }
            ClientMessage::Heartbeat { .. } => self.registry.mark_alive(id),
            ClientMessage::Multiplex(envelope) => self.handle_multiplex(id, envelope),
        }
    }

    /// Record a pong control frame
    pub fn pong(&mut self, id: ConnectionId) {
        self.registry.mark_alive(id);
    }

    /// Clean up after a closed connection
    ///
    /// A departing host closes its session and its guest receives
    /// `CONNECTION_LOST`. A departing guest releases its session according to
    /// the configured policy and its host receives `GUEST_LEFT`.
    pub fn disconnect(&mut self, id: ConnectionId) {
        let Some(conn) = self.registry.remove_connection(id) else {
            return;
        };
        self.limiter.remove(id);

        match conn.role {
            Role::Host => {
                if let Some(session) = self.sessions.remove(id) {
                    if let Some(guest) = session.guest {
                        self.registry.send_to(guest, ServerMessage::ConnectionLost);
                        if let Some(guest_conn) = self.registry.connection_mut(guest) {
                            guest_conn.session = None;
                            guest_conn.guest_state = Some(GuestState::Released);
                        }
                        tracing::info!("Host {} left; guest {} released", id, guest);
                    }
                }
            }
            Role::Guest => {
                if let Some(host) = conn.session {
                    let policy = self.config.guest_leave_policy;
                    let released = self
                        .sessions
                        .get_mut(host)
                        .filter(|session| session.guest == Some(id))
                        .and_then(|session| session.release_guest(policy));
                    if released.is_some() {
                        self.registry.send_to(
                            host,
                            ServerMessage::GuestLeft {
                                guest_id: conn.public_id(),
                            },
                        );
                        tracing::info!("Guest {} left host {} ({:?})", id, host, policy);
                    }
                }
            }
            Role::Unassigned => {}
        }

        tracing::debug!(
            "Connection {} closed after {:?}",
            id,
            conn.connected_at.elapsed()
        );
    }

    /// Run a liveness sweep and terminate connections that missed it
    pub fn sweep(&mut self) -> SweepReport {
        let report = self.liveness.sweep(&mut self.registry);

        for &id in &report.dead {
            if let Some(conn) = self.registry.connection(id) {
                conn.close();
            }
            tracing::info!("Terminating unresponsive connection {}", id);
            self.disconnect(id);
        }
        self.limiter.cleanup();

        report
    }

    /// Current counters
    #[must_use]
    pub fn stats(&self) -> RelayStats {
        RelayStats {
            connections: self.registry.len(),
            hosts: self.registry.host_count(),
            peers: self.registry.peer_count(),
            waiting: self.sessions.count(SessionStatus::Waiting),
            active: self.sessions.count(SessionStatus::Active),
            closed: self.sessions.count(SessionStatus::Closed),
        }
    }

    /// Close every connection and drop all state
    pub fn shutdown(&mut self) {
        let ids: Vec<ConnectionId> = self.registry.connections().map(|c| c.id).collect();
        for id in ids {
            if let Some(conn) = self.registry.connection(id) {
                conn.close();
            }
            self.disconnect(id);
        }
        tracing::info!(
            "Broker shut down after {} liveness sweeps ({} reaped)",
            self.liveness.sweeps(),
            self.liveness.reaped()
        );
    }

    // ============ Registration ============

    fn handle_register(&mut self, id: ConnectionId, key: &str) {
        if let Err(reason) = self.check_host_eligible(id, key) {
            self.reply(id, ServerMessage::error(reason));
            return;
        }

        match self.registry.register_host(key, id) {
            Ok(()) => {
                self.become_host(id);
                tracing::info!("Host {} registered key {}", id, key);
                self.reply(
                    id,
                    ServerMessage::Registered {
                        key: key.to_string(),
                    },
                );
            }
            Err(e) => {
                tracing::debug!("REGISTER from {} refused: {}", id, e);
                self.reply(id, ServerMessage::error(KEY_ALREADY_REGISTERED));
            }
        }
    }

    fn handle_host_register(&mut self, id: ConnectionId, peer_id: &str) {
        if let Err(reason) = self.check_host_eligible(id, peer_id) {
            self.reply(id, ServerMessage::error(reason));
            return;
        }

        match self.registry.register_peer(peer_id, id) {
            Ok(()) => {
                self.become_host(id);
                tracing::info!("Host {} registered id {}", id, peer_id);
                self.reply(
                    id,
                    ServerMessage::Registered {
                        key: peer_id.to_string(),
                    },
                );
            }
            Err(e) => {
                tracing::debug!("HOST_REGISTER from {} refused: {}", id, e);
                self.reply(id, ServerMessage::error(PEER_ID_IN_USE));
            }
        }
    }

    fn handle_guest_register(&mut self, id: ConnectionId, peer_id: &str) {
        if peer_id.trim().is_empty() {
            self.reply(id, ServerMessage::error(INVALID_KEY));
            return;
        }
        if self.role(id) == Some(Role::Host) {
            self.reply(id, ServerMessage::error(HOST_CANNOT_JOIN));
            return;
        }

        match self.registry.register_peer(peer_id, id) {
            Ok(()) => {
                self.become_guest(id);
                tracing::info!("Guest {} registered id {}", id, peer_id);
                self.reply(
                    id,
                    ServerMessage::Registered {
                        key: peer_id.to_string(),
                    },
                );
            }
            Err(e) => {
                tracing::debug!("GUEST_REGISTER from {} refused: {}", id, e);
                self.reply(id, ServerMessage::error(PEER_ID_IN_USE));
            }
        }
    }

    fn check_host_eligible(
        &self,
        id: ConnectionId,
        key: &str,
    ) -> std::result::Result<(), &'static str> {
        if key.trim().is_empty() {
            return Err(INVALID_KEY);
        }
        if self.role(id) == Some(Role::Guest) {
            return Err(GUEST_CANNOT_HOST);
        }
        if self
            .sessions
            .get(id)
            .is_some_and(|session| session.guest.is_some())
        {
            return Err(SESSION_ACTIVE);
        }
        Ok(())
    }

    fn become_host(&mut self, id: ConnectionId) {
        if let Some(conn) = self.registry.connection_mut(id) {
            conn.role = Role::Host;
            conn.session = Some(id);
        }
        self.sessions.open(id);
    }

    fn become_guest(&mut self, id: ConnectionId) {
        if let Some(conn) = self.registry.connection_mut(id) {
            conn.role = Role::Guest;
            if conn.session.is_none() {
                conn.guest_state = Some(GuestState::Searching);
            }
        }
    }

    // ============ Matching ============

    fn handle_join(&mut self, id: ConnectionId, key: &str) {
        if let Err(reason) = self.check_guest_eligible(id, key) {
            self.reply(id, ServerMessage::error(reason));
            return;
        }

        let result = match self.registry.lookup_host(key) {
            Ok(host) => self.claim(id, host, None),
            Err(_) => Err(HOST_NOT_FOUND),
        };

        if let Err(reason) = result {
            tracing::debug!("JOIN {} from {} failed: {}", key, id, reason);
            self.reply(id, ServerMessage::error(reason));
        }
    }

    fn handle_claim_host(&mut self, id: ConnectionId, host_id: &str, guest_id: &str) {
        if let Err(reason) = self.try_claim_host(id, host_id, guest_id) {
            tracing::debug!("CLAIM_HOST {} from {} failed: {}", host_id, id, reason);
            self.reply(
                id,
                ServerMessage::ClaimFailed {
                    reason: reason.to_string(),
                },
            );
        }
    }

    fn try_claim_host(
        &mut self,
        id: ConnectionId,
        host_id: &str,
        guest_id: &str,
    ) -> std::result::Result<(), &'static str> {
        self.check_guest_eligible(id, host_id)?;
        if guest_id.trim().is_empty() {
            return Err(INVALID_KEY);
        }
        if self
            .registry
            .lookup_peer(guest_id)
            .is_ok_and(|owner| owner != id)
        {
            return Err(GUEST_ID_IN_USE);
        }

        let host = self.resolve_host(host_id).ok_or(HOST_NOT_FOUND)?;
        self.claim(id, host, Some(guest_id))
    }

    /// Host ids and keys share one namespace from the guest's side
    fn resolve_host(&self, host_id: &str) -> Option<ConnectionId> {
        let is_host = |id: &ConnectionId| self.role(*id) == Some(Role::Host);
        self.registry
            .lookup_peer(host_id)
            .ok()
            .filter(is_host)
            .or_else(|| self.registry.lookup_host(host_id).ok().filter(is_host))
    }

    fn check_guest_eligible(
        &self,
        id: ConnectionId,
        key: &str,
    ) -> std::result::Result<(), &'static str> {
        if key.trim().is_empty() {
            return Err(INVALID_KEY);
        }
        let Some(conn) = self.registry.connection(id) else {
            return Err(HOST_NOT_FOUND);
        };
        if conn.role == Role::Host {
            return Err(HOST_CANNOT_JOIN);
        }
        if conn.session.is_some()
            && matches!(
                conn.guest_state,
                Some(GuestState::Claimed | GuestState::Active)
            )
        {
            return Err(ALREADY_MATCHED);
        }
        Ok(())
    }

    /// Attach `guest` to `host`'s session and notify both sides
    ///
    /// The session's own state check is the single arbiter: a host that is
    /// already matched (or closed) looks exactly like a missing one. The
    /// guest's role and `peer_id` are only recorded once the claim succeeds.
    fn claim(
        &mut self,
        guest: ConnectionId,
        host: ConnectionId,
        peer_id: Option<&str>,
    ) -> std::result::Result<(), &'static str> {
        let session = self.sessions.get_mut(host).ok_or(HOST_NOT_FOUND)?;
        if let Err(e) = session.claim(guest) {
            tracing::debug!("Claim of {} by {} refused: {:?}", host, guest, e);
            return Err(HOST_NOT_FOUND);
        }

        if let Some(peer_id) = peer_id {
            if let Err(e) = self.registry.register_peer(peer_id, guest) {
                tracing::warn!("Guest id {} not recorded for {}: {}", peer_id, guest, e);
            }
        }

        if let Some(conn) = self.registry.connection_mut(guest) {
            conn.role = Role::Guest;
            conn.session = Some(host);
            conn.guest_state = Some(GuestState::Claimed);
        }

        let host_id = self.registry.public_id(host).unwrap_or_default();
        let guest_id = self.registry.public_id(guest).unwrap_or_default();
        tracing::info!("Matched guest {} with host {}", guest, host);

        self.registry
            .send_to(host, ServerMessage::GuestJoined { guest_id });
        self.registry.send_to(guest, ServerMessage::Matched { host_id });
        Ok(())
    }

    // ============ Relay ============

    fn handle_signal(&mut self, id: ConnectionId, target_id: Option<&str>, payload: Value) {
        let Some(from) = self.registry.public_id(id) else {
            return;
        };
        let require_target = self.role(id) == Some(Role::Host);
        let message = ServerMessage::Signal { from, payload };

        if let Err(reason) = router::relay(
            &mut self.registry,
            &self.sessions,
            id,
            target_id,
            require_target,
            &message,
        ) {
            tracing::debug!("Dropped SIGNAL from {}: {:?}", id, reason);
        }
    }

    fn handle_multiplex(&mut self, id: ConnectionId, mut envelope: Envelope) {
        envelope.from = self.registry.public_id(id);
        let target_id = envelope.target_id.clone();
        let channel = envelope.channel.clone();
        let message = ServerMessage::Multiplex(envelope);

        match router::relay(
            &mut self.registry,
            &self.sessions,
            id,
            target_id.as_deref(),
            false,
            &message,
        ) {
            Ok(delivered) => {
                tracing::trace!("MULTIPLEX {} from {} -> {} peers", channel, id, delivered);
            }
            Err(reason) => {
                tracing::debug!("Dropped MULTIPLEX {} from {}: {:?}", channel, id, reason);
            }
        }
    }

    // ============ Helpers ============

    fn role(&self, id: ConnectionId) -> Option<Role> {
        self.registry.connection(id).map(|conn| conn.role)
    }

    fn reply(&self, id: ConnectionId, message: ServerMessage) {
        if !self.registry.send_to(id, message) {
            tracing::debug!("Reply to {} dropped: writer gone", id);
        }
    }
}
