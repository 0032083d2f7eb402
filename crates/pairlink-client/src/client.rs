//! Client relay facade.
//!
//! [`RelayClient`] is the handle applications hold. All socket work happens
//! in a background driver task that owns the transport, the outbound queue
//! and the reconnect timer; the facade talks to it over an unbounded channel,
//! so every send method returns immediately.
//!
//! ```text
//!   RelayClient ──Command──> Driver ──text──> Transport ──> shard
//!        │                     │  <──text──
//!        └──── EventTable <────┘ (dispatch)
//! ```
//!
//! ## Lifecycle
//!
//! ```text
//! Idle ──connect()──> Connecting ──> Connected ──close/error──> Reconnecting ─┐
//!                                        ^                                    │
//!                                        └─────────────── reconnected ────────┘
//!                                                  attempts exhausted ──> Lost
//!                      connect() after Lost ──> Connecting
//!                      disconnect() from any state ──> Closed
//! ```

use crate::backoff::ReconnectPolicy;
use crate::config::ClientConfig;
use crate::error::{ClientError, Result};
use crate::events::EventTable;
use crate::queue::OutboundQueue;
use crate::selection::ShardSelector;
use crate::transport::{Connector, Transport, WsConnector};
use pairlink_relay::{ClientMessage, Envelope, ServerMessage};
use rand::SeedableRng;
use rand::rngs::StdRng;
use serde_json::Value;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, interval_at};

/// Connection state of a [`RelayClient`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientState {
    /// Not connected yet
    Idle,
    /// Probing shards
    Connecting,
    /// Connected to a shard
    Connected {
        /// Shard URL
        shard: String,
    },
    /// Waiting to retry after an unexpected close
    Reconnecting {
        /// 1-based attempt number
        attempt: u32,
    },
    /// Reconnect attempts exhausted
    Lost,
    /// Torn down by [`RelayClient::disconnect`]
    Closed,
}

/// Facade to driver commands
#[derive(Debug)]
enum Command {
    Send(ClientMessage),
    Disconnect,
}

/// Client for a PAIRLINK relay
pub struct RelayClient {
    config: ClientConfig,
    client_id: String,
    connector: Arc<dyn Connector>,
    commands: mpsc::UnboundedSender<Command>,
    parked: Option<Parked>,
    events: EventTable,
    state: Arc<watch::Sender<ClientState>>,
    driver: Option<JoinHandle<Option<Parked>>>,
}

/// Command receiver and undelivered messages while no driver runs
struct Parked {
    commands: mpsc::UnboundedReceiver<Command>,
    queue: OutboundQueue,
}

impl RelayClient {
    /// Create a client that connects over WebSocket
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::InvalidConfig`] if the configuration is invalid.
    pub fn new(config: ClientConfig) -> Result<Self> {
        Self::with_connector(config, Arc::new(WsConnector))
    }

    /// Create a client with a custom connector
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::InvalidConfig`] if the configuration is invalid.
    pub fn with_connector(config: ClientConfig, connector: Arc<dyn Connector>) -> Result<Self> {
        config.validate()?;

        let client_id = config
            .client_id
            .clone()
            .unwrap_or_else(|| format!("{:016x}", rand::random::<u64>()));
        let (commands, command_rx) = mpsc::unbounded_channel();
        let (state, _) = watch::channel(ClientState::Idle);
        let parked = Parked {
            commands: command_rx,
            queue: OutboundQueue::new(config.queue_limit),
        };

        Ok(Self {
            config,
            client_id,
            connector,
            commands,
            parked: Some(parked),
            events: EventTable::new(),
            state: Arc::new(state),
            driver: None,
        })
    }

    /// Id sent with heartbeats
    #[must_use]
    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    /// Probe the configured shards and connect to the fastest
    ///
    /// Messages sent before this call are queued and delivered, in order,
    /// once the connection is up. Calling it while connected or reconnecting
    /// is a no-op. After [`ClientState::Lost`] it measures the shards again,
    /// and messages sent in the meantime go out on the new connection.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::NoShardAvailable`] if no shard answered, or
    /// [`ClientError::Closed`] after [`disconnect`](Self::disconnect).
    pub async fn connect(&mut self) -> Result<()> {
        if let Some(driver) = &self.driver {
            if !driver.is_finished() && *self.state.borrow() != ClientState::Lost {
                return Ok(());
            }
        }
        // A lost driver has given up reconnecting and parks its channel
        if let Some(driver) = self.driver.take() {
            match driver.await {
                Ok(parked) => self.parked = parked,
                Err(e) => tracing::warn!("Client driver failed: {}", e),
            }
        }
        let Some(parked) = self.parked.take() else {
            return Err(ClientError::Closed);
        };

        self.state.send_replace(ClientState::Connecting);
        let mut selector = ShardSelector::new(self.config.shards.clone());
        let probed = selector
            .probe(self.connector.clone(), self.config.probe_timeout)
            .await;
        let (shard, transport) = match probed {
            Ok(found) => found,
            Err(e) => {
                self.parked = Some(parked);
                self.state.send_replace(ClientState::Idle);
                return Err(e);
            }
        };

        tracing::info!("Connected to relay shard {}", shard);
        self.state.send_replace(ClientState::Connected { shard });

        let driver = Driver {
            connector: self.connector.clone(),
            selector,
            commands: parked.commands,
            queue: parked.queue,
            events: self.events.clone(),
            state: self.state.clone(),
            policy: self.config.reconnect.clone(),
            probe_timeout: self.config.probe_timeout,
            heartbeat_interval: self.config.heartbeat_interval,
            client_id: self.client_id.clone(),
            rng: StdRng::from_entropy(),
        };
        self.driver = Some(tokio::spawn(driver.run(transport)));
        Ok(())
    }

    /// Register as host under a shareable key
    pub fn register_host(&self, key: &str) {
        self.send(ClientMessage::Register {
            key: key.to_string(),
        });
    }

    /// Register as host under a peer id (claimable with `CLAIM_HOST`)
    pub fn register_host_id(&self, id: &str) {
        self.send(ClientMessage::HostRegister { id: id.to_string() });
    }

    /// Register as guest under a peer id
    pub fn register_guest(&self, id: &str) {
        self.send(ClientMessage::GuestRegister { id: id.to_string() });
    }

    /// Ask to be matched with the host registered under `key`
    pub fn join(&self, key: &str) {
        self.send(ClientMessage::Join {
            key: key.to_string(),
        });
    }

    /// Claim a host by id
    pub fn claim_host(&self, host_id: &str, guest_id: &str) {
        self.send(ClientMessage::ClaimHost {
            host_id: host_id.to_string(),
            guest_id: guest_id.to_string(),
        });
    }

    /// Send handshake material to the matched peer
    ///
    /// Hosts must name the guest in `target_id`.
    pub fn signal(&self, target_id: Option<&str>, payload: Value) {
        self.send(ClientMessage::Signal {
            target_id: target_id.map(str::to_string),
            payload,
        });
    }

    /// Send an application message on `channel`
    ///
    /// `target_id = None` fans out to every other session member.
    pub fn multiplex(&self, channel: &str, payload: Value, target_id: Option<&str>) {
        let mut envelope = Envelope::new(channel, payload).with_timestamp(now_millis());
        envelope.target_id = target_id.map(str::to_string);
        self.send(ClientMessage::Multiplex(envelope));
    }

    /// Send a heartbeat immediately
    pub fn heartbeat(&self) {
        self.send(ClientMessage::Heartbeat {
            id: Some(self.client_id.clone()),
        });
    }

    /// Send any client message
    ///
    /// Never blocks. While disconnected the message is queued; after
    /// [`disconnect`](Self::disconnect) or terminal loss it is dropped.
    pub fn send(&self, message: ClientMessage) {
        if self.commands.send(Command::Send(message)).is_err() {
            tracing::debug!("Client closed, message dropped");
        }
    }

    /// Register a handler for a relay event type (`GUEST_JOINED`, `MATCHED`, ...)
    ///
    /// Terminal connection loss is reported as `CONNECTION_LOST`.
    pub fn on<F>(&self, event_type: &str, handler: F)
    where
        F: Fn(&ServerMessage) + Send + Sync + 'static,
    {
        self.events.on(event_type, Arc::new(handler));
    }

    /// Register a handler for a multiplexed channel
    pub fn on_stream<F>(&self, channel: &str, handler: F)
    where
        F: Fn(&Envelope) + Send + Sync + 'static,
    {
        self.events.on_stream(channel, Arc::new(handler));
    }

    /// Tear the client down
    ///
    /// Cancels any pending reconnect. No event fires afterwards.
    pub async fn disconnect(&mut self) {
        let _ = self.commands.send(Command::Disconnect);
        self.parked = None;
        if let Some(driver) = self.driver.take() {
            if let Err(e) = driver.await {
                tracing::warn!("Client driver failed: {}", e);
            }
        }
        self.state.send_replace(ClientState::Closed);
    }

    /// Current state
    #[must_use]
    pub fn state(&self) -> ClientState {
        self.state.borrow().clone()
    }

    /// Subscribe to state changes
    #[must_use]
    pub fn state_changes(&self) -> watch::Receiver<ClientState> {
        self.state.subscribe()
    }

    /// Shard currently connected to
    #[must_use]
    pub fn shard(&self) -> Option<String> {
        match &*self.state.borrow() {
            ClientState::Connected { shard } => Some(shard.clone()),
            _ => None,
        }
    }
}

impl std::fmt::Debug for RelayClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RelayClient")
            .field("client_id", &self.client_id)
            .field("state", &*self.state.borrow())
            .finish_non_exhaustive()
    }
}

fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |elapsed| u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX))
}

async fn send_message(transport: &mut dyn Transport, message: &ClientMessage) -> Result<()> {
    let text = message.to_json()?;
    transport.send(text).await
}

/// Why the serve loop returned
enum Exit {
    Disconnect,
    Lost,
}

/// Background task owning the connection
struct Driver {
    connector: Arc<dyn Connector>,
    selector: ShardSelector,
    commands: mpsc::UnboundedReceiver<Command>,
    queue: OutboundQueue,
    events: EventTable,
    state: Arc<watch::Sender<ClientState>>,
    policy: ReconnectPolicy,
    probe_timeout: Duration,
    heartbeat_interval: Duration,
    client_id: String,
    rng: StdRng,
}

impl Driver {
    /// Serve until disconnected or lost; a lost driver hands back its channel
    async fn run(mut self, mut transport: Box<dyn Transport>) -> Option<Parked> {
        loop {
            let exit = self.serve(transport.as_mut()).await;
            transport.close().await;

            match exit {
                Exit::Disconnect => {
                    self.state.send_replace(ClientState::Closed);
                    tracing::info!("Relay client closed");
                    return None;
                }
                Exit::Lost => match self.reconnect().await {
                    Ok(next) => transport = next,
                    Err(Exit::Disconnect) => return None,
                    Err(Exit::Lost) => {
                        return Some(Parked {
                            commands: self.commands,
                            queue: self.queue,
                        });
                    }
                },
            }
        }
    }

    /// Flush the queue, then pump commands, frames and heartbeats
    async fn serve(&mut self, transport: &mut dyn Transport) -> Exit {
        let flushed = self.queue.len();
        while let Some(message) = self.queue.pop_front() {
            if let Err(e) = send_message(transport, &message).await {
                tracing::warn!("Flush interrupted: {}", e);
                self.queue.push_front(message);
                return Exit::Lost;
            }
        }
        if flushed > 0 {
            tracing::debug!("Flushed {} queued messages", flushed);
        }

        let period = self.heartbeat_interval;
        let mut heartbeat = interval_at(Instant::now() + period, period);

        loop {
            tokio::select! {
                command = self.commands.recv() => match command {
                    Some(Command::Send(message)) => {
                        if let Err(e) = send_message(transport, &message).await {
                            tracing::warn!("Send failed: {}", e);
                            self.queue.push(message);
                            return Exit::Lost;
                        }
                    }
                    Some(Command::Disconnect) | None => return Exit::Disconnect,
                },
                frame = transport.recv() => match frame {
                    Some(Ok(text)) => {
                        self.events.dispatch_text(&text);
                    }
                    Some(Err(e)) => {
                        tracing::warn!("Connection error: {}", e);
                        return Exit::Lost;
                    }
                    None => {
                        tracing::info!("Relay closed the connection");
                        return Exit::Lost;
                    }
                },
                _ = heartbeat.tick() => {
                    let beat = ClientMessage::Heartbeat {
                        id: Some(self.client_id.clone()),
                    };
                    if send_message(transport, &beat).await.is_err() {
                        return Exit::Lost;
                    }
                }
            }
        }
    }

    /// Retry with backoff across shards
    ///
    /// Fails with [`Exit::Disconnect`] when cancelled and [`Exit::Lost`] when
    /// attempts are exhausted; only the latter emits `CONNECTION_LOST`.
    async fn reconnect(&mut self) -> std::result::Result<Box<dyn Transport>, Exit> {
        let max_attempts = self.policy.max_attempts;

        for attempt in 0..max_attempts {
            let delay = self.policy.delay(attempt, &mut self.rng);
            let Some(shard) = self.selector.rotate().map(str::to_string) else {
                break;
            };
            self.state
                .send_replace(ClientState::Reconnecting { attempt: attempt + 1 });
            tracing::info!(
                "Reconnecting to {} in {:?} (attempt {}/{})",
                shard,
                delay,
                attempt + 1,
                max_attempts
            );

            if !self.wait(delay).await {
                self.state.send_replace(ClientState::Closed);
                tracing::info!("Reconnect cancelled");
                return Err(Exit::Disconnect);
            }

            let started = std::time::Instant::now();
            match tokio::time::timeout(self.probe_timeout, self.connector.connect(&shard)).await {
                Ok(Ok(transport)) => {
                    self.selector.update_latency(&shard, started.elapsed());
                    tracing::info!("Reconnected to {}", shard);
                    self.state.send_replace(ClientState::Connected { shard });
                    return Ok(transport);
                }
                Ok(Err(e)) => {
                    self.selector.mark_unreachable(&shard);
                    tracing::warn!("Reconnect to {} failed: {}", shard, e);
                }
                Err(_) => {
                    self.selector.mark_unreachable(&shard);
                    tracing::warn!("Reconnect to {} timed out", shard);
                }
            }
        }

        tracing::error!("Relay unreachable after {} attempts", max_attempts);
        self.state.send_replace(ClientState::Lost);
        self.events.dispatch(&ServerMessage::ConnectionLost);
        Err(Exit::Lost)
    }

    /// Sleep while still accepting commands; false if cancelled
    async fn wait(&mut self, delay: Duration) -> bool {
        let sleep = tokio::time::sleep(delay);
        tokio::pin!(sleep);

        loop {
            tokio::select! {
                _ = &mut sleep => return true,
                command = self.commands.recv() => match command {
                    Some(Command::Send(message)) => {
                        self.queue.push(message);
                    }
                    Some(Command::Disconnect) | None => return false,
                },
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::{MemoryConnector, MemoryPeer};
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    const WAIT: Duration = Duration::from_secs(3);

    fn config(shards: &[&str]) -> ClientConfig {
        ClientConfig {
            shards: shards.iter().map(|s| s.to_string()).collect(),
            probe_timeout: Duration::from_secs(1),
            heartbeat_interval: Duration::from_secs(60),
            reconnect: ReconnectPolicy {
                base: Duration::from_millis(10),
                cap: Duration::from_millis(40),
                jitter: Duration::ZERO,
                max_attempts: 3,
            },
            queue_limit: 64,
            client_id: Some("tester".to_string()),
        }
    }

    async fn accept(
        accepted: &mut mpsc::UnboundedReceiver<(String, MemoryPeer)>,
    ) -> (String, MemoryPeer) {
        tokio::time::timeout(WAIT, accepted.recv())
            .await
            .unwrap()
            .unwrap()
    }

    async fn next_message(peer: &mut MemoryPeer) -> ClientMessage {
        tokio::time::timeout(WAIT, peer.recv())
            .await
            .unwrap()
            .unwrap()
    }

    async fn wait_for(
        states: &mut watch::Receiver<ClientState>,
        want: impl Fn(&ClientState) -> bool,
    ) {
        tokio::time::timeout(WAIT, async {
            loop {
                if want(&states.borrow_and_update()) {
                    return;
                }
                states.changed().await.unwrap();
            }
        })
        .await
        .unwrap();
    }

    #[tokio::test]
    async fn test_connect_skips_unreachable_shard() {
        let (connector, mut accepted) = MemoryConnector::new();
        connector.set_unreachable("mem://a", true);
        let mut client =
            RelayClient::with_connector(config(&["mem://a", "mem://b"]), Arc::new(connector))
                .unwrap();

        client.connect().await.unwrap();
        assert_eq!(client.shard().as_deref(), Some("mem://b"));
        assert_eq!(accept(&mut accepted).await.0, "mem://b");

        client.disconnect().await;
        assert_eq!(client.state(), ClientState::Closed);
    }

    #[tokio::test]
    async fn test_no_shard_available() {
        let (connector, _accepted) = MemoryConnector::new();
        connector.set_unreachable("mem://a", true);
        let mut client =
            RelayClient::with_connector(config(&["mem://a"]), Arc::new(connector)).unwrap();

        let result = client.connect().await;
        assert_eq!(result, Err(ClientError::NoShardAvailable));
        assert_eq!(client.state(), ClientState::Idle);
    }

    #[tokio::test]
    async fn test_messages_sent_before_connect_arrive_in_order() {
        let (connector, mut accepted) = MemoryConnector::new();
        let mut client =
            RelayClient::with_connector(config(&["mem://a"]), Arc::new(connector)).unwrap();

        client.join("A7K9");
        client.multiplex("cmd", json!({"op": "run"}), None);
        client.connect().await.unwrap();

        let (_, mut peer) = accept(&mut accepted).await;
        assert_eq!(
            next_message(&mut peer).await,
            ClientMessage::Join {
                key: "A7K9".to_string()
            }
        );
        match next_message(&mut peer).await {
            ClientMessage::Multiplex(envelope) => {
                assert_eq!(envelope.channel, "cmd");
                assert!(envelope.target_id.is_none());
                assert!(envelope.timestamp > 0);
            }
            other => panic!("unexpected message: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_queue_flushes_in_order_after_failover() {
        let (connector, mut accepted) = MemoryConnector::new();
        let connector = Arc::new(connector);
        connector.set_unreachable("mem://b", true);

        let mut client =
            RelayClient::with_connector(config(&["mem://a", "mem://b"]), connector.clone())
                .unwrap();
        client.connect().await.unwrap();
        let (url, peer_a) = accept(&mut accepted).await;
        assert_eq!(url, "mem://a");

        // Shard a goes away, b comes up
        connector.set_unreachable("mem://a", true);
        connector.set_unreachable("mem://b", false);
        drop(peer_a);

        for n in 0..3 {
            client.join(&format!("K{n}"));
        }

        let (url, mut peer_b) = accept(&mut accepted).await;
        assert_eq!(url, "mem://b");
        for n in 0..3 {
            assert_eq!(
                next_message(&mut peer_b).await,
                ClientMessage::Join {
                    key: format!("K{n}")
                }
            );
        }

        let mut states = client.state_changes();
        wait_for(&mut states, |s| matches!(s, ClientState::Connected { .. })).await;
        assert_eq!(client.shard().as_deref(), Some("mem://b"));
    }

    #[tokio::test]
    async fn test_exhausted_reconnect_emits_connection_lost() {
        let (connector, mut accepted) = MemoryConnector::new();
        let connector = Arc::new(connector);
        let mut client =
            RelayClient::with_connector(config(&["mem://a"]), connector.clone()).unwrap();

        let (lost_tx, mut lost_rx) = mpsc::unbounded_channel();
        client.on("CONNECTION_LOST", move |msg| {
            let _ = lost_tx.send(msg.clone());
        });

        client.connect().await.unwrap();
        let (_, peer) = accept(&mut accepted).await;
        connector.set_unreachable("mem://a", true);
        drop(peer);

        let lost = tokio::time::timeout(WAIT, lost_rx.recv()).await.unwrap();
        assert_eq!(lost, Some(ServerMessage::ConnectionLost));

        let mut states = client.state_changes();
        wait_for(&mut states, |s| *s == ClientState::Lost).await;
    }

    #[tokio::test]
    async fn test_connect_after_connection_lost() {
        let (connector, mut accepted) = MemoryConnector::new();
        let connector = Arc::new(connector);
        let mut cfg = config(&["mem://a"]);
        cfg.reconnect.max_attempts = 2;
        let mut client = RelayClient::with_connector(cfg, connector.clone()).unwrap();
        let mut states = client.state_changes();

        client.connect().await.unwrap();
        let (_, peer) = accept(&mut accepted).await;
        connector.set_unreachable("mem://a", true);
        drop(peer);
        wait_for(&mut states, |s| *s == ClientState::Lost).await;

        // Sent while lost, delivered once connected again
        client.join("A7K9");

        connector.set_unreachable("mem://a", false);
        client.connect().await.unwrap();
        assert_eq!(
            client.state(),
            ClientState::Connected {
                shard: "mem://a".to_string()
            }
        );

        let (shard, mut peer) = accept(&mut accepted).await;
        assert_eq!(shard, "mem://a");
        assert_eq!(
            next_message(&mut peer).await,
            ClientMessage::Join {
                key: "A7K9".to_string()
            }
        );

        client.heartbeat();
        assert!(matches!(
            next_message(&mut peer).await,
            ClientMessage::Heartbeat { .. }
        ));

        client.disconnect().await;
        assert_eq!(client.state(), ClientState::Closed);
    }

    #[tokio::test]
    async fn test_disconnect_cancels_pending_reconnect() {
        let (connector, mut accepted) = MemoryConnector::new();
        let mut cfg = config(&["mem://a"]);
        cfg.reconnect.base = Duration::from_secs(10);
        cfg.reconnect.cap = Duration::from_secs(30);
        let mut client = RelayClient::with_connector(cfg, Arc::new(connector)).unwrap();

        let fired = Arc::new(AtomicUsize::new(0));
        let counter = fired.clone();
        client.on("CONNECTION_LOST", move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        client.connect().await.unwrap();
        let mut states = client.state_changes();
        let (_, peer) = accept(&mut accepted).await;
        drop(peer);
        wait_for(&mut states, |s| matches!(s, ClientState::Reconnecting { .. })).await;

        tokio::time::timeout(Duration::from_secs(1), client.disconnect())
            .await
            .unwrap();
        assert_eq!(client.state(), ClientState::Closed);

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 0);
        assert_eq!(client.connect().await, Err(ClientError::Closed));
    }

    #[tokio::test]
    async fn test_demultiplexes_inbound_frames() {
        let (connector, mut accepted) = MemoryConnector::new();
        let mut client =
            RelayClient::with_connector(config(&["mem://a"]), Arc::new(connector)).unwrap();

        let (stream_tx, mut stream_rx) = mpsc::unbounded_channel();
        client.on_stream("cmd", move |env| {
            let _ = stream_tx.send(env.clone());
        });
        let (event_tx, mut event_rx) = mpsc::unbounded_channel();
        client.on("GUEST_JOINED", move |msg| {
            let _ = event_tx.send(msg.clone());
        });

        client.connect().await.unwrap();
        let (_, peer) = accept(&mut accepted).await;

        assert!(peer.send_text("{not json"));
        assert!(peer.send(&ServerMessage::Multiplex(Envelope::new(
            "cmd",
            json!({"op": "run"})
        ))));
        assert!(peer.send(&ServerMessage::GuestJoined {
            guest_id: "g-1".to_string()
        }));

        let envelope = tokio::time::timeout(WAIT, stream_rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(envelope.payload, json!({"op": "run"}));

        let event = tokio::time::timeout(WAIT, event_rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(
            event,
            ServerMessage::GuestJoined {
                guest_id: "g-1".to_string()
            }
        );
    }

    #[tokio::test]
    async fn test_heartbeat_while_connected() {
        let (connector, mut accepted) = MemoryConnector::new();
        let mut cfg = config(&["mem://a"]);
        cfg.heartbeat_interval = Duration::from_millis(30);
        let mut client = RelayClient::with_connector(cfg, Arc::new(connector)).unwrap();

        client.connect().await.unwrap();
        let (_, mut peer) = accept(&mut accepted).await;

        assert_eq!(
            next_message(&mut peer).await,
            ClientMessage::Heartbeat {
                id: Some("tester".to_string())
            }
        );
    }
}
