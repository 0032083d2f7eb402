//! WebSocket relay server.
//!
//! ```text
//!              accept loop
//!                  │ spawn per socket
//!   ┌──────────────┴──────────────┐
//!   │ reader task    writer task  │ ──Outbound──┐
//!   └──────┬──────────────────────┘             │
//!          │ BrokerCommand                      │
//!          v                                    │
//!     broker task (Registry + SessionTable) ────┘
//!          ^
//!     sweep / status timers
//! ```
//!
//! Each socket gets a reader and a writer. The reader decodes frames and
//! forwards them to the broker task; the broker answers through the socket's
//! outbound channel. All matching state lives in the broker task, so there are
//! no locks on the hot path.

use crate::broker::{Broker, RelayStats};
use crate::config::RelayServerConfig;
use crate::error::{RelayError, Result};
use crate::protocol::ClientMessage;
use crate::registry::{ConnectionId, Outbound, OutboundTx};
use futures_util::{SinkExt, StreamExt};
use std::net::SocketAddr;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, interval_at};
use tokio_tungstenite::accept_async;
use tokio_tungstenite::tungstenite::Message;

/// Commands accepted by the broker task
#[derive(Debug)]
pub enum BrokerCommand {
    /// A socket completed the WebSocket handshake
    Connect {
        /// Assigned connection id
        id: ConnectionId,
        /// Writer channel for the socket
        outbound: OutboundTx,
        /// Remote address
        peer: SocketAddr,
    },
    /// A decoded client message
    Message {
        /// Sending connection
        id: ConnectionId,
        /// Decoded message
        message: ClientMessage,
    },
    /// Pong control frame received
    Pong(ConnectionId),
    /// Socket closed or errored
    Disconnect(ConnectionId),
    /// Request a stats snapshot
    Stats(oneshot::Sender<RelayStats>),
    /// Close every connection and stop
    Shutdown,
}

/// Relay server bound to a TCP listener
pub struct RelayServer {
    listener: TcpListener,
    config: RelayServerConfig,
}

impl RelayServer {
    /// Bind with default configuration
    ///
    /// # Errors
    ///
    /// Returns error if the socket cannot be bound.
    pub async fn bind(addr: SocketAddr) -> Result<Self> {
        Self::bind_with_config(addr, RelayServerConfig::default()).await
    }

    /// Bind with custom configuration
    ///
    /// # Errors
    ///
    /// Returns error if the configuration is invalid or the socket cannot be
    /// bound.
    pub async fn bind_with_config(addr: SocketAddr, config: RelayServerConfig) -> Result<Self> {
        config.validate()?;
        let listener = TcpListener::bind(addr).await?;
        Ok(Self { listener, config })
    }

    /// Address the listener is bound to
    ///
    /// # Errors
    ///
    /// Returns error if the socket address cannot be read.
    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Start the broker and accept loop in the background
    ///
    /// # Errors
    ///
    /// Returns error if the socket address cannot be read.
    pub fn spawn(self) -> Result<RelayHandle> {
        let addr = self.local_addr()?;
        let (commands, command_rx) = mpsc::unbounded_channel();
        let (shutdown, shutdown_rx) = watch::channel(false);

        let broker = tokio::spawn(run_broker(
            Broker::new(self.config.clone()),
            command_rx,
            self.config.clone(),
        ));

        let task = tokio::spawn(accept_loop(
            self.listener,
            commands.clone(),
            self.config.max_message_size,
            shutdown_rx,
            broker,
        ));

        tracing::info!("Relay listening on ws://{}", addr);

        Ok(RelayHandle {
            addr,
            commands,
            shutdown,
            task,
        })
    }

    /// Serve until the accept loop stops
    ///
    /// # Errors
    ///
    /// Returns error if the socket address cannot be read.
    pub async fn run(self) -> Result<()> {
        self.spawn()?.wait().await
    }
}

/// Handle to a running relay
#[derive(Debug)]
pub struct RelayHandle {
    addr: SocketAddr,
    commands: mpsc::UnboundedSender<BrokerCommand>,
    shutdown: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl RelayHandle {
    /// Listening address
    #[must_use]
    pub fn local_addr(&self) -> SocketAddr {
        self.addr
    }

    /// Snapshot the broker counters
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::Channel`] if the broker has stopped.
    pub async fn stats(&self) -> Result<RelayStats> {
        let (tx, rx) = oneshot::channel();
        self.commands
            .send(BrokerCommand::Stats(tx))
            .map_err(|_| RelayError::channel("broker stopped"))?;
        rx.await.map_err(|_| RelayError::channel("stats reply dropped"))
    }

    /// Stop accepting, close every connection and wait for the relay to stop
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::Channel`] if the relay task panicked.
    pub async fn shutdown(self) -> Result<()> {
        let _ = self.shutdown.send(true);
        self.task
            .await
            .map_err(|_| RelayError::channel("relay task failed"))
    }

    /// Wait for the relay to stop on its own
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::Channel`] if the relay task panicked.
    pub async fn wait(self) -> Result<()> {
        let Self { shutdown, task, .. } = self;
        let result = task
            .await
            .map_err(|_| RelayError::channel("relay task failed"));
        drop(shutdown);
        result
    }
}

async fn accept_loop(
    listener: TcpListener,
    commands: mpsc::UnboundedSender<BrokerCommand>,
    max_message_size: usize,
    mut shutdown: watch::Receiver<bool>,
    broker: JoinHandle<()>,
) {
    loop {
        tokio::select! {
            accepted = listener.accept() => match accepted {
                Ok((stream, peer)) => {
                    tokio::spawn(handle_connection(
                        stream,
                        peer,
                        commands.clone(),
                        max_message_size,
                    ));
                }
                Err(e) => tracing::warn!("Accept error: {}", e),
            },
            _ = shutdown.changed() => break,
        }
    }

    tracing::info!("Relay shutting down");
    let _ = commands.send(BrokerCommand::Shutdown);
    if broker.await.is_err() {
        tracing::error!("Broker task panicked");
    }
}

async fn run_broker(
    mut broker: Broker,
    mut commands: mpsc::UnboundedReceiver<BrokerCommand>,
    config: RelayServerConfig,
) {
    let sweep_period = config.liveness.sweep_interval;
    let mut sweep = interval_at(Instant::now() + sweep_period, sweep_period);
    let mut status = interval_at(
        Instant::now() + config.status_interval,
        config.status_interval,
    );

    loop {
        tokio::select! {
            command = commands.recv() => {
                let Some(command) = command else { break };
                match command {
                    BrokerCommand::Connect { id, outbound, peer } => {
                        if broker.connect(id, outbound).is_ok() {
                            tracing::debug!("Connection {} from {}", id, peer);
                        }
                    }
                    BrokerCommand::Message { id, message } => broker.handle(id, message),
                    BrokerCommand::Pong(id) => broker.pong(id),
                    BrokerCommand::Disconnect(id) => broker.disconnect(id),
                    BrokerCommand::Stats(reply) => {
                        let _ = reply.send(broker.stats());
                    }
                    BrokerCommand::Shutdown => break,
                }
            }
            _ = sweep.tick() => {
                let report = broker.sweep();
                if !report.dead.is_empty() {
                    tracing::info!(
                        "Liveness sweep: {} pinged, {} terminated",
                        report.pinged,
                        report.dead.len()
                    );
                }
            }
            _ = status.tick() => {
                let stats = broker.stats();
                tracing::info!(
                    "Status: {} connections, {} hosts, {} waiting, {} active",
                    stats.connections,
                    stats.hosts,
                    stats.waiting,
                    stats.active
                );
            }
        }
    }

    broker.shutdown();
}

async fn handle_connection(
    stream: TcpStream,
    peer: SocketAddr,
    commands: mpsc::UnboundedSender<BrokerCommand>,
    max_message_size: usize,
) {
    let ws = match accept_async(stream).await {
        Ok(ws) => ws,
        Err(e) => {
            tracing::debug!("WebSocket handshake with {} failed: {}", peer, e);
            return;
        }
    };

    let id = ConnectionId::random();
    let (mut sink, mut source) = ws.split();
    let (outbound, mut outbound_rx) = mpsc::unbounded_channel::<Outbound>();

    if commands
        .send(BrokerCommand::Connect { id, outbound, peer })
        .is_err()
    {
        return;
    }

    let mut writer = tokio::spawn(async move {
        while let Some(frame) = outbound_rx.recv().await {
            let sent = match frame {
                Outbound::Message(message) => match message.to_json() {
                    Ok(text) => sink.send(Message::Text(text)).await,
                    Err(e) => {
                        tracing::warn!("Dropping unencodable {}: {}", message.event_type(), e);
                        continue;
                    }
                },
                Outbound::Ping => sink.send(Message::Ping(Vec::new())).await,
                Outbound::Close => {
                    let _ = sink.close().await;
                    break;
                }
            };
            if sent.is_err() {
                break;
            }
        }
    });

    loop {
        tokio::select! {
            frame = source.next() => match frame {
                Some(Ok(Message::Text(text))) => {
                    if text.len() > max_message_size {
                        tracing::warn!(
                            "Dropping {} byte frame from {} (limit {})",
                            text.len(),
                            id,
                            max_message_size
                        );
                        continue;
                    }
                    match ClientMessage::from_json(&text) {
                        Ok(message) => {
                            if commands.send(BrokerCommand::Message { id, message }).is_err() {
                                break;
                            }
                        }
                        Err(e) => tracing::warn!("Dropping malformed frame from {}: {}", id, e),
                    }
                }
                Some(Ok(Message::Pong(_))) => {
                    let _ = commands.send(BrokerCommand::Pong(id));
                }
                Some(Ok(Message::Close(_))) | None => break,
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    tracing::debug!("Read error on {}: {}", id, e);
                    break;
                }
            },
            _ = &mut writer => break,
        }
    }

    let _ = commands.send(BrokerCommand::Disconnect(id));
    writer.abort();
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn localhost() -> SocketAddr {
        "127.0.0.1:0".parse().unwrap()
    }

    #[tokio::test]
    async fn test_relay_server_bind() {
        let server = RelayServer::bind(localhost()).await.unwrap();
        assert_ne!(server.local_addr().unwrap().port(), 0);
    }

    #[tokio::test]
    async fn test_bind_rejects_invalid_config() {
        let config = RelayServerConfig {
            rate_limit: 0,
            ..Default::default()
        };
        let result = RelayServer::bind_with_config(localhost(), config).await;
        assert!(matches!(result, Err(RelayError::InvalidConfig(_))));
    }

    #[tokio::test]
    async fn test_spawn_stats_and_shutdown() {
        let handle = RelayServer::bind(localhost()).await.unwrap().spawn().unwrap();

        let stats = handle.stats().await.unwrap();
        assert_eq!(stats, RelayStats::default());

        tokio::time::timeout(Duration::from_secs(5), handle.shutdown())
            .await
            .unwrap()
            .unwrap();
    }
}
