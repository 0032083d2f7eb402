//! In-process transport
//!
//! Every successful `connect` hands the far end of the connection (a
//! [`MemoryPeer`]) to whoever holds the accept receiver, which then plays the
//! relay. URLs can be made unreachable or slow at runtime to exercise shard
//! selection and failover.

use super::{Connector, Transport};
use crate::error::{ClientError, Result};
use async_trait::async_trait;
use dashmap::{DashMap, DashSet};
use pairlink_relay::{ClientMessage, ServerMessage};
use std::time::Duration;
use tokio::sync::mpsc;

/// Connector whose connections are served in-process
#[derive(Debug)]
pub struct MemoryConnector {
    accepted: mpsc::UnboundedSender<(String, MemoryPeer)>,
    unreachable: DashSet<String>,
    latency: DashMap<String, Duration>,
}

impl MemoryConnector {
    /// Create a connector and the receiver of accepted connections
    #[must_use]
    pub fn new() -> (Self, mpsc::UnboundedReceiver<(String, MemoryPeer)>) {
        let (accepted, rx) = mpsc::unbounded_channel();
        let connector = Self {
            accepted,
            unreachable: DashSet::new(),
            latency: DashMap::new(),
        };
        (connector, rx)
    }

    /// Refuse connections to `url`
    pub fn set_unreachable(&self, url: &str, unreachable: bool) {
        if unreachable {
            self.unreachable.insert(url.to_string());
        } else {
            self.unreachable.remove(url);
        }
    }

    /// Delay connections to `url`
    pub fn set_latency(&self, url: &str, latency: Duration) {
        self.latency.insert(url.to_string(), latency);
    }
}

#[async_trait]
impl Connector for MemoryConnector {
    async fn connect(&self, url: &str) -> Result<Box<dyn Transport>> {
        let latency = self.latency.get(url).map(|entry| *entry.value());
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }
        if self.unreachable.contains(url) {
            return Err(ClientError::transport("connection refused"));
        }

        let (to_peer, from_client) = mpsc::unbounded_channel();
        let (to_client, from_peer) = mpsc::unbounded_channel();
        let peer = MemoryPeer {
            tx: to_client,
            rx: from_client,
        };
        self.accepted
            .send((url.to_string(), peer))
            .map_err(|_| ClientError::transport("acceptor gone"))?;

        Ok(Box::new(MemoryTransport {
            tx: Some(to_peer),
            rx: from_peer,
        }))
    }
}

/// Client side of an in-process connection
#[derive(Debug)]
pub struct MemoryTransport {
    tx: Option<mpsc::UnboundedSender<String>>,
    rx: mpsc::UnboundedReceiver<String>,
}

#[async_trait]
impl Transport for MemoryTransport {
    async fn send(&mut self, text: String) -> Result<()> {
        let tx = self.tx.as_ref().ok_or(ClientError::Closed)?;
        tx.send(text)
            .map_err(|_| ClientError::transport("peer closed"))
    }

    async fn recv(&mut self) -> Option<Result<String>> {
        self.rx.recv().await.map(Ok)
    }

    async fn close(&mut self) {
        self.tx = None;
        self.rx.close();
    }
}

/// Relay side of an in-process connection
///
/// Dropping it closes the connection from the relay's side.
#[derive(Debug)]
pub struct MemoryPeer {
    tx: mpsc::UnboundedSender<String>,
    rx: mpsc::UnboundedReceiver<String>,
}

impl MemoryPeer {
    /// Send a relay message to the client
    pub fn send(&self, message: &ServerMessage) -> bool {
        message
            .to_json()
            .is_ok_and(|text| self.tx.send(text).is_ok())
    }

    /// Send a raw text frame to the client
    pub fn send_text(&self, text: impl Into<String>) -> bool {
        self.tx.send(text.into()).is_ok()
    }

    /// Receive the next client message
    ///
    /// Returns `None` once the client closed the connection. Frames that do
    /// not decode are skipped.
    pub async fn recv(&mut self) -> Option<ClientMessage> {
        loop {
            let text = self.rx.recv().await?;
            if let Ok(message) = ClientMessage::from_json(&text) {
                return Some(message);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_connect_and_exchange() {
        let (connector, mut accepted) = MemoryConnector::new();
        let mut transport = connector.connect("mem://a").await.unwrap();
        let (url, mut peer) = accepted.recv().await.unwrap();
        assert_eq!(url, "mem://a");

        transport
            .send(r#"{"type":"JOIN","key":"A7K9"}"#.to_string())
            .await
            .unwrap();
        assert_eq!(
            peer.recv().await,
            Some(ClientMessage::Join {
                key: "A7K9".to_string()
            })
        );

        assert!(peer.send(&ServerMessage::ConnectionLost));
        let text = transport.recv().await.unwrap().unwrap();
        assert_eq!(text, r#"{"type":"CONNECTION_LOST"}"#);
    }

    #[tokio::test]
    async fn test_unreachable_url() {
        let (connector, _accepted) = MemoryConnector::new();
        connector.set_unreachable("mem://down", true);
        assert!(connector.connect("mem://down").await.is_err());

        connector.set_unreachable("mem://down", false);
        assert!(connector.connect("mem://down").await.is_ok());
    }

    #[tokio::test]
    async fn test_peer_drop_closes_transport() {
        let (connector, mut accepted) = MemoryConnector::new();
        let mut transport = connector.connect("mem://a").await.unwrap();
        let (_, peer) = accepted.recv().await.unwrap();

        drop(peer);
        assert!(transport.recv().await.is_none());
        assert!(transport.send("x".to_string()).await.is_err());
    }

    #[tokio::test]
    async fn test_close_ends_peer_stream() {
        let (connector, mut accepted) = MemoryConnector::new();
        let mut transport = connector.connect("mem://a").await.unwrap();
        let (_, mut peer) = accepted.recv().await.unwrap();

        transport.close().await;
        assert!(peer.recv().await.is_none());
    }
}
