//! # PAIRLINK Client
//!
//! Client side of the PAIRLINK relay.
//!
//! This crate provides:
//! - Shard selection: probe every relay shard, keep the fastest
//! - Reconnect with capped exponential backoff and jitter, rotating shards
//! - An outbound queue that holds messages while disconnected
//! - Channel demultiplexing of inbound `MULTIPLEX` traffic
//!
//! ## Example
//!
//! ```rust,no_run
//! use pairlink_client::{ClientConfig, RelayClient};
//! use serde_json::json;
//!
//! # async fn example() -> pairlink_client::Result<()> {
//! let config = ClientConfig::with_shards(["wss://relay-a.example", "wss://relay-b.example"]);
//! let mut client = RelayClient::new(config)?;
//!
//! client.on("MATCHED", |msg| println!("matched: {msg:?}"));
//! client.on_stream("cmd", |env| println!("cmd from {:?}: {}", env.from, env.payload));
//!
//! client.connect().await?;
//! client.join("A7K9");
//! client.multiplex("cmd", json!({"op": "run"}), None);
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod backoff;
pub mod client;
pub mod config;
pub mod error;
pub mod events;
pub mod queue;
pub mod selection;
pub mod transport;

pub use backoff::ReconnectPolicy;
pub use client::{ClientState, RelayClient};
pub use config::ClientConfig;
pub use error::{ClientError, Result};
pub use events::{EventHandler, EventTable, StreamHandler};
pub use queue::OutboundQueue;
pub use selection::ShardSelector;
pub use transport::{Connector, Transport, WsConnector};

#[cfg(any(test, feature = "test-util"))]
pub use transport::{MemoryConnector, MemoryPeer};
