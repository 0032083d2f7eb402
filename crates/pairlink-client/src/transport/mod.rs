//! Transport abstraction
//!
//! The driver only needs to open a connection to a shard URL and move text
//! frames over it. [`ws`] provides the WebSocket implementation used in
//! production. The in-process `memory` pair used by tests is compiled only
//! under `cfg(test)` or the `test-util` feature.

#[cfg(any(test, feature = "test-util"))]
pub mod memory;
pub mod ws;

use crate::error::Result;
use async_trait::async_trait;

#[cfg(any(test, feature = "test-util"))]
pub use memory::{MemoryConnector, MemoryPeer};
pub use ws::WsConnector;

/// An open connection to one relay shard
#[async_trait]
pub trait Transport: Send {
    /// Send one text frame
    async fn send(&mut self, text: String) -> Result<()>;

    /// Receive the next text frame
    ///
    /// Returns `None` once the connection is closed. Must be cancel safe.
    async fn recv(&mut self) -> Option<Result<String>>;

    /// Close the connection
    async fn close(&mut self);
}

/// Opens transports to shard URLs
#[async_trait]
pub trait Connector: Send + Sync {
    /// Connect to `url`
    async fn connect(&self, url: &str) -> Result<Box<dyn Transport>>;
}
