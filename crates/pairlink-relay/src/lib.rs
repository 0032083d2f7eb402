//! # PAIRLINK Relay
//!
//! Rendezvous and signaling relay for peer-to-peer sessions.
//!
//! This crate provides:
//! - Connection registry with O(1) key and peer id lookup
//! - Host/guest matching (at most one guest per host)
//! - Session-scoped relay for handshake (`SIGNAL`) and channel (`MULTIPLEX`) traffic
//! - Ping/pong liveness sweep that reclaims silent connections
//! - WebSocket server wiring it all together
//!
//! ## Pairing
//!
//! ```text
//! host  ── REGISTER {key:"A7K9"} ──>  relay
//! guest ── JOIN {key:"A7K9"} ──────>  relay ── GUEST_JOINED ──> host
//!                                           ── MATCHED ──────> guest
//! guest ── SIGNAL {offer} ─────────>  relay ── SIGNAL ───────> host
//! host  ── SIGNAL {targetId, answer}> relay ── SIGNAL ───────> guest
//! ```
//!
//! Once the handshake completes, the peers talk directly and the relay only
//! carries whatever they choose to multiplex through it.
//!
//! ## Example
//!
//! ```rust,no_run
//! use pairlink_relay::RelayServer;
//!
//! # async fn example() -> pairlink_relay::Result<()> {
//! let addr = "0.0.0.0:8080".parse().unwrap();
//! let handle = RelayServer::bind(addr).await?.spawn()?;
//! println!("relay on {}", handle.local_addr());
//! handle.wait().await?;
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod broker;
pub mod config;
pub mod error;
pub mod liveness;
pub mod protocol;
pub mod registry;
pub mod router;
pub mod server;
pub mod session;

use std::time::Duration;

// Re-export commonly used types
pub use broker::{Broker, RelayStats};
pub use config::{LivenessConfig, RelayServerConfig};
pub use error::{RelayError, Result};
pub use protocol::{ClientMessage, Envelope, ServerMessage};
pub use registry::{ConnectionId, Registry};
pub use server::{RelayHandle, RelayServer};
pub use session::{GuestLeavePolicy, SessionStatus};

/// Default listening port
pub const DEFAULT_PORT: u16 = 8080;

/// Default upper bound on a single text frame (64 KiB)
pub const MAX_MESSAGE_SIZE: usize = 64 * 1024;

/// Default liveness sweep interval
pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(30);
