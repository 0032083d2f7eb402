//! Inbound demultiplexing
//!
//! `MULTIPLEX` frames go to the handlers registered for their channel with
//! [`EventTable::on_stream`]; every other relay message goes to the handlers
//! registered for its wire type with [`EventTable::on`]. Frames that do not
//! decode are logged and dropped.

use dashmap::DashMap;
use pairlink_relay::{Envelope, ServerMessage};
use std::sync::Arc;

/// Handler for relay events, keyed by wire type (`GUEST_JOINED`, ...)
pub type EventHandler = Arc<dyn Fn(&ServerMessage) + Send + Sync>;

/// Handler for multiplexed streams, keyed by channel name
pub type StreamHandler = Arc<dyn Fn(&Envelope) + Send + Sync>;

/// Handler tables shared between the facade and its driver
#[derive(Clone, Default)]
pub struct EventTable {
    events: Arc<DashMap<String, Vec<EventHandler>>>,
    streams: Arc<DashMap<String, Vec<StreamHandler>>>,
}

impl EventTable {
    /// Create empty tables
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler for a relay event type
    pub fn on(&self, event_type: &str, handler: EventHandler) {
        self.events
            .entry(event_type.to_string())
            .or_default()
            .push(handler);
    }

    /// Register a handler for a multiplexed channel
    pub fn on_stream(&self, channel: &str, handler: StreamHandler) {
        self.streams
            .entry(channel.to_string())
            .or_default()
            .push(handler);
    }

    /// Decode a text frame and dispatch it
    ///
    /// Returns the number of handlers invoked.
    pub fn dispatch_text(&self, text: &str) -> usize {
        match ServerMessage::from_json(text) {
            Ok(message) => self.dispatch(&message),
            Err(e) => {
                tracing::warn!("Dropping unrecognized frame: {}", e);
                0
            }
        }
    }

    /// Dispatch a decoded message
    ///
    /// Handler lists are copied out before invocation, so handlers may
    /// register further handlers.
    pub fn dispatch(&self, message: &ServerMessage) -> usize {
        match message {
            ServerMessage::Multiplex(envelope) => {
                let handlers = self
                    .streams
                    .get(&envelope.channel)
                    .map(|entry| entry.value().clone())
                    .unwrap_or_default();
                if handlers.is_empty() {
                    tracing::debug!("No handler for channel {}", envelope.channel);
                }
                for handler in &handlers {
                    handler(envelope);
                }
                handlers.len()
            }
            other => {
                let handlers = self
                    .events
                    .get(other.event_type())
                    .map(|entry| entry.value().clone())
                    .unwrap_or_default();
                for handler in &handlers {
                    handler(other);
                }
                handlers.len()
            }
        }
    }
}

impl std::fmt::Debug for EventTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventTable")
            .field("events", &self.events.len())
            .field("streams", &self.streams.len())
            .finish()
    }
}
