//! Outbound message queue
//!
//! Holds messages produced while no connection is up. Bounded: when full, the
//! oldest message is discarded so a long outage cannot grow memory without
//! limit.

use pairlink_relay::ClientMessage;
use std::collections::VecDeque;

/// FIFO of messages awaiting a connection
#[derive(Debug)]
pub struct OutboundQueue {
    items: VecDeque<ClientMessage>,
    limit: usize,
    dropped: u64,
}

impl OutboundQueue {
    /// Create a queue holding at most `limit` messages
    #[must_use]
    pub fn new(limit: usize) -> Self {
        Self {
            items: VecDeque::new(),
            limit: limit.max(1),
            dropped: 0,
        }
    }

    /// Append a message, discarding the oldest if full
    ///
    /// Returns false if a message was discarded.
    pub fn push(&mut self, message: ClientMessage) -> bool {
        let mut kept_all = true;
        if self.items.len() >= self.limit {
            self.items.pop_front();
            self.dropped += 1;
            kept_all = false;
            tracing::warn!("Outbound queue full ({}), dropped oldest message", self.limit);
        }
        self.items.push_back(message);
        kept_all
    }

    /// Put a message back at the head (a send that failed mid-flight)
    pub fn push_front(&mut self, message: ClientMessage) {
        if self.items.len() >= self.limit {
            // The head is older than anything queued behind it
            self.items.pop_back();
            self.dropped += 1;
        }
        self.items.push_front(message);
    }

    /// Take the oldest message
    pub fn pop_front(&mut self) -> Option<ClientMessage> {
        self.items.pop_front()
    }

    /// Number of queued messages
    #[must_use]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Check if nothing is queued
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Messages discarded because the queue was full
    #[must_use]
    pub fn dropped(&self) -> u64 {
        self.dropped
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn join(n: usize) -> ClientMessage {
        ClientMessage::Join {
            key: format!("K{n}"),
        }
    }

    #[test]
    fn test_fifo_order() {
        let mut queue = OutboundQueue::new(8);
        for n in 0..3 {
            assert!(queue.push(join(n)));
        }
        assert_eq!(queue.pop_front(), Some(join(0)));
        assert_eq!(queue.pop_front(), Some(join(1)));
        assert_eq!(queue.pop_front(), Some(join(2)));
        assert!(queue.is_empty());
    }

    #[test]
    fn test_overflow_drops_oldest() {
        let mut queue = OutboundQueue::new(2);
        queue.push(join(0));
        queue.push(join(1));
        assert!(!queue.push(join(2)));

        assert_eq!(queue.len(), 2);
        assert_eq!(queue.dropped(), 1);
        assert_eq!(queue.pop_front(), Some(join(1)));
    }

    #[test]
    fn test_push_front_requeues_head() {
        let mut queue = OutboundQueue::new(4);
        queue.push(join(1));
        queue.push_front(join(0));
        assert_eq!(queue.pop_front(), Some(join(0)));
        assert_eq!(queue.pop_front(), Some(join(1)));
    }
}
