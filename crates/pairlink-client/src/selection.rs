//! Relay shard selection.
//!
//! Shards are redundant relay instances. The selector probes all of them
//! concurrently, measuring the time to open a connection, and keeps the
//! fastest. On failure it rotates round-robin through the list so repeated
//! reconnects spread over every shard instead of hammering the one that just
//! failed.

use crate::error::{ClientError, Result};
use crate::transport::{Connector, Transport};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinSet;

/// Latency-based shard selector
#[derive(Debug, Clone)]
pub struct ShardSelector {
    /// Configured shard URLs, in rotation order
    shards: Vec<String>,
    /// Measured connect latencies (shard -> latency)
    latencies: HashMap<String, Duration>,
    /// Last latency measurement time
    last_measurement: HashMap<String, Instant>,
    /// Index of the shard in use
    current: Option<usize>,
}

impl ShardSelector {
    /// Create a selector over `shards`
    #[must_use]
    pub fn new(shards: Vec<String>) -> Self {
        Self {
            shards,
            latencies: HashMap::new(),
            last_measurement: HashMap::new(),
            current: None,
        }
    }

    /// Configured shards
    #[must_use]
    pub fn shards(&self) -> &[String] {
        &self.shards
    }

    /// Add a shard to the rotation
    pub fn add_shard(&mut self, url: impl Into<String>) {
        let url = url.into();
        if !self.shards.contains(&url) {
            self.shards.push(url);
        }
    }

    /// Remove a shard
    pub fn remove_shard(&mut self, url: &str) {
        let current = self.current().map(str::to_string);
        self.shards.retain(|s| s != url);
        self.latencies.remove(url);
        self.last_measurement.remove(url);
        self.current = current.and_then(|c| self.shards.iter().position(|s| *s == c));
    }

    /// Record a measured latency
    pub fn update_latency(&mut self, url: &str, latency: Duration) {
        self.latencies.insert(url.to_string(), latency);
        self.last_measurement
            .insert(url.to_string(), Instant::now());
    }

    /// Forget a shard's latency (it failed its probe)
    pub fn mark_unreachable(&mut self, url: &str) {
        self.latencies.remove(url);
    }

    /// Measured latency for a shard
    #[must_use]
    pub fn latency(&self, url: &str) -> Option<Duration> {
        self.latencies.get(url).copied()
    }

    /// Time since a shard was last measured
    #[must_use]
    pub fn measurement_age(&self, url: &str) -> Option<Duration> {
        self.last_measurement.get(url).map(Instant::elapsed)
    }

    /// Measured shard with the lowest latency
    #[must_use]
    pub fn select_lowest_latency(&self) -> Option<&str> {
        self.shards
            .iter()
            .filter_map(|shard| self.latencies.get(shard).map(|latency| (shard, latency)))
            .min_by_key(|(_, latency)| **latency)
            .map(|(shard, _)| shard.as_str())
    }

    /// Shard in use
    #[must_use]
    pub fn current(&self) -> Option<&str> {
        self.current
            .and_then(|index| self.shards.get(index))
            .map(String::as_str)
    }

    /// Make `url` the shard in use
    pub fn set_current(&mut self, url: &str) {
        self.current = self.shards.iter().position(|s| s == url);
    }

    /// Advance round-robin to the next shard and make it current
    pub fn rotate(&mut self) -> Option<&str> {
        if self.shards.is_empty() {
            return None;
        }
        let next = self
            .current
            .map_or(0, |index| (index + 1) % self.shards.len());
        self.current = Some(next);
        self.shards.get(next).map(String::as_str)
    }

    /// Probe every shard concurrently and keep the fastest connection
    ///
    /// Each probe opens a real connection bounded by `timeout`. The winner's
    /// connection is returned ready to use; the others are closed.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::NoShardAvailable`] if no shard could be reached.
    pub async fn probe(
        &mut self,
        connector: Arc<dyn Connector>,
        timeout: Duration,
    ) -> Result<(String, Box<dyn Transport>)> {
        let mut probes = JoinSet::new();
        for shard in &self.shards {
            let connector = connector.clone();
            let shard = shard.clone();
            probes.spawn(async move {
                let started = Instant::now();
                let result = tokio::time::timeout(timeout, connector.connect(&shard))
                    .await
                    .unwrap_or(Err(ClientError::Timeout));
                (shard, started.elapsed(), result)
            });
        }

        let mut open: Vec<(String, Box<dyn Transport>)> = Vec::new();
        while let Some(joined) = probes.join_next().await {
            let Ok((shard, latency, result)) = joined else {
                continue;
            };
            match result {
                Ok(transport) => {
                    tracing::debug!("Shard {} answered in {:?}", shard, latency);
                    self.update_latency(&shard, latency);
                    open.push((shard, transport));
                }
                Err(e) => {
                    tracing::warn!("Shard {} unreachable: {}", shard, e);
                    self.mark_unreachable(&shard);
                }
            }
        }

        let best = self
            .select_lowest_latency()
            .map(str::to_string)
            .ok_or(ClientError::NoShardAvailable)?;

        let mut winner = None;
        for (shard, mut transport) in open {
            if winner.is_none() && shard == best {
                winner = Some(transport);
            } else {
                transport.close().await;
            }
        }

        let transport = winner.ok_or(ClientError::NoShardAvailable)?;
        self.set_current(&best);
        tracing::info!("Selected shard {}", best);
        Ok((best, transport))
    }
}
