//! Client configuration

use crate::backoff::ReconnectPolicy;
use crate::error::{ClientError, Result};
use std::time::Duration;

/// Relay client configuration
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Shard URLs (`ws://` / `wss://`), in rotation order
    pub shards: Vec<String>,
    /// Upper bound on one connect attempt (probe or reconnect)
    pub probe_timeout: Duration,
    /// Interval between `HEARTBEAT` messages while connected
    pub heartbeat_interval: Duration,
    /// Reconnect backoff
    pub reconnect: ReconnectPolicy,
    /// Messages kept while disconnected
    pub queue_limit: usize,
    /// Id sent with heartbeats; random when unset
    pub client_id: Option<String>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            shards: vec![format!("ws://127.0.0.1:{}", pairlink_relay::DEFAULT_PORT)],
            probe_timeout: Duration::from_secs(5),
            heartbeat_interval: Duration::from_secs(25),
            reconnect: ReconnectPolicy::default(),
            queue_limit: 1024,
            client_id: None,
        }
    }
}

impl ClientConfig {
    /// Configuration for the given shards, defaults elsewhere
    #[must_use]
    pub fn with_shards<I, S>(shards: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            shards: shards.into_iter().map(Into::into).collect(),
            ..Default::default()
        }
    }

    /// Validate configuration
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::InvalidConfig`] for an empty shard list or zero
    /// intervals.
    pub fn validate(&self) -> Result<()> {
        if self.shards.is_empty() {
            return Err(ClientError::invalid_config("at least one shard is required"));
        }
        if self.probe_timeout.is_zero() || self.heartbeat_interval.is_zero() {
            return Err(ClientError::invalid_config(
                "probe_timeout and heartbeat_interval must be > 0",
            ));
        }
        if self.reconnect.cap < self.reconnect.base {
            return Err(ClientError::invalid_config(
                "reconnect cap must be >= reconnect base",
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_valid() {
        let config = ClientConfig::default();
        assert_eq!(config.shards, vec!["ws://127.0.0.1:8080".to_string()]);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validation() {
        let config = ClientConfig::with_shards(Vec::<String>::new());
        assert!(config.validate().is_err());

        let mut config = ClientConfig::with_shards(["ws://a", "ws://b"]);
        assert_eq!(config.shards.len(), 2);
        config.reconnect.cap = Duration::from_millis(1);
        assert!(config.validate().is_err());
    }
}
