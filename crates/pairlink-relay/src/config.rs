//! Relay server configuration

use crate::error::{RelayError, Result};
use crate::session::GuestLeavePolicy;
use std::time::Duration;

/// Liveness sweep configuration
#[derive(Debug, Clone)]
pub struct LivenessConfig {
    /// Time between sweeps; a connection silent for a full interval is reaped
    pub sweep_interval: Duration,
}

impl Default for LivenessConfig {
    fn default() -> Self {
        Self {
            sweep_interval: crate::DEFAULT_SWEEP_INTERVAL,
        }
    }
}

/// Relay server configuration
#[derive(Debug, Clone)]
pub struct RelayServerConfig {
    /// Maximum number of concurrent connections
    pub max_connections: usize,
    /// Messages allowed per connection per `rate_window`
    pub rate_limit: usize,
    /// Rate limiting window
    pub rate_window: Duration,
    /// Largest accepted text frame in bytes
    pub max_message_size: usize,
    /// Interval between status log lines
    pub status_interval: Duration,
    /// Session handling when a matched guest disconnects
    pub guest_leave_policy: GuestLeavePolicy,
    /// Liveness sweep settings
    pub liveness: LivenessConfig,
}

impl Default for RelayServerConfig {
    fn default() -> Self {
        Self {
            max_connections: 10_000,
            rate_limit: 100,
            rate_window: Duration::from_secs(1),
            max_message_size: crate::MAX_MESSAGE_SIZE,
            status_interval: Duration::from_secs(60),
            guest_leave_policy: GuestLeavePolicy::default(),
            liveness: LivenessConfig::default(),
        }
    }
}

impl RelayServerConfig {
    /// Validate configuration
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::InvalidConfig`] for zero limits or intervals.
    pub fn validate(&self) -> Result<()> {
        if self.max_connections == 0 {
            return Err(RelayError::invalid_config("max_connections must be > 0"));
        }
        if self.rate_limit == 0 || self.rate_window.is_zero() {
            return Err(RelayError::invalid_config(
                "rate_limit and rate_window must be > 0",
            ));
        }
        if self.max_message_size == 0 {
            return Err(RelayError::invalid_config("max_message_size must be > 0"));
        }
        if self.liveness.sweep_interval.is_zero() || self.status_interval.is_zero() {
            return Err(RelayError::invalid_config("intervals must be > 0"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_relay_server_config_default() {
        let config = RelayServerConfig::default();
        assert_eq!(config.max_connections, 10_000);
        assert_eq!(config.rate_limit, 100);
        assert_eq!(config.liveness.sweep_interval, Duration::from_secs(30));
        assert_eq!(config.guest_leave_policy, GuestLeavePolicy::Close);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_validation() {
        let mut config = RelayServerConfig {
            max_connections: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());

        config.max_connections = 1;
        config.liveness.sweep_interval = Duration::ZERO;
        assert!(config.validate().is_err());
    }
}
