//! Configuration system for the PAIRLINK CLI.

use pairlink_client::{ClientConfig, ReconnectPolicy};
use pairlink_relay::{GuestLeavePolicy, LivenessConfig, RelayServerConfig};
use serde::{Deserialize, Serialize};
use std::fs;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Environment variable overriding `server.port`
pub const PORT_ENV: &str = "PORT";

/// PAIRLINK configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// Relay server configuration
    #[serde(default)]
    pub server: ServerConfig,
    /// Liveness sweep configuration
    #[serde(default)]
    pub liveness: LivenessSection,
    /// Client configuration
    #[serde(default)]
    pub client: ClientSection,
    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Relay server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Bind host
    #[serde(default = "default_host")]
    pub host: String,
    /// Listen port
    #[serde(default = "default_port")]
    pub port: u16,
    /// Maximum concurrent connections
    #[serde(default = "default_max_connections")]
    pub max_connections: usize,
    /// Messages per connection per second
    #[serde(default = "default_rate_limit")]
    pub rate_limit: usize,
    /// Largest accepted frame in bytes
    #[serde(default = "default_max_message_size")]
    pub max_message_size: usize,
    /// Seconds between status log lines
    #[serde(default = "default_status_interval")]
    pub status_interval_secs: u64,
    /// `close` or `reopen` when a matched guest leaves
    #[serde(default)]
    pub guest_leave_policy: GuestLeavePolicy,
}

/// Liveness sweep configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LivenessSection {
    /// Seconds between ping sweeps
    #[serde(default = "default_sweep_interval")]
    pub sweep_interval_secs: u64,
}

/// Client configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientSection {
    /// Relay shard URLs
    #[serde(default = "default_shards")]
    pub shards: Vec<String>,
    /// Connect timeout per shard, in milliseconds
    #[serde(default = "default_probe_timeout")]
    pub probe_timeout_ms: u64,
    /// Seconds between heartbeats
    #[serde(default = "default_heartbeat_interval")]
    pub heartbeat_interval_secs: u64,
    /// First reconnect delay, in milliseconds
    #[serde(default = "default_reconnect_base")]
    pub reconnect_base_ms: u64,
    /// Reconnect delay cap, in milliseconds
    #[serde(default = "default_reconnect_cap")]
    pub reconnect_cap_ms: u64,
    /// Maximum random jitter added to each delay, in milliseconds
    #[serde(default = "default_reconnect_jitter")]
    pub reconnect_jitter_ms: u64,
    /// Reconnect attempts before giving up
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    /// Messages held while disconnected
    #[serde(default = "default_queue_limit")]
    pub queue_limit: usize,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level
    #[serde(default = "default_log_level")]
    pub level: String,
}

// Default values

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    pairlink_relay::DEFAULT_PORT
}

fn default_max_connections() -> usize {
    10_000
}

fn default_rate_limit() -> usize {
    100
}

fn default_max_message_size() -> usize {
    pairlink_relay::MAX_MESSAGE_SIZE
}

fn default_status_interval() -> u64 {
    60
}

fn default_sweep_interval() -> u64 {
    pairlink_relay::DEFAULT_SWEEP_INTERVAL.as_secs()
}

fn default_shards() -> Vec<String> {
    vec![format!("ws://127.0.0.1:{}", pairlink_relay::DEFAULT_PORT)]
}

fn default_probe_timeout() -> u64 {
    5_000
}

fn default_heartbeat_interval() -> u64 {
    25
}

fn default_reconnect_base() -> u64 {
    1_000
}

fn default_reconnect_cap() -> u64 {
    30_000
}

fn default_reconnect_jitter() -> u64 {
    1_000
}

fn default_max_attempts() -> u32 {
    10
}

fn default_queue_limit() -> usize {
    1024
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            max_connections: default_max_connections(),
            rate_limit: default_rate_limit(),
            max_message_size: default_max_message_size(),
            status_interval_secs: default_status_interval(),
            guest_leave_policy: GuestLeavePolicy::default(),
        }
    }
}

impl Default for LivenessSection {
    fn default() -> Self {
        Self {
            sweep_interval_secs: default_sweep_interval(),
        }
    }
}

impl Default for ClientSection {
    fn default() -> Self {
        Self {
            shards: default_shards(),
            probe_timeout_ms: default_probe_timeout(),
            heartbeat_interval_secs: default_heartbeat_interval(),
            reconnect_base_ms: default_reconnect_base(),
            reconnect_cap_ms: default_reconnect_cap(),
            reconnect_jitter_ms: default_reconnect_jitter(),
            max_attempts: default_max_attempts(),
            queue_limit: default_queue_limit(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

impl Config {
    /// Load configuration from file
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let contents = fs::read_to_string(path)?;
        let config: Self = toml::from_str(&contents)?;
        Ok(config)
    }

    /// Save configuration to file
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> anyhow::Result<()> {
        let contents = toml::to_string_pretty(self)?;

        if let Some(parent) = path.as_ref().parent() {
            fs::create_dir_all(parent)?;
        }

        fs::write(path, contents)?;
        Ok(())
    }

    /// Get default config path
    #[must_use]
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("/tmp"))
            .join("pairlink/config.toml")
    }

    /// Load config from default path, or write the defaults there
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be parsed.
    pub fn load_or_default() -> anyhow::Result<Self> {
        let path = Self::default_path();
        if path.exists() {
            return Self::load(&path);
        }

        let config = Self::default();
        if let Err(e) = config.save(&path) {
            tracing::debug!("Could not write default config to {:?}: {}", path, e);
        }
        Ok(config)
    }

    /// Apply the `PORT` environment override
    ///
    /// # Errors
    ///
    /// Returns an error if `PORT` is set but not a valid port.
    pub fn apply_env(&mut self) -> anyhow::Result<()> {
        self.apply_port(std::env::var(PORT_ENV).ok().as_deref())
    }

    fn apply_port(&mut self, port: Option<&str>) -> anyhow::Result<()> {
        if let Some(port) = port {
            self.server.port = port
                .trim()
                .parse()
                .map_err(|_| anyhow::anyhow!("Invalid {} value: {}", PORT_ENV, port))?;
        }
        Ok(())
    }

    /// Parse `host:port` as `SocketAddr`
    ///
    /// # Errors
    ///
    /// Returns an error if the address cannot be parsed.
    pub fn bind_addr(&self) -> anyhow::Result<SocketAddr> {
        let addr = format!("{}:{}", self.server.host, self.server.port);
        addr.parse()
            .map_err(|e| anyhow::anyhow!("Invalid bind address {}: {}", addr, e))
    }

    /// Validate configuration
    ///
    /// # Errors
    ///
    /// Returns an error if configuration is invalid.
    pub fn validate(&self) -> anyhow::Result<()> {
        self.bind_addr()?;

        if self.server.max_connections == 0 {
            anyhow::bail!("server.max_connections must be > 0");
        }
        if self.server.rate_limit == 0 {
            anyhow::bail!("server.rate_limit must be > 0");
        }
        if self.server.max_message_size == 0 || self.server.max_message_size > 16 * 1024 * 1024 {
            anyhow::bail!("server.max_message_size must be between 1 and 16MB");
        }
        if self.server.status_interval_secs == 0 || self.liveness.sweep_interval_secs == 0 {
            anyhow::bail!("Status and sweep intervals must be > 0");
        }

        if self.client.shards.is_empty() {
            anyhow::bail!("client.shards must list at least one relay");
        }
        for shard in &self.client.shards {
            if !(shard.starts_with("ws://") || shard.starts_with("wss://")) {
                anyhow::bail!("Relay shard '{}' must be a ws:// or wss:// URL", shard);
            }
        }
        if self.client.reconnect_cap_ms < self.client.reconnect_base_ms {
            anyhow::bail!("client.reconnect_cap_ms must be >= client.reconnect_base_ms");
        }

        let valid_log_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_log_levels.contains(&self.logging.level.to_lowercase().as_str()) {
            anyhow::bail!(
                "Invalid log level: {}. Must be one of: {}",
                self.logging.level,
                valid_log_levels.join(", ")
            );
        }

        Ok(())
    }

    /// Relay server settings
    #[must_use]
    pub fn to_server_config(&self) -> RelayServerConfig {
        RelayServerConfig {
            max_connections: self.server.max_connections,
            rate_limit: self.server.rate_limit,
            max_message_size: self.server.max_message_size,
            status_interval: Duration::from_secs(self.server.status_interval_secs),
            guest_leave_policy: self.server.guest_leave_policy,
            liveness: LivenessConfig {
                sweep_interval: Duration::from_secs(self.liveness.sweep_interval_secs),
            },
            ..Default::default()
        }
    }

    /// Client settings; a non-empty `relays` replaces the configured shards
    #[must_use]
    pub fn to_client_config(&self, relays: &[String]) -> ClientConfig {
        let shards = if relays.is_empty() {
            self.client.shards.clone()
        } else {
            relays.to_vec()
        };

        ClientConfig {
            shards,
            probe_timeout: Duration::from_millis(self.client.probe_timeout_ms),
            heartbeat_interval: Duration::from_secs(self.client.heartbeat_interval_secs),
            reconnect: ReconnectPolicy {
                base: Duration::from_millis(self.client.reconnect_base_ms),
                cap: Duration::from_millis(self.client.reconnect_cap_ms),
                jitter: Duration::from_millis(self.client.reconnect_jitter_ms),
                max_attempts: self.client.max_attempts,
            },
            queue_limit: self.client.queue_limit,
            client_id: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.server.guest_leave_policy, GuestLeavePolicy::Close);
        assert_eq!(config.bind_addr().unwrap().to_string(), "0.0.0.0:8080");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_validation() {
        let mut config = Config::default();
        config.server.rate_limit = 0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.client.shards = vec!["http://relay".to_string()];
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.logging.level = "loud".to_string();
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.server.host = "not a host".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_port_override() {
        let mut config = Config::default();
        config.apply_port(Some("9001")).unwrap();
        assert_eq!(config.server.port, 9001);

        config.apply_port(None).unwrap();
        assert_eq!(config.server.port, 9001);

        assert!(config.apply_port(Some("http")).is_err());
    }

    #[test]
    fn test_partial_toml() {
        let config: Config = toml::from_str(
            r#"
            [server]
            port = 9000
            guest_leave_policy = "reopen"

            [client]
            shards = ["wss://a.example", "wss://b.example"]
            "#,
        )
        .unwrap();

        assert_eq!(config.server.port, 9000);
        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(config.server.guest_leave_policy, GuestLeavePolicy::Reopen);
        assert_eq!(config.liveness.sweep_interval_secs, 30);
        assert_eq!(config.client.shards.len(), 2);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_conversions() {
        let config = Config::default();

        let server = config.to_server_config();
        assert!(server.validate().is_ok());
        assert_eq!(server.liveness.sweep_interval, Duration::from_secs(30));

        let client = config.to_client_config(&[]);
        assert_eq!(client.shards, config.client.shards);
        assert_eq!(client.reconnect, ReconnectPolicy::default());
        assert!(client.validate().is_ok());

        let relays = vec!["ws://10.0.0.1:8080".to_string()];
        assert_eq!(config.to_client_config(&relays).shards, relays);
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/config.toml");

        let mut config = Config::default();
        config.server.port = 7000;
        config.save(&path).unwrap();

        let loaded = Config::load(&path).unwrap();
        assert_eq!(loaded.server.port, 7000);
        assert_eq!(loaded.client.shards, config.client.shards);
    }
}
