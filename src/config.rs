//! Configuration management for the driver.

use crate::{DriverError, DriverResult};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::env;
use std::fmt;
use std::time::Duration;

/// Maximum number of broker hosts a slot rotates through
pub const MAX_HOSTS: usize = 10;

/// Default socket send/receive buffer hint (1 MiB)
pub const DEFAULT_SOCKET_BUFFER: usize = 1 << 20;

/// AMQP short strings carry a one-byte length prefix
const MAX_SHORT_STRING: usize = 255;

/// Per-slot configuration, as handed over by the host pipeline
///
/// Field names match the configuration keys the pipeline resolves, so a
/// TOML section or a flat key/value map deserializes directly.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DriverConfig {
    /// Exchange every record is published to
    #[serde(default)]
    pub exchange: String,

    /// Base routing key; empty disables routing-key derivation
    #[serde(default)]
    pub routingkey: String,

    #[serde(default)]
    pub username: String,

    #[serde(default)]
    pub password: String,

    /// Virtual host to log in to
    #[serde(default = "default_vhost")]
    pub vhost: String,

    /// Heartbeat interval in milliseconds (rounded up to whole seconds)
    #[serde(default = "default_heartbeat_ms")]
    pub heartbeat: u64,

    /// Comma-separated broker hosts, at most [`MAX_HOSTS`] are used
    #[serde(default = "default_hostname")]
    pub hostname: String,

    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_vhost() -> String {
    "/".to_string()
}
fn default_heartbeat_ms() -> u64 {
    5000
}
fn default_hostname() -> String {
    "127.0.0.1".to_string()
}
fn default_port() -> u16 {
    5672
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            exchange: String::new(),
            routingkey: String::new(),
            username: String::new(),
            password: String::new(),
            vhost: default_vhost(),
            heartbeat: default_heartbeat_ms(),
            hostname: default_hostname(),
            port: default_port(),
        }
    }
}

impl DriverConfig {
    /// Build a configuration from already-resolved key/value pairs
    ///
    /// Missing keys fall back to their defaults; unknown keys are ignored.
    pub fn from_settings(settings: &HashMap<String, String>) -> DriverResult<Self> {
        let mut config = Self::default();

        if let Some(v) = settings.get("exchange") {
            config.exchange = v.clone();
        }
        if let Some(v) = settings.get("routingkey") {
            config.routingkey = v.clone();
        }
        if let Some(v) = settings.get("username") {
            config.username = v.clone();
        }
        if let Some(v) = settings.get("password") {
            config.password = v.clone();
        }
        if let Some(v) = settings.get("vhost") {
            config.vhost = v.clone();
        }
        if let Some(v) = settings.get("heartbeat") {
            config.heartbeat = parse_number("heartbeat", v)?;
        }
        if let Some(v) = settings.get("hostname") {
            config.hostname = v.clone();
        }
        if let Some(v) = settings.get("port") {
            config.port = parse_number("port", v)?;
        }

        Ok(config)
    }

    /// Load configuration from a TOML file
    pub fn from_file(path: &str) -> DriverResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            DriverError::config(format!("Failed to read config file {}: {}", path, e))
        })?;

        toml::from_str(&content).map_err(|e| {
            DriverError::config(format!("Failed to parse config file {}: {}", path, e))
        })
    }

    /// Apply environment variable overrides for deployment-specific values
    ///
    /// Reads `AMQP_HOSTNAME`, `AMQP_USERNAME` and `AMQP_PASSWORD`.
    pub fn apply_env_overrides(&mut self) {
        if let Ok(val) = env::var("AMQP_HOSTNAME") {
            self.hostname = val;
        }
        if let Ok(val) = env::var("AMQP_USERNAME") {
            self.username = val;
        }
        if let Ok(val) = env::var("AMQP_PASSWORD") {
            self.password = val;
        }
    }

    /// Broker endpoints in configuration order, truncated to [`MAX_HOSTS`]
    pub fn endpoints(&self) -> Vec<Endpoint> {
        self.hostname
            .split(',')
            .map(str::trim)
            .filter(|h| !h.is_empty())
            .take(MAX_HOSTS)
            .map(|host| Endpoint::new(host, self.port))
            .collect()
    }

    /// Heartbeat interval in whole seconds, rounded up
    pub fn heartbeat_secs(&self) -> u16 {
        let secs = self.heartbeat.div_ceil(1000);
        u16::try_from(secs).unwrap_or(u16::MAX)
    }

    /// Validate the configuration
    pub fn validate(&self) -> DriverResult<()> {
        if self.endpoints().is_empty() {
            return Err(DriverError::config("hostname lists no hosts"));
        }

        if self.port == 0 {
            return Err(DriverError::config("port must be > 0"));
        }

        let short_strings = [
            ("exchange", &self.exchange),
            ("routingkey", &self.routingkey),
            ("vhost", &self.vhost),
            ("username", &self.username),
        ];
        for (key, value) in short_strings {
            if value.len() > MAX_SHORT_STRING {
                return Err(DriverError::config(format!(
                    "{} too long ({} bytes, max {})",
                    key,
                    value.len(),
                    MAX_SHORT_STRING
                )));
            }
        }

        if let Some(host) = self
            .endpoints()
            .iter()
            .find(|e| e.host.len() > MAX_SHORT_STRING)
        {
            return Err(DriverError::config(format!(
                "hostname entry too long ({} bytes)",
                host.host.len()
            )));
        }

        Ok(())
    }
}

/// Process-wide driver tunables
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DriverSettings {
    /// Socket send buffer hint in bytes
    #[serde(default = "default_socket_buffer")]
    pub sndbuf: usize,

    /// Socket receive buffer hint in bytes
    #[serde(default = "default_socket_buffer")]
    pub rcvbuf: usize,

    /// Log level used when `RUST_LOG` is unset
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

fn default_socket_buffer() -> usize {
    DEFAULT_SOCKET_BUFFER
}
fn default_log_level() -> String {
    "info".to_string()
}

impl Default for DriverSettings {
    fn default() -> Self {
        Self {
            sndbuf: DEFAULT_SOCKET_BUFFER,
            rcvbuf: DEFAULT_SOCKET_BUFFER,
            log_level: default_log_level(),
        }
    }
}

impl DriverSettings {
    /// Build tunables from already-resolved key/value pairs (`sndbuf`, `rcvbuf`)
    pub fn from_settings(settings: &HashMap<String, String>) -> DriverResult<Self> {
        let mut out = Self::default();
        if let Some(v) = settings.get("sndbuf") {
            out.sndbuf = parse_number("sndbuf", v)?;
        }
        if let Some(v) = settings.get("rcvbuf") {
            out.rcvbuf = parse_number("rcvbuf", v)?;
        }
        if let Some(v) = settings.get("log_level") {
            out.log_level = v.clone();
        }
        Ok(out)
    }
}

/// Retry configuration settings for slot workers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrySettings {
    /// Maximum number of retries for a failed submission
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Base backoff duration in milliseconds
    #[serde(default = "default_retry_backoff_ms")]
    pub retry_backoff_ms: u64,

    /// Maximum backoff duration in milliseconds
    #[serde(default = "default_max_backoff_ms")]
    pub max_backoff_ms: u64,
}

fn default_max_retries() -> u32 {
    3
}
fn default_retry_backoff_ms() -> u64 {
    1000
}
fn default_max_backoff_ms() -> u64 {
    30000
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_retries: 3,
            retry_backoff_ms: 1000,
            max_backoff_ms: 30000,
        }
    }
}

/// One broker node
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Endpoint {
    pub host: String,
    pub port: u16,
}

impl Endpoint {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

/// Configuration derived for one slot at allocation, immutable afterwards
#[derive(Debug, Clone)]
pub(crate) struct SlotConfig {
    pub(crate) exchange: String,
    pub(crate) routing_key: String,
    pub(crate) username: String,
    pub(crate) password: String,
    pub(crate) vhost: String,
    pub(crate) heartbeat_secs: u16,
    pub(crate) endpoints: Vec<Endpoint>,
}

impl SlotConfig {
    pub(crate) fn from_config(config: &DriverConfig) -> DriverResult<Self> {
        config.validate()?;
        Ok(Self {
            exchange: config.exchange.clone(),
            routing_key: config.routingkey.clone(),
            username: config.username.clone(),
            password: config.password.clone(),
            vhost: config.vhost.clone(),
            heartbeat_secs: config.heartbeat_secs(),
            endpoints: config.endpoints(),
        })
    }

    /// Transport connect timeout; zero heartbeat leaves it to the client
    pub(crate) fn connect_timeout(&self) -> Option<Duration> {
        match self.heartbeat_secs {
            0 => None,
            secs => Some(Duration::from_secs(u64::from(secs))),
        }
    }
}

fn parse_number<T: std::str::FromStr>(key: &str, value: &str) -> DriverResult<T> {
    value
        .trim()
        .parse()
        .map_err(|_| DriverError::config(format!("{} must be an integer, got '{}'", key, value)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_config_default() {
        let config = DriverConfig::default();
        assert_eq!(config.vhost, "/");
        assert_eq!(config.heartbeat, 5000);
        assert_eq!(config.port, 5672);
        assert_eq!(config.routingkey, "");
        assert_eq!(config.endpoints(), vec![Endpoint::new("127.0.0.1", 5672)]);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_heartbeat_rounds_up() {
        let mut config = DriverConfig::default();
        assert_eq!(config.heartbeat_secs(), 5);

        config.heartbeat = 5001;
        assert_eq!(config.heartbeat_secs(), 6);

        config.heartbeat = 1;
        assert_eq!(config.heartbeat_secs(), 1);

        config.heartbeat = 0;
        assert_eq!(config.heartbeat_secs(), 0);
    }

    #[test]
    fn test_hosts_truncated_to_ten() {
        let hosts: Vec<String> = (0..14).map(|i| format!("mq{}", i)).collect();
        let config = DriverConfig {
            hostname: hosts.join(","),
            ..DriverConfig::default()
        };

        let endpoints = config.endpoints();
        assert_eq!(endpoints.len(), MAX_HOSTS);
        assert_eq!(endpoints[0].host, "mq0");
        assert_eq!(endpoints[9].host, "mq9");
    }

    #[test]
    fn test_hosts_skip_blank_entries() {
        let config = DriverConfig {
            hostname: "mq1, ,mq2,".to_string(),
            port: 5671,
            ..DriverConfig::default()
        };
        assert_eq!(
            config.endpoints(),
            vec![Endpoint::new("mq1", 5671), Endpoint::new("mq2", 5671)]
        );
    }

    #[test]
    fn test_from_settings() {
        let config = DriverConfig::from_settings(&settings(&[
            ("exchange", "noit.firehose"),
            ("routingkey", "check"),
            ("username", "guest"),
            ("password", "guest"),
            ("heartbeat", "2500"),
            ("hostname", "mq1,mq2"),
            ("port", "5673"),
        ]))
        .unwrap();

        assert_eq!(config.exchange, "noit.firehose");
        assert_eq!(config.routingkey, "check");
        assert_eq!(config.vhost, "/");
        assert_eq!(config.heartbeat_secs(), 3);
        assert_eq!(config.endpoints().len(), 2);
        assert_eq!(config.port, 5673);
    }

    #[test]
    fn test_from_settings_rejects_bad_numbers() {
        let err = DriverConfig::from_settings(&settings(&[("port", "amqp")])).unwrap_err();
        assert!(err.is_configuration());

        let err = DriverSettings::from_settings(&settings(&[("sndbuf", "-1")])).unwrap_err();
        assert!(err.is_configuration());
    }

    #[test]
    fn test_driver_settings() {
        let tunables = DriverSettings::from_settings(&settings(&[("rcvbuf", "65536")])).unwrap();
        assert_eq!(tunables.sndbuf, DEFAULT_SOCKET_BUFFER);
        assert_eq!(tunables.rcvbuf, 65536);
    }

    #[test]
    fn test_config_validation() {
        let mut config = DriverConfig::default();
        assert!(config.validate().is_ok());

        config.hostname = " , ".to_string();
        assert!(config.validate().is_err());

        config.hostname = "127.0.0.1".to_string();
        config.port = 0;
        assert!(config.validate().is_err());

        config.port = 5672;
        config.exchange = "x".repeat(256);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_slot_config_connect_timeout() {
        let slot = SlotConfig::from_config(&DriverConfig::default()).unwrap();
        assert_eq!(slot.connect_timeout(), Some(Duration::from_secs(5)));

        let config = DriverConfig {
            heartbeat: 0,
            ..DriverConfig::default()
        };
        let slot = SlotConfig::from_config(&config).unwrap();
        assert_eq!(slot.connect_timeout(), None);
    }
}
