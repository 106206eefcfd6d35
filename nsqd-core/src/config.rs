use config::{Config as ConfigBuilder, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::net::{SocketAddr, ToSocketAddrs};
use std::path::Path;
use std::time::Duration;

/// Node configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// TCP listen address of this node, announced to lookupd peers
    pub tcp_address: String,
    /// lookupd TCP addresses (host:port) to announce to
    pub lookupd_tcp_addresses: Vec<String>,
    pub lookup: LookupConfig,
    pub logging: LoggingConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            tcp_address: "0.0.0.0:4150".to_string(),
            lookupd_tcp_addresses: Vec::new(),
            lookup: LookupConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

/// Timing knobs for the lookup router
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LookupConfig {
    /// Period between PING heartbeats to every lookupd peer
    pub heartbeat_interval_secs: u64,
    /// Upper bound on a single command round trip
    pub command_timeout_secs: u64,
    /// Upper bound on dialing a lookupd peer
    pub connect_timeout_secs: u64,
}

impl Default for LookupConfig {
    fn default() -> Self {
        Self {
            heartbeat_interval_secs: 15,
            command_timeout_secs: 5,
            connect_timeout_secs: 2,
        }
    }
}

impl LookupConfig {
    #[must_use]
    pub const fn heartbeat_interval(&self) -> Duration {
        Duration::from_secs(self.heartbeat_interval_secs)
    }

    #[must_use]
    pub const fn command_timeout(&self) -> Duration {
        Duration::from_secs(self.command_timeout_secs)
    }

    #[must_use]
    pub const fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub format: String, // "json" or "pretty"
    pub file_path: Option<String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
            file_path: None,
        }
    }
}

impl Config {
    /// Load configuration from multiple sources with priority:
    /// 1. Environment variables (highest priority)
    /// 2. Config file (if provided)
    /// 3. Defaults (lowest priority)
    pub fn load(config_file: Option<&str>) -> Result<Self, ConfigError> {
        let mut builder = ConfigBuilder::builder();

        if let Some(path) = config_file {
            if Path::new(path).exists() {
                builder = builder.add_source(File::with_name(path));
            }
        }

        // NSQD_TCP_ADDRESS, NSQD_LOOKUP__HEARTBEAT_INTERVAL_SECS, ...
        builder = builder.add_source(
            Environment::with_prefix("NSQD")
                .prefix_separator("_")
                .separator("__")
                .list_separator(",")
                .with_list_parse_key("lookupd_tcp_addresses")
                .try_parsing(true),
        );

        let config = builder.build()?;
        config.try_deserialize()
    }

    /// Load from environment variables only
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::load(None)
    }

    /// Resolve `tcp_address` (`host:port`) to the address the node listens on.
    ///
    /// An empty host (`:4150`) means every interface. Hostnames are looked up
    /// and an IPv4 result is preferred.
    pub fn tcp_socket_addr(&self) -> crate::Result<SocketAddr> {
        let invalid = |reason: String| {
            crate::Error::InvalidInput(format!(
                "invalid tcp_address {:?}: {reason}",
                self.tcp_address
            ))
        };

        let address = if self.tcp_address.starts_with(':') {
            format!("0.0.0.0{}", self.tcp_address)
        } else {
            self.tcp_address.clone()
        };

        let resolved: Vec<SocketAddr> = address
            .to_socket_addrs()
            .map_err(|e| invalid(e.to_string()))?
            .collect();

        resolved
            .iter()
            .find(|addr| addr.is_ipv4())
            .or_else(|| resolved.first())
            .copied()
            .ok_or_else(|| invalid("resolved to no addresses".to_string()))
    }

    /// Check the configuration for values the node cannot run with.
    ///
    /// Returns every problem found rather than stopping at the first one.
    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();

        if let Err(e) = self.tcp_socket_addr() {
            errors.push(e.to_string());
        }

        for host in &self.lookupd_tcp_addresses {
            if host.trim().is_empty() {
                errors.push("lookupd_tcp_addresses contains an empty entry".to_string());
            }
        }

        if self.lookup.heartbeat_interval_secs == 0 {
            errors.push("lookup.heartbeat_interval_secs must be greater than 0".to_string());
        }
        if self.lookup.command_timeout_secs == 0 {
            errors.push("lookup.command_timeout_secs must be greater than 0".to_string());
        }
        if self.lookup.connect_timeout_secs == 0 {
            errors.push("lookup.connect_timeout_secs must be greater than 0".to_string());
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}
