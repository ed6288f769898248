// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Role configuration.
//!
//! One options struct per role, built once from the command line (or, for
//! the server, a JSON file) and handed to the application constructor.

use crate::app::Role;
use crate::discovery::protocol::{DEFAULT_MAX_MESSAGE_SIZE, MAX_FRAME_BODY};
use serde::{Deserialize, Serialize};
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::Path;
use std::time::Duration;

/// Highest domain id with a valid RTPS port mapping.
pub const MAX_DOMAIN_ID: u32 = 232;

/// Default discovery server port.
pub const DEFAULT_SERVER_PORT: u16 = 16166;

pub const DEFAULT_TOPIC: &str = "discovery_server_topic";

/// Default client heartbeat period in seconds.
pub const DEFAULT_HEARTBEAT_SECS: u64 = 10;

/// Connection settings shared by publisher and subscriber.
#[derive(Debug, Clone, PartialEq)]
pub struct ClientConfig {
    /// Discovery server address (host:port).
    pub server_address: SocketAddr,

    pub domain_id: u32,

    pub topic_name: String,

    /// Connection timeout.
    pub connect_timeout: Duration,

    /// Delay between reconnection attempts.
    pub reconnect_delay: Duration,

    /// Heartbeat interval (to keep lease alive).
    pub heartbeat_interval: Duration,

    /// Read timeout; bounds how long the run loop can miss a stop request.
    pub poll_interval: Duration,

    pub max_message_size: usize,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            server_address: SocketAddr::new(
                IpAddr::V4(Ipv4Addr::LOCALHOST),
                DEFAULT_SERVER_PORT,
            ),
            domain_id: 0,
            topic_name: DEFAULT_TOPIC.to_string(),
            connect_timeout: Duration::from_secs(5),
            reconnect_delay: Duration::from_secs(1),
            heartbeat_interval: Duration::from_secs(DEFAULT_HEARTBEAT_SECS),
            poll_interval: Duration::from_millis(50),
            max_message_size: DEFAULT_MAX_MESSAGE_SIZE,
        }
    }
}

impl ClientConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.server_address.port() == 0 {
            return Err(ConfigError::InvalidValue(
                "connection port cannot be 0".into(),
            ));
        }
        validate_domain(self.domain_id)?;
        if self.topic_name.is_empty() {
            return Err(ConfigError::InvalidValue("topic name cannot be empty".into()));
        }
        if self.connect_timeout.is_zero()
            || self.heartbeat_interval.is_zero()
            || self.poll_interval.is_zero()
        {
            return Err(ConfigError::InvalidValue(
                "connect_timeout, heartbeat_interval and poll_interval must be > 0".into(),
            ));
        }
        validate_max_message_size(self.max_message_size)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PublisherConfig {
    pub client: ClientConfig,

    /// Number of samples to send (0 = until stopped).
    pub samples: u32,

    /// Period between samples.
    pub interval: Duration,

    pub reliable: bool,
}

impl Default for PublisherConfig {
    fn default() -> Self {
        Self {
            client: ClientConfig::default(),
            samples: 0,
            interval: Duration::from_millis(100),
            reliable: false,
        }
    }
}

impl PublisherConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.client.validate()?;
        if self.interval.is_zero() {
            return Err(ConfigError::InvalidValue("interval must be > 0".into()));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SubscriberConfig {
    pub client: ClientConfig,

    /// Number of samples to receive before returning (0 = until stopped).
    pub samples: u32,
}

impl SubscriberConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.client.validate()
    }
}

/// Discovery Server configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Address to bind to (default: 0.0.0.0)
    #[serde(default = "default_listening_address")]
    pub listening_address: IpAddr,

    /// TCP port to listen on; 0 lets the OS pick one.
    #[serde(default = "default_port")]
    pub port: u16,

    /// Domain ID to serve (0 = all domains)
    #[serde(default)]
    pub domain_id: u32,

    /// Participant lease duration in seconds
    #[serde(default = "default_lease_duration")]
    pub lease_duration_secs: u64,

    /// Forward DATA between participants
    #[serde(default = "default_true")]
    pub relay_enabled: bool,

    #[serde(default = "default_max_participants")]
    pub max_participants: usize,

    /// Lease check period in seconds
    #[serde(default = "default_lease_check_interval")]
    pub lease_check_interval_secs: u64,

    #[serde(default = "default_max_message_size")]
    pub max_message_size: usize,

    /// Stop on its own after this many seconds (0 = until stopped)
    #[serde(default)]
    pub timeout_secs: u64,
}

fn default_listening_address() -> IpAddr {
    IpAddr::V4(Ipv4Addr::UNSPECIFIED)
}

fn default_port() -> u16 {
    DEFAULT_SERVER_PORT
}

fn default_lease_duration() -> u64 {
    30
}

fn default_true() -> bool {
    true
}

fn default_max_participants() -> usize {
    1000
}

fn default_lease_check_interval() -> u64 {
    5
}

fn default_max_message_size() -> usize {
    DEFAULT_MAX_MESSAGE_SIZE
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listening_address: default_listening_address(),
            port: default_port(),
            domain_id: 0,
            lease_duration_secs: default_lease_duration(),
            relay_enabled: true,
            max_participants: default_max_participants(),
            lease_check_interval_secs: default_lease_check_interval(),
            max_message_size: default_max_message_size(),
            timeout_secs: 0,
        }
    }
}

impl ServerConfig {
    /// Load configuration from a JSON file.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Ok(serde_json::from_str(&content)?)
    }

    /// Save configuration to a JSON file.
    pub fn to_file(&self, path: &Path) -> Result<(), ConfigError> {
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })
    }

    pub fn bind_address(&self) -> SocketAddr {
        SocketAddr::new(self.listening_address, self.port)
    }

    pub fn lease_duration(&self) -> Duration {
        Duration::from_secs(self.lease_duration_secs)
    }

    pub fn lease_check_interval(&self) -> Duration {
        Duration::from_secs(self.lease_check_interval_secs)
    }

    /// `None` when the server runs until stopped.
    pub fn timeout(&self) -> Option<Duration> {
        (self.timeout_secs > 0).then(|| Duration::from_secs(self.timeout_secs))
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_domain(self.domain_id)?;
        if self.lease_duration_secs == 0 {
            return Err(ConfigError::InvalidValue(
                "lease_duration_secs cannot be 0".into(),
            ));
        }
        if self.lease_check_interval_secs == 0 {
            return Err(ConfigError::InvalidValue(
                "lease_check_interval_secs cannot be 0".into(),
            ));
        }
        if self.max_participants == 0 {
            return Err(ConfigError::InvalidValue(
                "max_participants cannot be 0".into(),
            ));
        }
        validate_max_message_size(self.max_message_size)
    }
}

fn validate_domain(domain_id: u32) -> Result<(), ConfigError> {
    if domain_id > MAX_DOMAIN_ID {
        return Err(ConfigError::InvalidValue(format!(
            "domain id {} out of range (0..={})",
            domain_id, MAX_DOMAIN_ID
        )));
    }
    Ok(())
}

fn validate_max_message_size(max_message_size: usize) -> Result<(), ConfigError> {
    if max_message_size == 0 || max_message_size > MAX_FRAME_BODY {
        return Err(ConfigError::InvalidValue(format!(
            "max_message_size {} out of range (1..={})",
            max_message_size, MAX_FRAME_BODY
        )));
    }
    Ok(())
}

/// Configuration of the role selected at startup.
#[derive(Debug, Clone, PartialEq)]
pub enum RoleConfig {
    Publisher(PublisherConfig),
    Subscriber(SubscriberConfig),
    Server(ServerConfig),
}

impl RoleConfig {
    pub fn role(&self) -> Role {
        match self {
            Self::Publisher(_) => Role::Publisher,
            Self::Subscriber(_) => Role::Subscriber,
            Self::Server(_) => Role::Server,
        }
    }

    /// Sample bound for the startup banner (0 = unbounded; servers have none).
    pub fn samples(&self) -> u32 {
        match self {
            Self::Publisher(c) => c.samples,
            Self::Subscriber(c) => c.samples,
            Self::Server(_) => 0,
        }
    }
}

/// Configuration error types.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("I/O error reading {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Parse error: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Invalid value: {0}")]
    InvalidValue(String),
}
