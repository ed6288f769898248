// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Command line interface.

use crate::config::{
    ClientConfig, ConfigError, PublisherConfig, RoleConfig, ServerConfig, SubscriberConfig,
    DEFAULT_HEARTBEAT_SECS, DEFAULT_SERVER_PORT, DEFAULT_TOPIC,
};
use crate::logging::LogLevel;
use crate::supervisor::SupervisorOptions;
use clap::{Args, Parser, Subcommand};
use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::time::Duration;

/// HDDS Discovery Server example.
///
/// Runs one of three roles: a HelloWorld publisher, a HelloWorld subscriber,
/// or the discovery server both of them connect to.
#[derive(Parser, Debug)]
#[command(name = "hdds-ds-example")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Log level
    #[arg(long, value_enum, default_value = "info", global = true)]
    pub log_level: LogLevel,

    /// Give up waiting for the role this many seconds after a stop request
    #[arg(long, value_name = "SECS", global = true)]
    pub shutdown_timeout: Option<u64>,

    #[command(subcommand)]
    pub role: RoleCommand,
}

#[derive(Subcommand, Debug)]
pub enum RoleCommand {
    /// Publish HelloWorld samples
    Publisher(PublisherArgs),

    /// Receive HelloWorld samples
    Subscriber(SubscriberArgs),

    /// Run the discovery server
    Server(ServerArgs),
}

/// Discovery server connection options.
#[derive(Args, Debug)]
pub struct ConnectionArgs {
    /// Discovery server address
    #[arg(short = 'c', long, default_value = "127.0.0.1")]
    pub connection_address: IpAddr,

    /// Discovery server port
    #[arg(short = 'p', long, default_value_t = DEFAULT_SERVER_PORT)]
    pub connection_port: u16,

    /// Domain ID
    #[arg(short, long, default_value_t = 0)]
    pub domain: u32,

    /// Topic name
    #[arg(long, default_value = DEFAULT_TOPIC)]
    pub topic: String,

    /// Seconds between heartbeats; keep below the server's lease duration
    #[arg(long, value_name = "SECS", default_value_t = DEFAULT_HEARTBEAT_SECS)]
    pub heartbeat_interval: u64,
}

impl ConnectionArgs {
    fn client_config(&self) -> ClientConfig {
        ClientConfig {
            server_address: SocketAddr::new(self.connection_address, self.connection_port),
            domain_id: self.domain,
            topic_name: self.topic.clone(),
            heartbeat_interval: Duration::from_secs(self.heartbeat_interval),
            ..Default::default()
        }
    }
}

#[derive(Args, Debug)]
pub struct PublisherArgs {
    #[command(flatten)]
    pub connection: ConnectionArgs,

    /// Number of samples to send (0 = until stopped)
    #[arg(short, long, default_value_t = 0)]
    pub samples: u32,

    /// Milliseconds between samples
    #[arg(short, long, default_value_t = 100)]
    pub interval: u64,

    /// Announce a reliable writer
    #[arg(long)]
    pub reliable: bool,
}

#[derive(Args, Debug)]
pub struct SubscriberArgs {
    #[command(flatten)]
    pub connection: ConnectionArgs,

    /// Number of samples to receive before exiting (0 = until stopped)
    #[arg(short, long, default_value_t = 0)]
    pub samples: u32,
}

#[derive(Args, Debug)]
pub struct ServerArgs {
    /// Address to listen on
    #[arg(short = 'l', long, default_value = "0.0.0.0")]
    pub listening_address: IpAddr,

    /// TCP port to listen on
    #[arg(short = 'p', long, default_value_t = DEFAULT_SERVER_PORT)]
    pub listening_port: u16,

    /// Domain ID to serve (0 = all)
    #[arg(short, long, default_value_t = 0)]
    pub domain: u32,

    /// Stop after this many seconds (0 = until stopped)
    #[arg(short, long, default_value_t = 0)]
    pub timeout: u64,

    /// Participant lease duration in seconds
    #[arg(long, default_value_t = 30)]
    pub lease_duration: u64,

    /// Do not forward DATA between participants
    #[arg(long)]
    pub no_relay: bool,

    /// JSON configuration file (replaces the options above)
    #[arg(
        long,
        conflicts_with_all = [
            "listening_address",
            "listening_port",
            "domain",
            "timeout",
            "lease_duration",
            "no_relay",
        ]
    )]
    pub config: Option<PathBuf>,
}

impl ServerArgs {
    fn server_config(&self) -> Result<ServerConfig, ConfigError> {
        if let Some(path) = &self.config {
            return ServerConfig::from_file(path);
        }
        Ok(ServerConfig {
            listening_address: self.listening_address,
            port: self.listening_port,
            domain_id: self.domain,
            lease_duration_secs: self.lease_duration,
            relay_enabled: !self.no_relay,
            timeout_secs: self.timeout,
            ..Default::default()
        })
    }
}

impl Cli {
    /// Options for the selected role. Values are checked later, when the
    /// role is constructed.
    pub fn role_config(&self) -> Result<RoleConfig, ConfigError> {
        Ok(match &self.role {
            RoleCommand::Publisher(args) => RoleConfig::Publisher(PublisherConfig {
                client: args.connection.client_config(),
                samples: args.samples,
                interval: Duration::from_millis(args.interval),
                reliable: args.reliable,
            }),
            RoleCommand::Subscriber(args) => RoleConfig::Subscriber(SubscriberConfig {
                client: args.connection.client_config(),
                samples: args.samples,
            }),
            RoleCommand::Server(args) => RoleConfig::Server(args.server_config()?),
        })
    }

    pub fn supervisor_options(&self) -> SupervisorOptions {
        SupervisorOptions {
            shutdown_timeout: self.shutdown_timeout.map(Duration::from_secs),
            ..Default::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::Role;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_publisher_defaults() {
        let cli = Cli::try_parse_from(["hdds-ds-example", "publisher"]).unwrap();
        let RoleConfig::Publisher(config) = cli.role_config().unwrap() else {
            panic!("expected publisher config");
        };

        assert_eq!(config.samples, 0);
        assert_eq!(config.interval, Duration::from_millis(100));
        assert_eq!(config.client.server_address, "127.0.0.1:16166".parse::<SocketAddr>().unwrap());
        assert_eq!(config.client.topic_name, DEFAULT_TOPIC);
        assert_eq!(
            config.client.heartbeat_interval,
            Duration::from_secs(DEFAULT_HEARTBEAT_SECS)
        );
        assert!(cli.supervisor_options().shutdown_timeout.is_none());
    }

    #[test]
    fn test_subscriber_options() {
        let cli = Cli::try_parse_from([
            "hdds-ds-example",
            "--shutdown-timeout",
            "3",
            "subscriber",
            "-s",
            "5",
            "-c",
            "10.0.0.2",
            "-p",
            "7400",
            "-d",
            "4",
            "--heartbeat-interval",
            "2",
        ])
        .unwrap();
        let config = cli.role_config().unwrap();

        assert_eq!(config.role(), Role::Subscriber);
        assert_eq!(config.samples(), 5);
        let RoleConfig::Subscriber(config) = config else {
            panic!("expected subscriber config");
        };
        assert_eq!(config.client.server_address, "10.0.0.2:7400".parse::<SocketAddr>().unwrap());
        assert_eq!(config.client.domain_id, 4);
        assert_eq!(config.client.heartbeat_interval, Duration::from_secs(2));
        assert_eq!(
            cli.supervisor_options().shutdown_timeout,
            Some(Duration::from_secs(3))
        );
    }

    #[test]
    fn test_server_options() {
        let cli = Cli::try_parse_from([
            "hdds-ds-example",
            "server",
            "-l",
            "127.0.0.1",
            "-p",
            "0",
            "-t",
            "2",
            "--no-relay",
        ])
        .unwrap();
        let RoleConfig::Server(config) = cli.role_config().unwrap() else {
            panic!("expected server config");
        };

        assert_eq!(config.port, 0);
        assert!(!config.relay_enabled);
        assert_eq!(config.timeout(), Some(Duration::from_secs(2)));
    }

    #[test]
    fn test_server_config_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ds.json");
        std::fs::write(&path, r#"{"port": 7412, "relay_enabled": false}"#).unwrap();

        let cli = Cli::try_parse_from([
            "hdds-ds-example",
            "server",
            "--config",
            path.to_str().unwrap(),
        ])
        .unwrap();
        let RoleConfig::Server(config) = cli.role_config().unwrap() else {
            panic!("expected server config");
        };
        assert_eq!(config.port, 7412);
        assert!(!config.relay_enabled);
    }

    #[test]
    fn test_server_config_file_excludes_flags() {
        let err = Cli::try_parse_from([
            "hdds-ds-example",
            "server",
            "--config",
            "ds.json",
            "-p",
            "7413",
        ])
        .unwrap_err();
        assert_eq!(err.kind(), clap::error::ErrorKind::ArgumentConflict);

        assert!(Cli::try_parse_from([
            "hdds-ds-example",
            "server",
            "--config",
            "ds.json",
            "--lease-duration",
            "5",
        ])
        .is_err());
    }

    #[test]
    fn test_malformed_arguments_rejected() {
        assert!(Cli::try_parse_from(["hdds-ds-example"]).is_err());
        assert!(Cli::try_parse_from(["hdds-ds-example", "relay"]).is_err());
        assert!(Cli::try_parse_from(["hdds-ds-example", "publisher", "-s", "many"]).is_err());
        assert!(Cli::try_parse_from(["hdds-ds-example", "subscriber", "--interval", "5"]).is_err());
    }
}
