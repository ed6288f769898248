// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Discovery Server role.

use super::lifecycle::{Lifecycle, RunState, StopKind};
use super::{AppError, Role, RoleApplication};
use crate::config::{ServerConfig, DEFAULT_HEARTBEAT_SECS};
use crate::discovery::DiscoveryServer;
use std::net::SocketAddr;
use tokio::runtime::Runtime;
use tracing::{debug, error, info, warn};

const CATEGORY: &str = "Discovery Server";

/// Hosts a [`DiscoveryServer`] on its own tokio runtime.
///
/// The socket is bound at construction, so an unusable address fails
/// before the worker thread is started.
pub struct ServerApp {
    server: DiscoveryServer,
    runtime: Runtime,
    lifecycle: Lifecycle,
}

impl ServerApp {
    pub fn new(config: ServerConfig) -> Result<Self, AppError> {
        config.validate()?;

        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(2)
            .thread_name("ds-server")
            .enable_all()
            .build()
            .map_err(AppError::Runtime)?;

        let server = DiscoveryServer::bind(config.clone())?;

        info!(category = CATEGORY, "Listen address: {}", server.local_addr());
        if config.domain_id == 0 {
            info!(category = CATEGORY, "Domain ID: all");
        } else {
            info!(category = CATEGORY, "Domain ID: {}", config.domain_id);
        }
        info!(category = CATEGORY, "Lease duration: {}s", config.lease_duration_secs);
        if config.lease_duration_secs <= DEFAULT_HEARTBEAT_SECS {
            warn!(
                category = CATEGORY,
                "Lease duration is not above the default client heartbeat ({}s); \
                 clients need a shorter --heartbeat-interval",
                DEFAULT_HEARTBEAT_SECS
            );
        }
        info!(
            category = CATEGORY,
            "Relay mode: {}",
            if config.relay_enabled { "enabled" } else { "disabled" }
        );
        if let Some(timeout) = config.timeout() {
            info!(category = CATEGORY, "Timeout: {}s", timeout.as_secs());
        }

        Ok(Self {
            server,
            runtime,
            lifecycle: Lifecycle::new(),
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.server.local_addr()
    }

    pub fn participant_count(&self) -> usize {
        self.runtime.block_on(self.server.participant_count())
    }
}

impl RoleApplication for ServerApp {
    fn role(&self) -> Role {
        Role::Server
    }

    fn run(&self) {
        if !self.lifecycle.begin() {
            return;
        }

        // Shutdown is latched: a stop issued before `run` subscribes still ends it.
        if let Err(e) = self.runtime.block_on(self.server.run()) {
            error!(category = CATEGORY, "Server error: {}", e);
        }

        let stats = self.runtime.block_on(self.server.relay_stats());
        info!(
            category = CATEGORY,
            "Relayed {} messages ({} bytes, {} errors)",
            stats.messages_relayed,
            stats.bytes_relayed,
            stats.relay_errors
        );
        self.lifecycle.finish();
    }

    fn stop(&self) {
        if self.lifecycle.request_stop(StopKind::Immediate) {
            debug!(category = CATEGORY, "Stop requested");
        }
        self.server.shutdown();
    }

    fn state(&self) -> RunState {
        self.lifecycle.state()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::{IpAddr, Ipv4Addr};
    use std::sync::Arc;
    use std::thread;
    use std::time::{Duration, Instant};

    fn local_config() -> ServerConfig {
        ServerConfig {
            listening_address: IpAddr::V4(Ipv4Addr::LOCALHOST),
            port: 0,
            ..Default::default()
        }
    }

    #[test]
    fn test_bind_failure_is_construction_error() {
        let first = ServerApp::new(local_config()).unwrap();
        let config = ServerConfig {
            port: first.local_addr().port(),
            ..local_config()
        };

        assert!(matches!(ServerApp::new(config), Err(AppError::Server(_))));
    }

    #[test]
    fn test_run_until_stopped() {
        let app = Arc::new(ServerApp::new(local_config()).unwrap());
        let worker = {
            let app = app.clone();
            thread::spawn(move || app.run())
        };

        // Server accepts connections while running.
        let deadline = Instant::now() + Duration::from_secs(5);
        while std::net::TcpStream::connect(app.local_addr()).is_err() {
            assert!(Instant::now() < deadline);
            thread::sleep(Duration::from_millis(10));
        }

        app.stop();
        app.stop();
        worker.join().unwrap();
        assert_eq!(app.state(), RunState::Stopped);
        assert_eq!(app.participant_count(), 0);
    }

    #[test]
    fn test_stop_before_run() {
        let app = ServerApp::new(local_config()).unwrap();
        app.stop();
        app.run();
        assert_eq!(app.state(), RunState::Stopped);
    }

    #[test]
    fn test_timeout_ends_run() {
        let app = ServerApp::new(ServerConfig {
            timeout_secs: 1,
            ..local_config()
        })
        .unwrap();

        let start = Instant::now();
        app.run();
        assert!(start.elapsed() >= Duration::from_secs(1));
        assert_eq!(app.state(), RunState::Stopped);
    }
}
