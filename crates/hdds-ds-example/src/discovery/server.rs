// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Discovery Server core implementation.

use super::connection::{ClientConnection, ConnectionError};
use super::guid::GuidPrefix;
use super::protocol::{error_code, DiscoveryMessage, EndpointAnnounce, ParticipantAnnounce};
use super::registry::ParticipantRegistry;
use super::relay::{RelayRouter, RelayStats, Route};
use crate::config::ServerConfig;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tokio::net::TcpListener;
use tokio::sync::{mpsc, watch, RwLock};
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

/// Per-connection outbound queue depth.
const OUTBOUND_QUEUE_LEN: usize = 256;

struct Shared {
    config: ServerConfig,
    registry: RwLock<ParticipantRegistry>,
    router: RwLock<RelayRouter>,
    shutdown: watch::Sender<bool>,
}

/// Discovery Server - centralized discovery for DDS.
///
/// The listening socket is bound by [`DiscoveryServer::bind`], so an
/// unusable address is reported before anything is spawned.
#[derive(Clone)]
pub struct DiscoveryServer {
    shared: Arc<Shared>,
    listener: Arc<Mutex<Option<std::net::TcpListener>>>,
    local_addr: SocketAddr,
    running: Arc<AtomicBool>,
}

impl DiscoveryServer {
    /// Validate the configuration and bind the listening socket.
    pub fn bind(config: ServerConfig) -> Result<Self, ServerError> {
        config
            .validate()
            .map_err(|e| ServerError::Config(e.to_string()))?;

        let addr = config.bind_address();
        let listener = std::net::TcpListener::bind(addr).map_err(|source| ServerError::Bind {
            addr,
            source,
        })?;
        listener.set_nonblocking(true)?;
        let local_addr = listener.local_addr()?;

        let (shutdown, _) = watch::channel(false);

        Ok(Self {
            shared: Arc::new(Shared {
                config,
                registry: RwLock::new(ParticipantRegistry::new()),
                router: RwLock::new(RelayRouter::new()),
                shutdown,
            }),
            listener: Arc::new(Mutex::new(Some(listener))),
            local_addr,
            running: Arc::new(AtomicBool::new(false)),
        })
    }

    /// Address the server is actually listening on.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Serve until [`shutdown`](Self::shutdown) or the configured timeout.
    ///
    /// Must be called from within a tokio runtime. A server runs at most once.
    pub async fn run(&self) -> Result<(), ServerError> {
        let std_listener = self
            .listener
            .lock()
            .map_err(|_| ServerError::AlreadyRunning)?
            .take()
            .ok_or(ServerError::AlreadyRunning)?;
        let listener = TcpListener::from_std(std_listener)?;
        self.running.store(true, Ordering::SeqCst);

        info!("Discovery server listening on {}", self.local_addr);

        let mut tasks = JoinSet::new();
        tasks.spawn(lease_checker(self.shared.clone()));

        let timeout = self.shared.config.timeout();
        let deadline = async move {
            match timeout {
                Some(d) => tokio::time::sleep(d).await,
                None => std::future::pending::<()>().await,
            }
        };
        tokio::pin!(deadline);

        let mut shutdown_rx = self.shared.shutdown.subscribe();

        loop {
            tokio::select! {
                result = listener.accept() => match result {
                    Ok((stream, peer_addr)) => {
                        info!("New connection from {}", peer_addr);
                        stream.set_nodelay(true).ok();
                        let shared = self.shared.clone();
                        tasks.spawn(async move {
                            if let Err(e) = handle_connection(stream, peer_addr, shared).await {
                                warn!("Connection error from {}: {}", peer_addr, e);
                            }
                        });
                    }
                    Err(e) => error!("Accept error: {}", e),
                },
                _ = stopped(&mut shutdown_rx) => {
                    info!("Shutdown requested");
                    break;
                }
                _ = &mut deadline => {
                    info!("Server timeout elapsed");
                    break;
                }
            }
        }

        // Release connection handlers and the lease checker.
        self.shared.shutdown.send_replace(true);
        while tasks.join_next().await.is_some() {}

        self.running.store(false, Ordering::SeqCst);
        Ok(())
    }

    /// Signal the server to shut down. Safe to call repeatedly, before or
    /// during [`run`](Self::run), from any thread.
    pub fn shutdown(&self) {
        self.shared.shutdown.send_replace(true);
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    pub async fn participant_count(&self) -> usize {
        self.shared.registry.read().await.participant_count()
    }

    pub async fn endpoint_count(&self) -> usize {
        self.shared.registry.read().await.endpoint_count()
    }

    pub async fn relay_stats(&self) -> RelayStats {
        self.shared.router.read().await.stats().clone()
    }
}

/// Resolves once shutdown has been requested.
async fn stopped(rx: &mut watch::Receiver<bool>) {
    let _ = rx.wait_for(|stop| *stop).await;
}

async fn lease_checker(shared: Arc<Shared>) {
    let lease_duration = shared.config.lease_duration();
    let mut interval = tokio::time::interval(shared.config.lease_check_interval());
    let mut shutdown_rx = shared.shutdown.subscribe();

    loop {
        tokio::select! {
            _ = interval.tick() => {
                let mut router = shared.router.write().await;
                let expired = shared.registry.write().await.remove_expired(lease_duration);
                if expired.is_empty() {
                    continue;
                }
                info!("Removed {} expired participants", expired.len());
                for entry in &expired {
                    let guid_prefix = entry.guid_prefix();
                    debug!("  - {}", guid_prefix);
                    // The client notices the closed connection and announces again.
                    if let Some(route) = router.unregister(&guid_prefix) {
                        route.evict();
                    }
                    router.broadcast(
                        DiscoveryMessage::ParticipantLeave { guid_prefix },
                        entry.domain_id(),
                        None,
                    );
                }
            }
            _ = stopped(&mut shutdown_rx) => {
                debug!("Lease checker shutting down");
                break;
            }
        }
    }
}

async fn handle_connection(
    stream: tokio::net::TcpStream,
    peer_addr: SocketAddr,
    shared: Arc<Shared>,
) -> Result<(), ServerError> {
    let mut conn = ClientConnection::new(stream, peer_addr, shared.config.max_message_size);
    let (outbound_tx, mut outbound_rx) = mpsc::channel::<DiscoveryMessage>(OUTBOUND_QUEUE_LEN);
    let route = Route::new(outbound_tx);
    let mut shutdown_rx = shared.shutdown.subscribe();

    let result = loop {
        tokio::select! {
            result = conn.read_message() => match result {
                Ok(Some(msg)) => {
                    if let Err(e) = process_message(&mut conn, msg, &shared, &route).await {
                        break Err(e);
                    }
                }
                Ok(None) => {
                    info!("Connection closed: {}", peer_addr);
                    break Ok(());
                }
                Err(e) => break Err(e.into()),
            },
            Some(outbound) = outbound_rx.recv() => {
                if let Err(e) = conn.send_message(&outbound).await {
                    break Err(e.into());
                }
            }
            _ = route.evicted() => {
                info!("Evicting connection {}", peer_addr);
                conn.send_message(&DiscoveryMessage::Error {
                    code: error_code::EVICTED,
                    message: "Registration evicted, announce again".into(),
                })
                .await
                .ok();
                conn.shutdown().await.ok();
                break Ok(());
            }
            _ = stopped(&mut shutdown_rx) => {
                debug!("Connection handler shutting down: {}", peer_addr);
                conn.shutdown().await.ok();
                break Ok(());
            }
        }
    };

    if let Some(guid_prefix) = conn.guid_prefix() {
        remove_participant(&shared, &guid_prefix, &route).await;
    }

    result
}

/// Drop a participant registered through `route` and tell its domain peers.
///
/// A prefix that has since been re-registered on another connection, or
/// evicted, is left alone.
async fn remove_participant(shared: &Shared, guid_prefix: &GuidPrefix, route: &Route) {
    // Lock order: router, then registry.
    let mut router = shared.router.write().await;
    if !router.unregister_connection(guid_prefix, route) {
        debug!("{} no longer owned by this connection", guid_prefix);
        return;
    }
    let removed = shared.registry.write().await.remove_participant(guid_prefix);

    if let Some(entry) = removed {
        info!("Removed participant {}", guid_prefix);
        router.broadcast(
            DiscoveryMessage::ParticipantLeave {
                guid_prefix: *guid_prefix,
            },
            entry.domain_id(),
            Some(guid_prefix),
        );
    }
}

async fn process_message(
    conn: &mut ClientConnection,
    msg: DiscoveryMessage,
    shared: &Shared,
    route: &Route,
) -> Result<(), ServerError> {
    match msg {
        DiscoveryMessage::ParticipantAnnounce(announce) => {
            register_participant(conn, announce, shared, route).await?;
        }

        DiscoveryMessage::EndpointAnnounce(endpoint) => {
            register_endpoint(conn, endpoint, shared).await?;
        }

        DiscoveryMessage::Heartbeat { guid_prefix } => {
            if !shared.registry.write().await.touch_participant(&guid_prefix) {
                debug!("Heartbeat from unknown participant {}", guid_prefix);
                conn.send_message(&DiscoveryMessage::Error {
                    code: error_code::NOT_REGISTERED,
                    message: format!("Unknown participant {}", guid_prefix),
                })
                .await?;
            }
        }

        DiscoveryMessage::ParticipantLeave { guid_prefix } => {
            if conn.guid_prefix() != Some(guid_prefix) {
                warn!(
                    "Ignoring leave for {} from {}",
                    guid_prefix,
                    conn.peer_addr()
                );
                return Ok(());
            }
            info!("Participant leave: {}", guid_prefix);
            remove_participant(shared, &guid_prefix, route).await;
        }

        DiscoveryMessage::Error { code, message } => {
            warn!("Received error from client: {} - {}", code, message);
        }

        DiscoveryMessage::ParticipantAck { .. } => {
            debug!("Unexpected ACK received");
        }

        DiscoveryMessage::Data {
            destination,
            payload,
            ..
        } if shared.config.relay_enabled => {
            let Some(source) = conn.guid_prefix() else {
                return Err(ServerError::Protocol(
                    "Relay from unregistered participant".into(),
                ));
            };

            match shared
                .router
                .write()
                .await
                .relay_data(destination, source, payload)
            {
                Ok(true) => debug!("Relayed DATA from {} to {}", source, destination),
                Ok(false) => debug!("Relay destination {} not found", destination),
                Err(e) => warn!("Relay error: {}", e),
            }
        }

        DiscoveryMessage::Data { .. } => {
            debug!("DATA received but relay mode disabled");
        }
    }

    Ok(())
}

async fn register_participant(
    conn: &mut ClientConnection,
    announce: ParticipantAnnounce,
    shared: &Shared,
    route: &Route,
) -> Result<(), ServerError> {
    let guid_prefix = announce.guid_prefix;
    let domain_id = announce.domain_id;
    debug!("Participant announce: {}", guid_prefix);

    let served = shared.config.domain_id;
    if served != 0 && domain_id != served {
        warn!(
            "Rejecting {}: domain {} not served (serving {})",
            guid_prefix, domain_id, served
        );
        conn.send_message(&DiscoveryMessage::Error {
            code: error_code::DOMAIN_MISMATCH,
            message: format!("Domain {} not served", domain_id),
        })
        .await?;
        return Ok(());
    }

    // Registry entry and route change together, so a closing connection
    // never sees one without the other. The snapshot of what the newcomer
    // must learn is taken under the same locks.
    let snapshot = {
        let mut router = shared.router.write().await;
        let mut reg = shared.registry.write().await;
        if !reg.contains(&guid_prefix) && reg.participant_count() >= shared.config.max_participants
        {
            None
        } else {
            reg.add_participant(announce.clone());

            let participants: Vec<ParticipantAnnounce> = reg
                .participants()
                .filter(|p| p.guid_prefix() != guid_prefix && p.domain_id() == domain_id)
                .map(|p| p.announce.clone())
                .collect();
            let endpoints: Vec<EndpointAnnounce> = reg
                .endpoints()
                .filter(|e| e.guid_prefix != guid_prefix)
                .filter(|e| {
                    reg.get_participant(&e.guid_prefix)
                        .is_some_and(|p| p.domain_id() == domain_id)
                })
                .cloned()
                .collect();
            drop(reg);

            if let Some(previous) = router.register(guid_prefix, domain_id, route.clone()) {
                if !previous.same_connection(route) {
                    info!("{} re-registered, evicting previous connection", guid_prefix);
                    previous.evict();
                }
            }
            router.broadcast(
                DiscoveryMessage::ParticipantAnnounce(announce),
                domain_id,
                Some(&guid_prefix),
            );
            Some((participants, endpoints))
        }
    };

    let Some((known_participants, known_endpoints)) = snapshot else {
        warn!("Max participants reached, rejecting {}", guid_prefix);
        conn.send_message(&DiscoveryMessage::Error {
            code: error_code::MAX_PARTICIPANTS,
            message: "Max participants reached".into(),
        })
        .await?;
        return Ok(());
    };

    conn.set_guid_prefix(guid_prefix);

    conn.send_message(&DiscoveryMessage::ParticipantAck { guid_prefix })
        .await?;
    for participant in known_participants {
        conn.send_message(&DiscoveryMessage::ParticipantAnnounce(participant))
            .await?;
    }
    for endpoint in known_endpoints {
        conn.send_message(&DiscoveryMessage::EndpointAnnounce(endpoint))
            .await?;
    }

    info!("Registered participant {} (domain {})", guid_prefix, domain_id);
    Ok(())
}

async fn register_endpoint(
    conn: &mut ClientConnection,
    endpoint: EndpointAnnounce,
    shared: &Shared,
) -> Result<(), ServerError> {
    let Some(guid_prefix) = conn.guid_prefix() else {
        warn!("Endpoint announce before participant registration");
        conn.send_message(&DiscoveryMessage::Error {
            code: error_code::NOT_REGISTERED,
            message: "Register participant first".into(),
        })
        .await?;
        return Ok(());
    };

    if endpoint.guid_prefix != guid_prefix {
        return Err(ServerError::Protocol(format!(
            "Endpoint {} announced on connection of {}",
            endpoint.guid_prefix, guid_prefix
        )));
    }

    let domain_id = {
        let mut reg = shared.registry.write().await;
        if !reg.add_endpoint(endpoint.clone()) {
            // Lease expired between announce and endpoint.
            warn!("Endpoint from expired participant {}", guid_prefix);
            return Ok(());
        }
        reg.get_participant(&guid_prefix)
            .map(|p| p.domain_id())
            .unwrap_or_default()
    };

    debug!(
        "Registered {} {} on '{}'",
        if endpoint.is_writer { "writer" } else { "reader" },
        endpoint.entity_id,
        endpoint.topic_name
    );

    shared.router.read().await.broadcast(
        DiscoveryMessage::EndpointAnnounce(endpoint),
        domain_id,
        Some(&guid_prefix),
    );

    Ok(())
}

/// Server error types.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Bind error on {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },

    #[error("Server already running")]
    AlreadyRunning,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error(transparent)]
    Connection(#[from] ConnectionError),
}
