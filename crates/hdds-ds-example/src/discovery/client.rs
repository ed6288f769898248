// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Discovery Server client.
//!
//! Blocking TCP client used by the publisher and subscriber roles. Reads use
//! a short timeout so the owning run loop can interleave polling, heartbeats
//! and writes on a single thread.

use super::guid::{EntityId, GuidPrefix};
use super::protocol::{
    error_code, DiscoveryMessage, EndpointAnnounce, FrameBuffer, ParticipantAnnounce,
    ProtocolError,
};
use crate::config::ClientConfig;
use std::io::{self, Read, Write};
use std::net::{Shutdown, SocketAddr, TcpStream};
use std::time::{Duration, Instant};

/// Events received from the discovery server.
#[derive(Debug, Clone, PartialEq)]
pub enum ClientEvent {
    /// Server acknowledged our participant registration.
    ParticipantAcknowledged,

    ParticipantDiscovered(ParticipantAnnounce),

    ParticipantLeft { guid_prefix: GuidPrefix },

    EndpointDiscovered(EndpointAnnounce),

    /// Relayed user data.
    Data {
        source: Option<GuidPrefix>,
        payload: Vec<u8>,
    },

    Error { code: u32, message: String },
}

impl From<DiscoveryMessage> for ClientEvent {
    fn from(msg: DiscoveryMessage) -> Self {
        match msg {
            DiscoveryMessage::ParticipantAck { .. } => Self::ParticipantAcknowledged,
            DiscoveryMessage::ParticipantAnnounce(p) => Self::ParticipantDiscovered(p),
            DiscoveryMessage::ParticipantLeave { guid_prefix } => {
                Self::ParticipantLeft { guid_prefix }
            }
            DiscoveryMessage::EndpointAnnounce(e) => Self::EndpointDiscovered(e),
            DiscoveryMessage::Data {
                source, payload, ..
            } => Self::Data { source, payload },
            DiscoveryMessage::Error { code, message } => Self::Error { code, message },
            // Servers never send heartbeats; surface it instead of dropping silently.
            DiscoveryMessage::Heartbeat { guid_prefix } => Self::Error {
                code: 0,
                message: format!("unexpected heartbeat for {}", guid_prefix),
            },
        }
    }
}

impl ClientEvent {
    /// The server dropped this participant; it has to announce again.
    pub fn requires_rejoin(&self) -> bool {
        matches!(
            self,
            Self::Error { code, .. }
                if *code == error_code::NOT_REGISTERED || *code == error_code::EVICTED
        )
    }
}

/// Client error types.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("Connection to {addr} failed: {source}")]
    ConnectionFailed {
        addr: SocketAddr,
        #[source]
        source: io::Error,
    },

    #[error("Connection closed")]
    ConnectionClosed,

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("Not connected to server")]
    NotConnected,
}

/// Discovery server client for one participant.
pub struct DiscoveryClient {
    config: ClientConfig,
    guid_prefix: GuidPrefix,
    stream: Option<TcpStream>,
    frames: FrameBuffer,
    last_heartbeat: Option<Instant>,
}

impl DiscoveryClient {
    pub fn new(config: ClientConfig, guid_prefix: GuidPrefix) -> Self {
        let frames = FrameBuffer::new(config.max_message_size);
        Self {
            config,
            guid_prefix,
            stream: None,
            frames,
            last_heartbeat: None,
        }
    }

    pub fn connect(&mut self) -> Result<(), ClientError> {
        let addr = self.config.server_address;
        let stream = TcpStream::connect_timeout(&addr, self.config.connect_timeout)
            .map_err(|source| ClientError::ConnectionFailed { addr, source })?;

        stream.set_nodelay(true).ok();
        stream.set_read_timeout(Some(self.config.poll_interval))?;
        stream.set_write_timeout(Some(self.config.connect_timeout))?;

        self.frames.clear();
        self.stream = Some(stream);
        self.last_heartbeat = Some(Instant::now());
        Ok(())
    }

    pub fn is_connected(&self) -> bool {
        self.stream.is_some()
    }

    pub fn guid_prefix(&self) -> GuidPrefix {
        self.guid_prefix
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn announce_participant(&mut self, name: Option<String>) -> Result<(), ClientError> {
        let msg = DiscoveryMessage::ParticipantAnnounce(ParticipantAnnounce {
            guid_prefix: self.guid_prefix,
            domain_id: self.config.domain_id,
            name,
        });
        self.send(&msg)
    }

    /// Announce a writer or reader on the configured topic.
    pub fn announce_endpoint(
        &mut self,
        entity_id: EntityId,
        type_name: &str,
        is_writer: bool,
        reliable: bool,
    ) -> Result<EndpointAnnounce, ClientError> {
        let endpoint = EndpointAnnounce {
            guid_prefix: self.guid_prefix,
            entity_id,
            topic_name: self.config.topic_name.clone(),
            type_name: type_name.to_string(),
            is_writer,
            reliable,
        };
        self.send(&DiscoveryMessage::EndpointAnnounce(endpoint.clone()))?;
        Ok(endpoint)
    }

    pub fn send_heartbeat(&mut self) -> Result<(), ClientError> {
        self.send(&DiscoveryMessage::Heartbeat {
            guid_prefix: self.guid_prefix,
        })?;
        self.last_heartbeat = Some(Instant::now());
        Ok(())
    }

    /// Send a heartbeat if the interval elapsed.
    pub fn heartbeat_if_due(&mut self) -> Result<(), ClientError> {
        if self.heartbeat_due() {
            self.send_heartbeat()?;
        }
        Ok(())
    }

    pub fn heartbeat_due(&self) -> bool {
        self.last_heartbeat
            .is_some_and(|last| last.elapsed() >= self.config.heartbeat_interval)
    }

    pub fn send_data(&mut self, destination: GuidPrefix, payload: Vec<u8>) -> Result<(), ClientError> {
        self.send(&DiscoveryMessage::Data {
            destination,
            source: None,
            payload,
        })
    }

    /// Announce departure and close the connection.
    ///
    /// Waits up to `linger` for the server to close its side, so everything
    /// sent before the leave has been consumed when this returns.
    pub fn leave(&mut self, linger: Duration) -> Result<(), ClientError> {
        let result = self.send(&DiscoveryMessage::ParticipantLeave {
            guid_prefix: self.guid_prefix,
        });

        if let Some(stream) = self.stream.as_mut() {
            if stream.shutdown(Shutdown::Write).is_ok() {
                let deadline = Instant::now() + linger;
                let mut sink = [0u8; 1024];
                while Instant::now() < deadline {
                    match stream.read(&mut sink) {
                        Ok(0) => break,
                        Ok(_) => {}
                        Err(e) if is_timeout(&e) => {}
                        Err(_) => break,
                    }
                }
            }
        }

        self.disconnect();
        result
    }

    pub fn disconnect(&mut self) {
        self.stream = None;
        self.last_heartbeat = None;
        self.frames.clear();
    }

    /// Wait up to the poll interval for the next event.
    ///
    /// `Ok(None)` means nothing arrived in time. A closed connection is an
    /// error and leaves the client disconnected.
    pub fn poll_event(&mut self) -> Result<Option<ClientEvent>, ClientError> {
        if let Some(msg) = self.frames.next_message()? {
            return Ok(Some(msg.into()));
        }

        let stream = self.stream.as_mut().ok_or(ClientError::NotConnected)?;
        let mut chunk = [0u8; 4096];
        match stream.read(&mut chunk) {
            Ok(0) => {
                self.disconnect();
                Err(ClientError::ConnectionClosed)
            }
            Ok(n) => {
                self.frames.extend(&chunk[..n]);
                Ok(self.frames.next_message()?.map(ClientEvent::from))
            }
            Err(e) if is_timeout(&e) => Ok(None),
            Err(e) => {
                self.disconnect();
                Err(e.into())
            }
        }
    }

    fn send(&mut self, msg: &DiscoveryMessage) -> Result<(), ClientError> {
        let frame = msg.encode(self.config.max_message_size)?;
        let stream = self.stream.as_mut().ok_or(ClientError::NotConnected)?;

        if let Err(e) = stream.write_all(&frame).and_then(|()| stream.flush()) {
            self.disconnect();
            return Err(e.into());
        }
        Ok(())
    }
}

/// Read timeouts surface as `WouldBlock` on unix and `TimedOut` on Windows.
fn is_timeout(e: &io::Error) -> bool {
    matches!(
        e.kind(),
        io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut | io::ErrorKind::Interrupted
    )
}
