// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Server-side client connection handling.

use super::guid::GuidPrefix;
use super::protocol::{DiscoveryMessage, FrameBuffer, ProtocolError};
use std::net::SocketAddr;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

const READ_CHUNK_LEN: usize = 8 * 1024;

/// A connected client.
pub struct ClientConnection {
    stream: TcpStream,
    peer_addr: SocketAddr,
    max_message_size: usize,
    guid_prefix: Option<GuidPrefix>,
    frames: FrameBuffer,
    read_chunk: Box<[u8]>,
}

impl ClientConnection {
    pub fn new(stream: TcpStream, peer_addr: SocketAddr, max_message_size: usize) -> Self {
        Self {
            stream,
            peer_addr,
            max_message_size,
            guid_prefix: None,
            frames: FrameBuffer::new(max_message_size),
            read_chunk: vec![0u8; READ_CHUNK_LEN].into_boxed_slice(),
        }
    }

    pub fn peer_addr(&self) -> SocketAddr {
        self.peer_addr
    }

    /// Registered GUID prefix, once the participant announced itself.
    pub fn guid_prefix(&self) -> Option<GuidPrefix> {
        self.guid_prefix
    }

    pub fn set_guid_prefix(&mut self, guid_prefix: GuidPrefix) {
        self.guid_prefix = Some(guid_prefix);
    }

    /// Read a message from the client.
    ///
    /// Returns `Ok(None)` if the connection is closed gracefully. Cancel-safe:
    /// bytes already received stay buffered, so this can sit in a `select!`
    /// next to the outbound queue.
    pub async fn read_message(&mut self) -> Result<Option<DiscoveryMessage>, ConnectionError> {
        loop {
            if let Some(msg) = self.frames.next_message()? {
                return Ok(Some(msg));
            }

            let n = self.stream.read(&mut self.read_chunk).await?;
            if n == 0 {
                if self.frames.pending() > 0 {
                    return Err(ConnectionError::Io(std::io::ErrorKind::UnexpectedEof.into()));
                }
                return Ok(None);
            }
            self.frames.extend(&self.read_chunk[..n]);
        }
    }

    pub async fn send_message(&mut self, msg: &DiscoveryMessage) -> Result<(), ConnectionError> {
        let frame = msg.encode(self.max_message_size)?;
        self.stream.write_all(&frame).await?;
        self.stream.flush().await?;
        Ok(())
    }

    pub async fn shutdown(&mut self) -> Result<(), ConnectionError> {
        self.stream.shutdown().await?;
        Ok(())
    }
}

/// Connection error types.
#[derive(Debug, thiserror::Error)]
pub enum ConnectionError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    async fn pair() -> (ClientConnection, TcpStream) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let client = TcpStream::connect(addr).await.unwrap();
        let (server, peer) = listener.accept().await.unwrap();
        (ClientConnection::new(server, peer, 1024), client)
    }

    #[tokio::test]
    async fn test_read_framed_message() {
        let (mut conn, mut client) = pair().await;
        let msg = DiscoveryMessage::Heartbeat {
            guid_prefix: GuidPrefix([7; 12]),
        };
        client.write_all(&msg.encode(1024).unwrap()).await.unwrap();

        assert_eq!(conn.read_message().await.unwrap(), Some(msg));
    }

    #[tokio::test]
    async fn test_closed_connection_returns_none() {
        let (mut conn, client) = pair().await;
        drop(client);

        assert!(conn.read_message().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_oversized_frame_is_rejected() {
        let (mut conn, mut client) = pair().await;
        client.write_all(&4096u32.to_be_bytes()).await.unwrap();

        let err = conn.read_message().await.unwrap_err();
        assert!(err.to_string().contains("Protocol"));
    }

    #[test]
    fn test_connection_error_display() {
        let err = ConnectionError::Io(std::io::Error::other("test"));
        assert!(err.to_string().contains("I/O"));

        let err = ConnectionError::Protocol(ProtocolError::EmptyMessage);
        assert!(err.to_string().contains("Protocol"));
    }
}
