// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Discovery Server wire protocol.
//!
//! Simple length-prefixed JSON protocol shared by the server and the
//! publisher/subscriber clients. Not interoperable with other vendors'
//! discovery servers.
//!
//! Wire format:
//! ```text
//! +----------------+-------------------+
//! | Length (4B BE) | JSON payload      |
//! +----------------+-------------------+
//! ```

use super::guid::{EntityId, Guid, GuidPrefix};
use serde::{Deserialize, Serialize};

/// Size of the big-endian length prefix.
pub const FRAME_HEADER_LEN: usize = 4;

/// Default upper bound for a single frame body (16 MB).
pub const DEFAULT_MAX_MESSAGE_SIZE: usize = 16 * 1024 * 1024;

/// Error codes carried by [`DiscoveryMessage::Error`].
pub mod error_code {
    pub const MAX_PARTICIPANTS: u32 = 1;
    pub const NOT_REGISTERED: u32 = 2;
    pub const DOMAIN_MISMATCH: u32 = 3;
    /// Lease expired or the prefix re-registered on another connection.
    pub const EVICTED: u32 = 4;
}

/// Largest body a 4-byte length prefix can describe.
pub const MAX_FRAME_BODY: usize = u32::MAX as usize;

/// Discovery protocol message types.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DiscoveryMessage {
    /// Participant announces itself (client -> server, server -> clients).
    ParticipantAnnounce(ParticipantAnnounce),

    /// Server acknowledges participant registration.
    ParticipantAck { guid_prefix: GuidPrefix },

    /// Participant is leaving.
    ParticipantLeave { guid_prefix: GuidPrefix },

    /// Endpoint (writer/reader) announcement.
    EndpointAnnounce(EndpointAnnounce),

    /// Heartbeat to keep lease alive.
    Heartbeat { guid_prefix: GuidPrefix },

    Error { code: u32, message: String },

    /// Relayed user data. `source` is filled in by the server.
    Data {
        destination: GuidPrefix,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        source: Option<GuidPrefix>,
        payload: Vec<u8>,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParticipantAnnounce {
    pub guid_prefix: GuidPrefix,
    pub domain_id: u32,
    #[serde(default)]
    pub name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EndpointAnnounce {
    pub guid_prefix: GuidPrefix,
    pub entity_id: EntityId,
    pub topic_name: String,
    pub type_name: String,
    pub is_writer: bool,
    #[serde(default)]
    pub reliable: bool,
}

impl EndpointAnnounce {
    pub fn guid(&self) -> Guid {
        Guid {
            prefix: self.guid_prefix,
            entity_id: self.entity_id,
        }
    }

    /// A writer and a reader match when they share topic and type.
    pub fn matches(&self, other: &EndpointAnnounce) -> bool {
        self.is_writer != other.is_writer
            && self.topic_name == other.topic_name
            && self.type_name == other.type_name
    }
}

/// Protocol error types.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    #[error("Empty message")]
    EmptyMessage,

    #[error("Message too large: {size} > {max}")]
    TooLarge { size: usize, max: usize },

    #[error("Invalid message: {0}")]
    InvalidMessage(#[from] serde_json::Error),
}

impl DiscoveryMessage {
    /// Encode as a length-prefixed frame.
    pub fn encode(&self, max_message_size: usize) -> Result<Vec<u8>, ProtocolError> {
        let json = serde_json::to_vec(self)?;
        let max = max_message_size.min(MAX_FRAME_BODY);
        if json.len() > max {
            return Err(ProtocolError::TooLarge {
                size: json.len(),
                max,
            });
        }

        // Lossless: max never exceeds u32::MAX.
        let mut frame = Vec::with_capacity(FRAME_HEADER_LEN + json.len());
        frame.extend_from_slice(&(json.len() as u32).to_be_bytes());
        frame.extend_from_slice(&json);
        Ok(frame)
    }

    /// Decode a frame body (without the length prefix).
    pub fn decode(body: &[u8]) -> Result<Self, ProtocolError> {
        Ok(serde_json::from_slice(body)?)
    }
}

/// Validate a frame length read from the wire.
pub fn check_frame_len(len: usize, max_message_size: usize) -> Result<(), ProtocolError> {
    if len == 0 {
        return Err(ProtocolError::EmptyMessage);
    }
    if len > max_message_size {
        return Err(ProtocolError::TooLarge {
            size: len,
            max: max_message_size,
        });
    }
    Ok(())
}

/// Accumulates bytes from a stream and yields complete frames.
///
/// Used by the blocking client, where a read timeout can split a frame
/// across several `read` calls.
#[derive(Debug)]
pub struct FrameBuffer {
    buf: Vec<u8>,
    max_message_size: usize,
}

impl FrameBuffer {
    pub fn new(max_message_size: usize) -> Self {
        Self {
            buf: Vec::with_capacity(4096),
            max_message_size,
        }
    }

    pub fn extend(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    /// Pop the next complete message, if any.
    pub fn next_message(&mut self) -> Result<Option<DiscoveryMessage>, ProtocolError> {
        if self.buf.len() < FRAME_HEADER_LEN {
            return Ok(None);
        }

        let mut len_buf = [0u8; FRAME_HEADER_LEN];
        len_buf.copy_from_slice(&self.buf[..FRAME_HEADER_LEN]);
        let len = u32::from_be_bytes(len_buf) as usize;
        check_frame_len(len, self.max_message_size)?;

        let end = FRAME_HEADER_LEN + len;
        if self.buf.len() < end {
            return Ok(None);
        }

        let msg = DiscoveryMessage::decode(&self.buf[FRAME_HEADER_LEN..end]);
        self.buf.drain(..end);
        msg.map(Some)
    }

    pub fn clear(&mut self) {
        self.buf.clear();
    }

    pub fn pending(&self) -> usize {
        self.buf.len()
    }
}
