// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Participant and endpoint identifiers.
//!
//! Both travel as lowercase hex strings on the wire so the JSON stays
//! readable in packet captures.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicU16, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

/// HDDS vendor id, first two bytes of every generated prefix.
const VENDOR_ID: [u8; 2] = [0x01, 0xaa];

static INSTANCE_COUNTER: AtomicU16 = AtomicU16::new(1);

/// GUID prefix (12 bytes) - unique participant identifier.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct GuidPrefix(pub [u8; 12]);

/// Entity ID (4 bytes) - unique endpoint identifier within a participant.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EntityId(pub [u8; 4]);

/// Full GUID = GuidPrefix + EntityId.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Guid {
    pub prefix: GuidPrefix,
    pub entity_id: EntityId,
}

impl EntityId {
    /// User-defined writer with key-less topic (RTPS kind 0x02).
    pub const fn writer(index: u16) -> Self {
        let [hi, lo] = index.to_be_bytes();
        Self([0x00, hi, lo, 0x02])
    }

    /// User-defined reader with key-less topic (RTPS kind 0x07).
    pub const fn reader(index: u16) -> Self {
        let [hi, lo] = index.to_be_bytes();
        Self([0x00, hi, lo, 0x07])
    }
}

impl GuidPrefix {
    /// Generate a prefix unique to this process and call.
    ///
    /// Layout: vendor (2) | host (4) | pid (4) | instance (2).
    pub fn generate() -> Self {
        let host = host_id();
        let pid = std::process::id().to_be_bytes();
        let instance = INSTANCE_COUNTER.fetch_add(1, Ordering::Relaxed).to_be_bytes();

        Self([
            VENDOR_ID[0],
            VENDOR_ID[1],
            host[0],
            host[1],
            host[2],
            host[3],
            pid[0],
            pid[1],
            pid[2],
            pid[3],
            instance[0],
            instance[1],
        ])
    }
}

/// Time-derived host id; good enough to separate hosts sharing a server.
fn host_id() -> [u8; 4] {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.subsec_nanos() ^ (d.as_secs() as u32))
        .unwrap_or(0);
    nanos.to_be_bytes()
}

/// Invalid hex identifier.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("expected {expected} hex-encoded bytes, got {input:?}")]
pub struct ParseIdError {
    expected: usize,
    input: String,
}

fn decode_hex<const N: usize>(s: &str) -> Result<[u8; N], ParseIdError> {
    let err = || ParseIdError {
        expected: N,
        input: s.to_string(),
    };

    if s.len() != N * 2 || !s.is_ascii() {
        return Err(err());
    }

    let mut out = [0u8; N];
    for (i, byte) in out.iter_mut().enumerate() {
        *byte = u8::from_str_radix(&s[i * 2..i * 2 + 2], 16).map_err(|_| err())?;
    }
    Ok(out)
}

fn write_hex(f: &mut fmt::Formatter<'_>, bytes: &[u8]) -> fmt::Result {
    for b in bytes {
        write!(f, "{:02x}", b)?;
    }
    Ok(())
}

macro_rules! hex_id {
    ($ty:ident, $len:expr) => {
        impl fmt::Display for $ty {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write_hex(f, &self.0)
            }
        }

        impl fmt::Debug for $ty {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}(", stringify!($ty))?;
                write_hex(f, &self.0)?;
                write!(f, ")")
            }
        }

        impl FromStr for $ty {
            type Err = ParseIdError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                decode_hex::<$len>(s).map(Self)
            }
        }

        impl Serialize for $ty {
            fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                serializer.collect_str(self)
            }
        }

        impl<'de> Deserialize<'de> for $ty {
            fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
                let s = String::deserialize(deserializer)?;
                s.parse().map_err(serde::de::Error::custom)
            }
        }
    };
}

hex_id!(GuidPrefix, 12);
hex_id!(EntityId, 4);

impl fmt::Display for Guid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.prefix, self.entity_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_guid_prefix_hex_format() {
        let gp = GuidPrefix([1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12]);
        assert_eq!(gp.to_string(), "0102030405060708090a0b0c");
        assert_eq!("0102030405060708090a0b0c".parse::<GuidPrefix>().unwrap(), gp);
    }

    #[test]
    fn test_guid_prefix_rejects_bad_length() {
        assert!("0102".parse::<GuidPrefix>().is_err());
        assert!("zz02030405060708090a0b0c".parse::<GuidPrefix>().is_err());
        assert!("00000001c".parse::<EntityId>().is_err());
    }

    #[test]
    fn test_guid_prefix_serde_is_string() {
        let gp = GuidPrefix([0xaa; 12]);
        let json = serde_json::to_string(&gp).unwrap();
        assert_eq!(json, "\"aaaaaaaaaaaaaaaaaaaaaaaa\"");

        let err = serde_json::from_str::<GuidPrefix>("\"abc\"");
        assert!(err.is_err());
    }

    #[test]
    fn test_generate_is_unique_within_process() {
        let a = GuidPrefix::generate();
        let b = GuidPrefix::generate();
        assert_ne!(a, b);
        assert_eq!(&a.0[..2], &VENDOR_ID);
        assert_eq!(&a.0[6..10], &std::process::id().to_be_bytes());
    }

    #[test]
    fn test_guid_display() {
        let guid = Guid {
            prefix: GuidPrefix([0xab; 12]),
            entity_id: EntityId::writer(1),
        };
        assert_eq!(guid.to_string(), "abababababababababababab.00000102");
    }

    #[test]
    fn test_entity_kinds() {
        assert_eq!(EntityId::writer(1).0, [0x00, 0x00, 0x01, 0x02]);
        assert_eq!(EntityId::reader(0x0102).0, [0x00, 0x01, 0x02, 0x07]);
    }
}
