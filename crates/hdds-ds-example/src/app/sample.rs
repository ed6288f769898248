// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! HelloWorld sample exchanged by the publisher and subscriber.

use serde::{Deserialize, Serialize};

/// Type name announced for both endpoints; readers and writers match on it.
pub const HELLO_WORLD_TYPE: &str = "HelloWorld";

pub const HELLO_WORLD_MESSAGE: &str = "Hello world";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HelloWorld {
    pub index: u32,
    pub message: String,
}

impl HelloWorld {
    pub fn new(index: u32) -> Self {
        Self {
            index,
            message: HELLO_WORLD_MESSAGE.to_string(),
        }
    }

    pub fn to_payload(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }

    pub fn from_payload(payload: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(payload)
    }
}

impl std::fmt::Display for HelloWorld {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Message: '{}' with index: {}", self.message, self.index)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display() {
        assert_eq!(
            HelloWorld::new(3).to_string(),
            "Message: 'Hello world' with index: 3"
        );
    }

    #[test]
    fn test_payload_is_json() {
        let payload = HelloWorld::new(7).to_payload().unwrap();
        let text = std::str::from_utf8(&payload).unwrap();
        assert!(text.contains("\"index\":7"));
        assert_eq!(HelloWorld::from_payload(&payload).unwrap(), HelloWorld::new(7));
    }

    #[test]
    fn test_garbage_payload_rejected() {
        assert!(HelloWorld::from_payload(b"not json").is_err());
    }
}
