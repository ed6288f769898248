// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Discovery Server and its client.
//!
//! A centralized alternative to multicast discovery: participants connect
//! over TCP, announce themselves and their endpoints, and learn about their
//! peers from the server. In relay mode the server also forwards user DATA,
//! which is how the example publisher reaches its subscribers.
//!
//! ```text
//!  Publisher ──┐                    ┌── Subscriber
//!              │  announce / data   │
//!              └──►  Discovery  ◄───┘
//!                     Server
//! ```

pub mod client;
pub mod connection;
pub mod guid;
pub mod protocol;
pub mod registry;
pub mod relay;
pub mod server;

pub use client::{ClientError, ClientEvent, DiscoveryClient};
pub use guid::{EntityId, Guid, GuidPrefix};
pub use protocol::{DiscoveryMessage, EndpointAnnounce, ParticipantAnnounce};
pub use server::{DiscoveryServer, ServerError};
