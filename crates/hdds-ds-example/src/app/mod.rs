// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Role applications.
//!
//! Each role (publisher, subscriber, discovery server) is a long-running
//! application with the same shape: built from its configuration, driven by
//! a blocking [`RoleApplication::run`] on a worker thread, and stopped from
//! any other thread.

mod lifecycle;
pub mod publisher;
pub mod sample;
pub mod server;
pub mod subscriber;

pub use lifecycle::{Lifecycle, RunState, StopKind};
pub use publisher::PublisherApp;
pub use server::ServerApp;
pub use subscriber::SubscriberApp;

use crate::config::{ConfigError, RoleConfig};
use crate::discovery::{
    ClientError, DiscoveryClient, EndpointAnnounce, EntityId, GuidPrefix, ServerError,
};
use sample::HELLO_WORLD_TYPE;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;

/// Role selected at startup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    Publisher,
    Subscriber,
    Server,
}

impl Role {
    /// Human-readable name, also used as the log category.
    pub fn name(self) -> &'static str {
        match self {
            Self::Publisher => "Publisher",
            Self::Subscriber => "Subscriber",
            Self::Server => "Discovery Server",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Common contract of the role applications.
///
/// `stop` and `graceful_shutdown` may be called from any thread, at any time,
/// any number of times; only the first call has an effect.
pub trait RoleApplication: Send + Sync {
    fn role(&self) -> Role;

    /// Do the role's work. Blocks until the work completes or a stop request
    /// is observed.
    fn run(&self);

    /// Make `run` return as soon as possible.
    fn stop(&self);

    /// Stop producing new work, finish what is in flight, then return from
    /// `run`. Roles without in-flight work treat this as [`stop`](Self::stop).
    fn graceful_shutdown(&self) {
        self.stop();
    }

    fn state(&self) -> RunState;
}

/// Errors raised while constructing a role application.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("Invalid configuration: {0}")]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Server(#[from] ServerError),

    #[error(transparent)]
    Client(#[from] ClientError),

    #[error("Failed to create runtime: {0}")]
    Runtime(#[source] std::io::Error),
}

/// Build the application for the configured role.
pub fn create(config: RoleConfig) -> Result<Arc<dyn RoleApplication>, AppError> {
    let app: Arc<dyn RoleApplication> = match config {
        RoleConfig::Publisher(c) => Arc::new(PublisherApp::new(c)?),
        RoleConfig::Subscriber(c) => Arc::new(SubscriberApp::new(c)?),
        RoleConfig::Server(c) => Arc::new(ServerApp::new(c)?),
    };
    Ok(app)
}

/// Connect to the discovery server and announce the participant together
/// with its single HelloWorld endpoint.
fn join_topic(
    client: &mut DiscoveryClient,
    role: Role,
    entity_id: EntityId,
    is_writer: bool,
    reliable: bool,
) -> Result<EndpointAnnounce, ClientError> {
    client.connect()?;
    client.announce_participant(Some(role.name().to_string()))?;
    client.announce_endpoint(entity_id, HELLO_WORLD_TYPE, is_writer, reliable)
}

/// Remote endpoints matched with the local one, grouped by participant.
#[derive(Debug, Default)]
struct RemoteMatches {
    by_participant: HashMap<GuidPrefix, HashSet<EntityId>>,
}

impl RemoteMatches {
    /// Returns `true` if `endpoint` is a new match for `local`.
    fn add(&mut self, local: &EndpointAnnounce, endpoint: &EndpointAnnounce) -> bool {
        if endpoint.guid_prefix == local.guid_prefix || !local.matches(endpoint) {
            return false;
        }
        self.by_participant
            .entry(endpoint.guid_prefix)
            .or_default()
            .insert(endpoint.entity_id)
    }

    /// Forget a participant. Returns the number of endpoints dropped.
    fn remove_participant(&mut self, guid_prefix: &GuidPrefix) -> usize {
        self.by_participant
            .remove(guid_prefix)
            .map_or(0, |endpoints| endpoints.len())
    }

    fn participants(&self) -> impl Iterator<Item = GuidPrefix> + '_ {
        self.by_participant.keys().copied()
    }

    fn len(&self) -> usize {
        self.by_participant.values().map(HashSet::len).sum()
    }

    fn is_empty(&self) -> bool {
        self.by_participant.is_empty()
    }

    fn clear(&mut self) {
        self.by_participant.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{PublisherConfig, SubscriberConfig};

    #[test]
    fn test_role_names() {
        assert_eq!(Role::Publisher.name(), "Publisher");
        assert_eq!(Role::Subscriber.name(), "Subscriber");
        assert_eq!(Role::Server.to_string(), "Discovery Server");
    }

    #[test]
    fn test_create_rejects_invalid_domain() {
        let mut config = SubscriberConfig::default();
        config.client.domain_id = 1000;

        let err = create(RoleConfig::Subscriber(config)).err().unwrap();
        assert!(matches!(err, AppError::Config(_)));
    }

    fn endpoint(prefix: u8, entity: u16, is_writer: bool, topic: &str) -> EndpointAnnounce {
        EndpointAnnounce {
            guid_prefix: GuidPrefix([prefix; 12]),
            entity_id: if is_writer {
                EntityId::writer(entity)
            } else {
                EntityId::reader(entity)
            },
            topic_name: topic.into(),
            type_name: HELLO_WORLD_TYPE.into(),
            is_writer,
            reliable: false,
        }
    }

    #[test]
    fn test_remote_matches() {
        let local = endpoint(1, 1, true, "t");
        let mut matches = RemoteMatches::default();

        assert!(matches.add(&local, &endpoint(2, 1, false, "t")));
        assert!(matches.add(&local, &endpoint(2, 2, false, "t")));
        assert!(!matches.add(&local, &endpoint(2, 2, false, "t")));
        assert!(matches.add(&local, &endpoint(3, 1, false, "t")));
        assert_eq!(matches.len(), 3);
        assert_eq!(matches.participants().count(), 2);

        // Writers, other topics and our own participant never match.
        assert!(!matches.add(&local, &endpoint(4, 1, true, "t")));
        assert!(!matches.add(&local, &endpoint(4, 1, false, "other")));
        assert!(!matches.add(&local, &endpoint(1, 9, false, "t")));

        assert_eq!(matches.remove_participant(&GuidPrefix([2; 12])), 2);
        assert_eq!(matches.remove_participant(&GuidPrefix([2; 12])), 0);
        assert_eq!(matches.len(), 1);

        matches.clear();
        assert!(matches.is_empty());
    }

    #[test]
    fn test_create_publisher() {
        let app = create(RoleConfig::Publisher(PublisherConfig::default())).unwrap();
        assert_eq!(app.role(), Role::Publisher);
        assert_eq!(app.state(), RunState::Constructed);
    }
}
