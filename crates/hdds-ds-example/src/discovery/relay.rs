// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Outbound routing between connected participants.
//!
//! Every registered connection owns an mpsc queue drained by its handler
//! task. The router pushes discovery broadcasts and, in relay mode, user
//! DATA addressed to a GUID prefix.

use super::guid::GuidPrefix;
use super::protocol::DiscoveryMessage;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{mpsc, Notify};

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RelayStats {
    pub messages_relayed: u64,
    pub bytes_relayed: u64,
    /// Unknown or cross-domain destination, queue full or queue closed.
    pub relay_errors: u64,
}

/// Outbound side of one client connection.
///
/// Clones refer to the same connection. [`evict`](Self::evict) wakes the
/// handler waiting in [`evicted`](Self::evicted), even if it is not waiting
/// yet.
#[derive(Clone)]
pub struct Route {
    tx: mpsc::Sender<DiscoveryMessage>,
    evict: Arc<Notify>,
}

impl Route {
    pub fn new(tx: mpsc::Sender<DiscoveryMessage>) -> Self {
        Self {
            tx,
            evict: Arc::new(Notify::new()),
        }
    }

    pub fn same_connection(&self, other: &Route) -> bool {
        self.tx.same_channel(&other.tx)
    }

    /// Ask the owning connection handler to close.
    pub fn evict(&self) {
        self.evict.notify_one();
    }

    /// Resolves once [`evict`](Self::evict) has been called.
    pub async fn evicted(&self) {
        self.evict.notified().await;
    }
}

struct RouteEntry {
    domain_id: u32,
    route: Route,
}

/// Client queues indexed by GUID prefix.
#[derive(Default)]
pub struct RelayRouter {
    routes: HashMap<GuidPrefix, RouteEntry>,
    stats: RelayStats,
}

impl RelayRouter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Route `guid_prefix` to `route`. Returns the route it replaced, if any.
    pub fn register(
        &mut self,
        guid_prefix: GuidPrefix,
        domain_id: u32,
        route: Route,
    ) -> Option<Route> {
        self.routes
            .insert(guid_prefix, RouteEntry { domain_id, route })
            .map(|entry| entry.route)
    }

    pub fn unregister(&mut self, guid_prefix: &GuidPrefix) -> Option<Route> {
        self.routes.remove(guid_prefix).map(|entry| entry.route)
    }

    /// Unregister `guid_prefix` only if it is still routed to `route`.
    pub fn unregister_connection(&mut self, guid_prefix: &GuidPrefix, route: &Route) -> bool {
        if !self.is_routed_to(guid_prefix, route) {
            return false;
        }
        self.routes.remove(guid_prefix);
        true
    }

    pub fn is_routed_to(&self, guid_prefix: &GuidPrefix, route: &Route) -> bool {
        self.routes
            .get(guid_prefix)
            .is_some_and(|entry| entry.route.same_connection(route))
    }

    pub fn is_connected(&self, guid_prefix: &GuidPrefix) -> bool {
        self.routes.contains_key(guid_prefix)
    }

    /// Forward a DATA payload to `destination`, stamping the source.
    ///
    /// Returns `Ok(true)` if queued, `Ok(false)` if the destination is unknown.
    /// Source and destination must share a domain.
    pub fn relay_data(
        &mut self,
        destination: GuidPrefix,
        source: GuidPrefix,
        payload: Vec<u8>,
    ) -> Result<bool, RelayError> {
        let Some(entry) = self.routes.get(&destination) else {
            self.stats.relay_errors += 1;
            return Ok(false);
        };

        let source_domain = self.routes.get(&source).map(|s| s.domain_id);
        if source_domain != Some(entry.domain_id) {
            self.stats.relay_errors += 1;
            return Err(RelayError::CrossDomain {
                from: source,
                to: destination,
            });
        }

        let len = payload.len() as u64;
        let msg = DiscoveryMessage::Data {
            destination,
            source: Some(source),
            payload,
        };

        match entry.route.tx.try_send(msg) {
            Ok(()) => {
                self.stats.messages_relayed += 1;
                self.stats.bytes_relayed += len;
                Ok(true)
            }
            Err(mpsc::error::TrySendError::Full(_)) => {
                self.stats.relay_errors += 1;
                Err(RelayError::QueueFull(destination))
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                self.stats.relay_errors += 1;
                Err(RelayError::SendFailed(destination))
            }
        }
    }

    /// Send `msg` to every participant of `domain_id` except `exclude`.
    ///
    /// Never waits on a slow peer; returns the number of queues that
    /// accepted the message.
    pub fn broadcast(
        &self,
        msg: DiscoveryMessage,
        domain_id: u32,
        exclude: Option<&GuidPrefix>,
    ) -> usize {
        let mut sent = 0;
        for (guid_prefix, entry) in &self.routes {
            if entry.domain_id != domain_id || exclude == Some(guid_prefix) {
                continue;
            }
            if entry.route.tx.try_send(msg.clone()).is_ok() {
                sent += 1;
            }
        }
        sent
    }

    pub fn stats(&self) -> &RelayStats {
        &self.stats
    }

    pub fn connection_count(&self) -> usize {
        self.routes.len()
    }
}

#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    #[error("Failed to send message to {0}")]
    SendFailed(GuidPrefix),

    #[error("Outbound queue full for {0}")]
    QueueFull(GuidPrefix),

    #[error("{from} and {to} are not in the same domain")]
    CrossDomain { from: GuidPrefix, to: GuidPrefix },
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gp(b: u8) -> GuidPrefix {
        GuidPrefix([b; 12])
    }

    fn route() -> (Route, mpsc::Receiver<DiscoveryMessage>) {
        let (tx, rx) = mpsc::channel(10);
        (Route::new(tx), rx)
    }

    #[test]
    fn test_register_unregister() {
        let mut router = RelayRouter::new();
        let (r1, _rx) = route();

        assert!(router.register(gp(1), 0, r1).is_none());
        assert!(router.is_connected(&gp(1)));
        assert_eq!(router.connection_count(), 1);

        assert!(router.unregister(&gp(1)).is_some());
        assert!(!router.is_connected(&gp(1)));
        assert_eq!(router.connection_count(), 0);
    }

    #[test]
    fn test_stale_connection_cannot_unregister_successor() {
        let mut router = RelayRouter::new();
        let (old, _old_rx) = route();
        let (new, _new_rx) = route();

        router.register(gp(1), 0, old.clone());
        let replaced = router.register(gp(1), 0, new.clone()).unwrap();
        assert!(replaced.same_connection(&old));
        assert!(!replaced.same_connection(&new));

        assert!(!router.unregister_connection(&gp(1), &old));
        assert!(router.is_routed_to(&gp(1), &new));

        assert!(router.unregister_connection(&gp(1), &new));
        assert!(!router.is_connected(&gp(1)));
    }

    #[tokio::test]
    async fn test_evict_wakes_later_waiter() {
        let (r, _rx) = route();
        r.clone().evict();
        tokio::time::timeout(std::time::Duration::from_secs(1), r.evicted())
            .await
            .expect("eviction lost");
    }

    #[test]
    fn test_relay_data_destination_not_found() {
        let mut router = RelayRouter::new();

        let (r2, _rx) = route();
        router.register(gp(2), 0, r2);

        let result = router.relay_data(gp(1), gp(2), vec![1, 2, 3]);
        assert!(!result.unwrap());
        assert_eq!(router.stats().relay_errors, 1);
    }

    #[test]
    fn test_relay_data_stamps_source() {
        let mut router = RelayRouter::new();
        let (r1, mut rx) = route();
        let (r2, _rx2) = route();
        router.register(gp(1), 0, r1);
        router.register(gp(2), 0, r2);

        assert!(router.relay_data(gp(1), gp(2), vec![0xde, 0xad]).unwrap());

        assert_eq!(
            rx.try_recv().unwrap(),
            DiscoveryMessage::Data {
                destination: gp(1),
                source: Some(gp(2)),
                payload: vec![0xde, 0xad],
            }
        );
        assert_eq!(router.stats().messages_relayed, 1);
        assert_eq!(router.stats().bytes_relayed, 2);
    }

    #[test]
    fn test_relay_data_queue_full() {
        let mut router = RelayRouter::new();
        let (tx, _rx) = mpsc::channel(1);
        let (r2, _rx2) = route();
        router.register(gp(1), 0, Route::new(tx));
        router.register(gp(2), 0, r2);

        assert!(router.relay_data(gp(1), gp(2), vec![1]).unwrap());
        assert!(matches!(
            router.relay_data(gp(1), gp(2), vec![2]),
            Err(RelayError::QueueFull(_))
        ));
    }

    #[test]
    fn test_broadcast_scoped_to_domain() {
        let mut router = RelayRouter::new();
        let (r1, mut rx1) = route();
        let (r2, mut rx2) = route();
        let (r3, mut rx3) = route();
        router.register(gp(1), 0, r1);
        router.register(gp(2), 0, r2);
        router.register(gp(3), 7, r3);

        let msg = DiscoveryMessage::ParticipantLeave { guid_prefix: gp(1) };
        let sent = router.broadcast(msg, 0, Some(&gp(1)));

        assert_eq!(sent, 1);
        assert!(rx1.try_recv().is_err());
        assert!(rx2.try_recv().is_ok());
        assert!(rx3.try_recv().is_err());
    }

    #[test]
    fn test_relay_data_rejects_cross_domain() {
        let mut router = RelayRouter::new();
        let (r1, mut rx1) = route();
        let (r2, _rx2) = route();
        router.register(gp(1), 1, r1);
        router.register(gp(2), 2, r2);

        assert!(matches!(
            router.relay_data(gp(1), gp(2), vec![1]),
            Err(RelayError::CrossDomain { .. })
        ));
        assert!(rx1.try_recv().is_err());
        assert_eq!(router.stats().relay_errors, 1);
        assert_eq!(router.stats().messages_relayed, 0);
    }
}
