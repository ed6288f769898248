// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! HelloWorld subscriber.

use super::lifecycle::{Lifecycle, RunState, StopKind};
use super::sample::HelloWorld;
use super::{join_topic, AppError, RemoteMatches, Role, RoleApplication};
use crate::config::SubscriberConfig;
use crate::discovery::{ClientEvent, DiscoveryClient, EndpointAnnounce, EntityId, GuidPrefix};
use parking_lot::Mutex;
use std::collections::HashSet;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;
use tracing::{debug, info, warn};

const READER_ID: EntityId = EntityId::reader(1);

const LEAVE_LINGER: Duration = Duration::from_secs(1);

const CATEGORY: &str = "Subscriber";

/// Prints every HelloWorld sample relayed to its reader, optionally
/// returning after a fixed number of distinct samples.
pub struct SubscriberApp {
    config: SubscriberConfig,
    client: Mutex<DiscoveryClient>,
    lifecycle: Lifecycle,
    samples_received: AtomicU32,
}

impl SubscriberApp {
    pub fn new(config: SubscriberConfig) -> Result<Self, AppError> {
        config.validate()?;

        let guid_prefix = GuidPrefix::generate();
        info!(
            category = CATEGORY,
            "Participant {} on domain {}, topic '{}', server {}",
            guid_prefix,
            config.client.domain_id,
            config.client.topic_name,
            config.client.server_address
        );

        Ok(Self {
            client: Mutex::new(DiscoveryClient::new(config.client.clone(), guid_prefix)),
            config,
            lifecycle: Lifecycle::new(),
            samples_received: AtomicU32::new(0),
        })
    }

    pub fn samples_received(&self) -> u32 {
        self.samples_received.load(Ordering::SeqCst)
    }

    fn receive_loop(&self, client: &mut DiscoveryClient) {
        let mut reader: Option<EndpointAnnounce> = None;
        let mut writers = RemoteMatches::default();
        // (writer participant, index) of every sample counted so far.
        let mut seen: HashSet<(Option<GuidPrefix>, u32)> = HashSet::new();

        while !self.lifecycle.is_stop_requested() {
            let Some(local) = reader.as_ref().filter(|_| client.is_connected()) else {
                writers.clear();

                match join_topic(client, Role::Subscriber, READER_ID, false, false) {
                    Ok(endpoint) => {
                        info!(
                            category = CATEGORY,
                            "Reader {} announced on '{}'",
                            endpoint.guid(),
                            endpoint.topic_name
                        );
                        reader = Some(endpoint);
                    }
                    Err(e) => {
                        warn!(category = CATEGORY, "Discovery server unreachable: {}", e);
                        client.disconnect();
                        self.lifecycle
                            .wait_for_stop(client.config().reconnect_delay);
                    }
                }
                continue;
            };

            let event = match client.poll_event() {
                Ok(Some(event)) if event.requires_rejoin() => {
                    warn!(category = CATEGORY, "Registration lost: {:?}", event);
                    client.disconnect();
                    continue;
                }
                Ok(Some(event)) => event,
                Ok(None) => {
                    if let Err(e) = client.heartbeat_if_due() {
                        warn!(category = CATEGORY, "Heartbeat failed: {}", e);
                    }
                    continue;
                }
                Err(e) => {
                    warn!(category = CATEGORY, "Lost discovery server: {}", e);
                    client.disconnect();
                    continue;
                }
            };

            match event {
                ClientEvent::Data { source, payload } => match HelloWorld::from_payload(&payload) {
                    Ok(sample) if !seen.insert((source, sample.index)) => {
                        debug!(category = CATEGORY, "Duplicate sample {}", sample.index);
                    }
                    Ok(sample) => {
                        println!("{} RECEIVED", sample);
                        let total = self.samples_received.fetch_add(1, Ordering::SeqCst) + 1;
                        if self.config.samples > 0 && total >= self.config.samples {
                            info!(category = CATEGORY, "All {} samples received", total);
                            break;
                        }
                    }
                    Err(e) => warn!(category = CATEGORY, "Discarding malformed sample: {}", e),
                },
                ClientEvent::EndpointDiscovered(endpoint) => {
                    if writers.add(local, &endpoint) {
                        println!("Subscriber matched.");
                        debug!(category = CATEGORY, "Matched writer {}", endpoint.guid());
                    }
                }
                ClientEvent::ParticipantLeft { guid_prefix } => {
                    if writers.remove_participant(&guid_prefix) > 0 {
                        println!("Subscriber unmatched.");
                    }
                }
                ClientEvent::Error { code, message } => {
                    warn!(category = CATEGORY, "Server error {}: {}", code, message);
                }
                ClientEvent::ParticipantAcknowledged | ClientEvent::ParticipantDiscovered(_) => {}
            }

            if let Err(e) = client.heartbeat_if_due() {
                warn!(category = CATEGORY, "Heartbeat failed: {}", e);
            }
        }
    }
}

impl RoleApplication for SubscriberApp {
    fn role(&self) -> Role {
        Role::Subscriber
    }

    fn run(&self) {
        if !self.lifecycle.begin() {
            return;
        }

        let mut client = self.client.lock();
        self.receive_loop(&mut client);

        if self.lifecycle.is_stop_requested() {
            client.disconnect();
        } else if client.is_connected() {
            if let Err(e) = client.leave(LEAVE_LINGER) {
                warn!(category = CATEGORY, "Leave failed: {}", e);
            }
        }
        drop(client);

        info!(
            category = CATEGORY,
            "Stopped after {} samples",
            self.samples_received()
        );
        self.lifecycle.finish();
    }

    fn stop(&self) {
        if self.lifecycle.request_stop(StopKind::Immediate) {
            debug!(category = CATEGORY, "Stop requested");
        }
    }

    fn state(&self) -> RunState {
        self.lifecycle.state()
    }
}
