// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! HelloWorld publisher.
//!
//! Announces a writer on the configured topic, waits for matching readers
//! and sends them one sample per interval through the discovery server
//! relay.

use super::lifecycle::{Lifecycle, RunState, StopKind};
use super::sample::HelloWorld;
use super::{join_topic, AppError, RemoteMatches, Role, RoleApplication};
use crate::config::PublisherConfig;
use crate::discovery::{ClientEvent, DiscoveryClient, EndpointAnnounce, EntityId, GuidPrefix};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

const WRITER_ID: EntityId = EntityId::writer(1);

/// How long a clean departure waits for the server to consume what was sent.
const LEAVE_LINGER: Duration = Duration::from_secs(1);

const CATEGORY: &str = "Publisher";

pub struct PublisherApp {
    config: PublisherConfig,
    /// Owned by the worker while `run()` executes.
    client: Mutex<DiscoveryClient>,
    lifecycle: Lifecycle,
    samples_sent: AtomicU32,
    matched_readers: AtomicUsize,
}

impl PublisherApp {
    pub fn new(config: PublisherConfig) -> Result<Self, AppError> {
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
            samples_sent: AtomicU32::new(0),
            matched_readers: AtomicUsize::new(0),
        })
    }

    pub fn samples_sent(&self) -> u32 {
        self.samples_sent.load(Ordering::SeqCst)
    }

    pub fn matched_readers(&self) -> usize {
        self.matched_readers.load(Ordering::SeqCst)
    }

    /// Block until `run()` has returned or `timeout` elapses.
    pub fn wait_stopped(&self, timeout: Duration) -> bool {
        self.lifecycle.wait_stopped(timeout)
    }

    fn is_bounded_and_done(&self, sent: u32) -> bool {
        self.config.samples > 0 && sent >= self.config.samples
    }

    fn publish_loop(&self, client: &mut DiscoveryClient) {
        let mut writer: Option<EndpointAnnounce> = None;
        let mut readers = RemoteMatches::default();
        let mut next_sample = Instant::now();
        let mut index = 0u32;

        while !self.lifecycle.is_stop_requested() {
            let Some(local) = writer.as_ref().filter(|_| client.is_connected()) else {
                readers.clear();
                self.matched_readers.store(0, Ordering::SeqCst);

                match join_topic(client, Role::Publisher, WRITER_ID, true, self.config.reliable) {
                    Ok(endpoint) => {
                        info!(
                            category = CATEGORY,
                            "Writer {} announced on '{}'",
                            endpoint.guid(),
                            endpoint.topic_name
                        );
                        writer = Some(endpoint);
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

            match client.poll_event() {
                Ok(Some(event)) if event.requires_rejoin() => {
                    warn!(category = CATEGORY, "Registration lost: {:?}", event);
                    client.disconnect();
                    continue;
                }
                Ok(Some(event)) => self.on_event(local, event, &mut readers),
                Ok(None) => {}
                Err(e) => {
                    warn!(category = CATEGORY, "Lost discovery server: {}", e);
                    client.disconnect();
                    continue;
                }
            }

            if let Err(e) = client.heartbeat_if_due() {
                warn!(category = CATEGORY, "Heartbeat failed: {}", e);
                continue;
            }

            if readers.is_empty() || Instant::now() < next_sample {
                continue;
            }

            let sample = HelloWorld::new(index + 1);
            let payload = match sample.to_payload() {
                Ok(payload) => payload,
                Err(e) => {
                    error!(category = CATEGORY, "Failed to serialize sample: {}", e);
                    break;
                }
            };

            let sent = readers
                .participants()
                .try_for_each(|reader| client.send_data(reader, payload.clone()));
            if let Err(e) = sent {
                warn!(category = CATEGORY, "Failed to send sample {}: {}", sample.index, e);
                continue;
            }

            index = sample.index;
            println!("{} SENT", sample);
            let total = self.samples_sent.fetch_add(1, Ordering::SeqCst) + 1;
            next_sample = Instant::now() + self.config.interval;

            if self.is_bounded_and_done(total) {
                info!(category = CATEGORY, "All {} samples sent", total);
                break;
            }
        }
    }

    fn on_event(&self, local: &EndpointAnnounce, event: ClientEvent, readers: &mut RemoteMatches) {
        match event {
            ClientEvent::EndpointDiscovered(endpoint) => {
                if readers.add(local, &endpoint) {
                    self.matched_readers.store(readers.len(), Ordering::SeqCst);
                    println!("Publisher matched.");
                    debug!(category = CATEGORY, "Matched reader {}", endpoint.guid());
                }
            }
            ClientEvent::ParticipantLeft { guid_prefix } => {
                if readers.remove_participant(&guid_prefix) > 0 {
                    self.matched_readers.store(readers.len(), Ordering::SeqCst);
                    println!("Publisher unmatched.");
                }
            }
            ClientEvent::Error { code, message } => {
                warn!(category = CATEGORY, "Server error {}: {}", code, message);
            }
            ClientEvent::ParticipantAcknowledged => {
                debug!(category = CATEGORY, "Registered with discovery server");
            }
            ClientEvent::ParticipantDiscovered(participant) => {
                debug!(category = CATEGORY, "Discovered participant {}", participant.guid_prefix);
            }
            ClientEvent::Data { source, .. } => {
                debug!(category = CATEGORY, "Ignoring data from {:?}", source);
            }
        }
    }
}

impl RoleApplication for PublisherApp {
    fn role(&self) -> Role {
        Role::Publisher
    }

    fn run(&self) {
        if !self.lifecycle.begin() {
            return;
        }

        let mut client = self.client.lock();
        self.publish_loop(&mut client);

        if self.lifecycle.stop_kind() == Some(StopKind::Immediate) {
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
            self.samples_sent()
        );
        self.lifecycle.finish();
    }

    fn stop(&self) {
        if self.lifecycle.request_stop(StopKind::Immediate) {
            debug!(category = CATEGORY, "Stop requested");
        }
    }

    /// Stop publishing, then announce departure before closing.
    fn graceful_shutdown(&self) {
        if self.lifecycle.request_stop(StopKind::Graceful) {
            debug!(category = CATEGORY, "Graceful shutdown requested");
        }
    }

    fn state(&self) -> RunState {
        self.lifecycle.state()
    }
}
