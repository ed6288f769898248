// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Participant and endpoint registry kept by the discovery server.

use super::guid::{Guid, GuidPrefix};
use super::protocol::{EndpointAnnounce, ParticipantAnnounce};
use std::collections::HashMap;
use std::time::{Duration, Instant};

/// A registered participant and its lease bookkeeping.
#[derive(Debug, Clone)]
pub struct ParticipantEntry {
    pub announce: ParticipantAnnounce,
    /// Last activity timestamp
    pub last_seen: Instant,
}

impl ParticipantEntry {
    pub fn new(announce: ParticipantAnnounce) -> Self {
        Self {
            announce,
            last_seen: Instant::now(),
        }
    }

    pub fn guid_prefix(&self) -> GuidPrefix {
        self.announce.guid_prefix
    }

    pub fn domain_id(&self) -> u32 {
        self.announce.domain_id
    }

    /// Check if lease has expired.
    pub fn is_expired(&self, lease_duration: Duration) -> bool {
        self.last_seen.elapsed() > lease_duration
    }

    pub fn touch(&mut self) {
        self.last_seen = Instant::now();
    }
}

/// Registry of all participants and their endpoints.
#[derive(Debug, Default)]
pub struct ParticipantRegistry {
    participants: HashMap<GuidPrefix, ParticipantEntry>,
    endpoints: HashMap<Guid, EndpointAnnounce>,
    /// topic_name -> endpoint GUIDs
    topic_index: HashMap<String, Vec<Guid>>,
}

impl ParticipantRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or refresh a participant. Returns `true` when it was not known yet.
    pub fn add_participant(&mut self, announce: ParticipantAnnounce) -> bool {
        let guid_prefix = announce.guid_prefix;
        self.participants
            .insert(guid_prefix, ParticipantEntry::new(announce))
            .is_none()
    }

    /// Remove a participant and all its endpoints.
    pub fn remove_participant(&mut self, guid_prefix: &GuidPrefix) -> Option<ParticipantEntry> {
        let entry = self.participants.remove(guid_prefix)?;

        let owned: Vec<Guid> = self
            .endpoints
            .keys()
            .filter(|g| g.prefix == *guid_prefix)
            .copied()
            .collect();
        for guid in owned {
            self.remove_endpoint(&guid);
        }

        Some(entry)
    }

    pub fn contains(&self, guid_prefix: &GuidPrefix) -> bool {
        self.participants.contains_key(guid_prefix)
    }

    pub fn get_participant(&self, guid_prefix: &GuidPrefix) -> Option<&ParticipantEntry> {
        self.participants.get(guid_prefix)
    }

    /// Update last_seen for a participant. Returns `false` for unknown prefixes.
    pub fn touch_participant(&mut self, guid_prefix: &GuidPrefix) -> bool {
        match self.participants.get_mut(guid_prefix) {
            Some(entry) => {
                entry.touch();
                true
            }
            None => false,
        }
    }

    pub fn participants(&self) -> impl Iterator<Item = &ParticipantEntry> {
        self.participants.values()
    }

    pub fn participant_count(&self) -> usize {
        self.participants.len()
    }

    /// Remove expired participants and return their entries.
    pub fn remove_expired(&mut self, lease_duration: Duration) -> Vec<ParticipantEntry> {
        let expired: Vec<GuidPrefix> = self
            .participants
            .values()
            .filter(|entry| entry.is_expired(lease_duration))
            .map(ParticipantEntry::guid_prefix)
            .collect();

        expired
            .iter()
            .filter_map(|gp| self.remove_participant(gp))
            .collect()
    }

    /// Add an endpoint. Ignored (returns `false`) if its participant is unknown.
    pub fn add_endpoint(&mut self, endpoint: EndpointAnnounce) -> bool {
        let guid = endpoint.guid();
        if !self.participants.contains_key(&guid.prefix) {
            return false;
        }

        let topic = self.topic_index.entry(endpoint.topic_name.clone()).or_default();
        if !topic.contains(&guid) {
            topic.push(guid);
        }

        self.endpoints.insert(guid, endpoint);
        true
    }

    pub fn remove_endpoint(&mut self, guid: &Guid) -> Option<EndpointAnnounce> {
        let endpoint = self.endpoints.remove(guid)?;
        if let Some(list) = self.topic_index.get_mut(&endpoint.topic_name) {
            list.retain(|g| g != guid);
            if list.is_empty() {
                self.topic_index.remove(&endpoint.topic_name);
            }
        }
        Some(endpoint)
    }

    pub fn endpoints(&self) -> impl Iterator<Item = &EndpointAnnounce> {
        self.endpoints.values()
    }

    pub fn endpoint_count(&self) -> usize {
        self.endpoints.len()
    }

    /// Endpoints on `topic_name`, writers and readers alike.
    pub fn endpoints_for_topic(&self, topic_name: &str) -> Vec<&EndpointAnnounce> {
        self.topic_index
            .get(topic_name)
            .map(|guids| guids.iter().filter_map(|g| self.endpoints.get(g)).collect())
            .unwrap_or_default()
    }

    pub fn readers_for_topic(&self, topic_name: &str) -> Vec<&EndpointAnnounce> {
        self.endpoints_for_topic(topic_name)
            .into_iter()
            .filter(|e| !e.is_writer)
            .collect()
    }
}
