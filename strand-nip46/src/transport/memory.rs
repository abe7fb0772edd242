// SPDX-FileCopyrightText: © 2026 PrivKey LLC
// SPDX-License-Identifier: AGPL-3.0-or-later
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use nostr_sdk::prelude::{Event, EventId, PublicKey, Timestamp};
use parking_lot::Mutex;
use strand_core::relay::normalize_relay_url;
use tokio::sync::mpsc;
use tracing::trace;

use super::{is_addressed_to, RelayPool, SUBSCRIPTION_BUFFER};
use crate::error::{Nip46Error, Result};

#[derive(Default)]
struct Relay {
    events: Vec<Event>,
    unreachable: bool,
    rejecting: bool,
}

struct Subscriber {
    relays: HashSet<String>,
    recipient: PublicKey,
    since: Timestamp,
    seen: HashSet<EventId>,
    tx: mpsc::Sender<Event>,
}

impl Subscriber {
    fn wants(&self, relay: &str, event: &Event) -> bool {
        self.relays.contains(relay)
            && event.created_at >= self.since
            && is_addressed_to(event, &self.recipient)
    }
}

#[derive(Default)]
struct Hub {
    relays: HashMap<String, Relay>,
    subscribers: Vec<Subscriber>,
}

/// In-process relay network. Clones share the same hub, so a client and a
/// server holding clones see each other's events.
#[derive(Clone, Default)]
pub struct MemoryRelayPool {
    hub: Arc<Mutex<Hub>>,
}

impl MemoryRelayPool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Refuse connections to `url` while set.
    pub fn set_unreachable(&self, url: &str, unreachable: bool) {
        let mut hub = self.hub.lock();
        hub.relays
            .entry(normalize_relay_url(url))
            .or_default()
            .unreachable = unreachable;
    }

    /// Accept connections to `url` but refuse publishes while set.
    pub fn set_rejecting(&self, url: &str, rejecting: bool) {
        let mut hub = self.hub.lock();
        hub.relays
            .entry(normalize_relay_url(url))
            .or_default()
            .rejecting = rejecting;
    }

    /// Live subscriptions across all relays.
    pub fn subscription_count(&self) -> usize {
        let mut hub = self.hub.lock();
        hub.subscribers.retain(|s| !s.tx.is_closed());
        hub.subscribers.len()
    }

    /// Events stored by `url`, oldest first.
    pub fn published(&self, url: &str) -> Vec<Event> {
        self.hub
            .lock()
            .relays
            .get(&normalize_relay_url(url))
            .map(|r| r.events.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl RelayPool for MemoryRelayPool {
    async fn ensure_relay(&self, url: &str) -> Result<()> {
        let mut hub = self.hub.lock();
        let relay = hub.relays.entry(normalize_relay_url(url)).or_default();
        if relay.unreachable {
            return Err(Nip46Error::transport(format!("{url}: connection refused")));
        }
        Ok(())
    }

    async fn publish(&self, url: &str, event: &Event) -> Result<()> {
        let url = normalize_relay_url(url);
        let mut guard = self.hub.lock();
        let hub = &mut *guard;
        let relay = hub.relays.entry(url.clone()).or_default();
        if relay.unreachable {
            return Err(Nip46Error::transport(format!("{url}: connection refused")));
        }
        if relay.rejecting {
            return Err(Nip46Error::transport(format!("{url}: blocked")));
        }
        relay.events.push(event.clone());

        hub.subscribers.retain(|s| !s.tx.is_closed());
        for sub in hub.subscribers.iter_mut() {
            if sub.wants(&url, event) && sub.seen.insert(event.id) {
                if sub.tx.try_send(event.clone()).is_err() {
                    trace!(url = %url, "subscriber full; event dropped");
                }
            }
        }
        Ok(())
    }

    async fn subscribe(
        &self,
        relays: &[String],
        recipient: PublicKey,
        since: Timestamp,
    ) -> Result<mpsc::Receiver<Event>> {
        let (tx, rx) = mpsc::channel(SUBSCRIPTION_BUFFER);
        let mut sub = Subscriber {
            relays: relays.iter().map(|r| normalize_relay_url(r)).collect(),
            recipient,
            since,
            seen: HashSet::new(),
            tx,
        };

        let mut hub = self.hub.lock();
        for (url, relay) in hub.relays.iter() {
            for event in &relay.events {
                if sub.wants(url, event) && sub.seen.insert(event.id) {
                    let _ = sub.tx.try_send(event.clone());
                }
            }
        }
        hub.subscribers.push(sub);
        Ok(rx)
    }
}
