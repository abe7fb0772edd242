// SPDX-FileCopyrightText: © 2026 PrivKey LLC
// SPDX-License-Identifier: AGPL-3.0-or-later
use async_trait::async_trait;
use nostr_sdk::prelude::{
    Client, Event, Filter, Keys, Kind, PublicKey, RelayPoolNotification, Timestamp,
};
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, warn};

use super::{is_addressed_to, RelayPool, SUBSCRIPTION_BUFFER};
use crate::error::{Nip46Error, Result};

/// [`RelayPool`] backed by a `nostr_sdk::Client`.
#[derive(Clone)]
pub struct NostrRelayPool {
    client: Client,
}

impl NostrRelayPool {
    pub fn new(keys: Keys) -> Self {
        Self {
            client: Client::new(keys),
        }
    }

    pub fn from_client(client: Client) -> Self {
        Self { client }
    }

    pub fn client(&self) -> &Client {
        &self.client
    }
}

#[async_trait]
impl RelayPool for NostrRelayPool {
    async fn ensure_relay(&self, url: &str) -> Result<()> {
        self.client
            .add_relay(url)
            .await
            .map_err(|e| Nip46Error::transport(format!("add relay {url}: {e}")))?;
        self.client
            .connect_relay(url)
            .await
            .map_err(|e| Nip46Error::transport(format!("connect {url}: {e}")))?;
        Ok(())
    }

    async fn publish(&self, url: &str, event: &Event) -> Result<()> {
        let output = self
            .client
            .send_event_to([url], event)
            .await
            .map_err(|e| Nip46Error::transport(format!("publish to {url}: {e}")))?;
        if output.success.is_empty() {
            let reason = output
                .failed
                .values()
                .next()
                .cloned()
                .unwrap_or_else(|| "not accepted".to_string());
            return Err(Nip46Error::transport(format!("{url}: {reason}")));
        }
        Ok(())
    }

    async fn subscribe(
        &self,
        relays: &[String],
        recipient: PublicKey,
        since: Timestamp,
    ) -> Result<mpsc::Receiver<Event>> {
        for relay in relays {
            self.client
                .add_relay(relay)
                .await
                .map_err(|e| Nip46Error::transport(format!("add relay {relay}: {e}")))?;
        }
        self.client.connect().await;

        // taken before subscribing so nothing matching slips past
        let mut notifications = self.client.notifications();
        let filter = Filter::new()
            .kind(Kind::NostrConnect)
            .pubkey(recipient)
            .since(since);
        self.client
            .subscribe(filter, None)
            .await
            .map_err(|e| Nip46Error::transport(format!("subscribe: {e}")))?;

        let (tx, rx) = mpsc::channel(SUBSCRIPTION_BUFFER);
        tokio::spawn(async move {
            loop {
                match notifications.recv().await {
                    Ok(RelayPoolNotification::Event { event, .. }) => {
                        if !is_addressed_to(&event, &recipient) {
                            continue;
                        }
                        if tx.send(Event::clone(&event)).await.is_err() {
                            break;
                        }
                    }
                    Ok(RelayPoolNotification::Shutdown) => {
                        debug!("relay pool shut down");
                        break;
                    }
                    Ok(_) => {}
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        warn!(skipped = n, "notification receiver lagged");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        });
        Ok(rx)
    }
}
