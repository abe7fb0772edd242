// SPDX-FileCopyrightText: © 2026 PrivKey LLC
// SPDX-License-Identifier: AGPL-3.0-or-later
use std::future::Future;
use std::sync::Arc;

use nostr_sdk::prelude::{Event, PublicKey, Timestamp};
use serde::{Deserialize, Serialize};
use strand_core::relay::{dedup_relays, validate_relay_url, MAX_RELAYS};
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use crate::audit::AuditLog;
use crate::backend::{HandledRequest, RequestHandler};
use crate::bunker::BunkerUri;
use crate::error::{Nip46Error, Result};
use crate::transport::RelayPool;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ServerConfig {
    pub relays: Vec<String>,
    /// Accept relays on loopback and private networks.
    #[serde(default)]
    pub allow_internal_hosts: bool,
}

/// Responder run loop: receive requests, hand them to a [`RequestHandler`],
/// publish the responses.
pub struct Server {
    handler: Arc<dyn RequestHandler>,
    pool: Arc<dyn RelayPool>,
    relays: Vec<String>,
    audit: Option<Arc<AuditLog>>,
}

impl Server {
    pub fn new(
        handler: Arc<dyn RequestHandler>,
        pool: Arc<dyn RelayPool>,
        config: ServerConfig,
    ) -> Result<Self> {
        let relays = dedup_relays(&config.relays);
        if relays.is_empty() {
            return Err(Nip46Error::transport("at least one relay required"));
        }
        if relays.len() > MAX_RELAYS {
            return Err(Nip46Error::transport(format!(
                "too many relays (max {MAX_RELAYS})"
            )));
        }
        for relay in &relays {
            validate_relay_url(relay, config.allow_internal_hosts)
                .map_err(|e| Nip46Error::transport(format!("{relay}: {e}")))?;
        }

        Ok(Self {
            handler,
            pool,
            relays,
            audit: None,
        })
    }

    /// Record every answered request.
    pub fn with_audit(mut self, audit: Arc<AuditLog>) -> Self {
        self.audit = Some(audit);
        self
    }

    pub fn relays(&self) -> &[String] {
        &self.relays
    }

    /// Locator an app can use to reach `pubkey` through this server.
    pub fn bunker_uri(&self, pubkey: PublicKey, secret: Option<&str>) -> BunkerUri {
        let uri = BunkerUri::new(pubkey, self.relays.clone());
        match secret {
            Some(secret) => uri.with_secret(secret),
            None => uri,
        }
    }

    /// Serve requests addressed to `identities` until `shutdown` resolves or
    /// every subscription ends.
    #[tracing::instrument(skip_all, fields(identities = identities.len()))]
    pub async fn run<S>(&self, identities: &[PublicKey], shutdown: S) -> Result<()>
    where
        S: Future<Output = ()>,
    {
        for relay in &self.relays {
            if let Err(e) = self.pool.ensure_relay(relay).await {
                warn!(relay = %relay, error = %e, "relay unavailable");
            }
        }

        let since = Timestamp::now();
        let (tx, mut inbound) = mpsc::channel::<Event>(crate::transport::SUBSCRIPTION_BUFFER);
        let mut forwarders = JoinSet::new();
        for identity in identities {
            let mut events = self.pool.subscribe(&self.relays, *identity, since).await?;
            let tx = tx.clone();
            forwarders.spawn(async move {
                while let Some(event) = events.recv().await {
                    if tx.send(event).await.is_err() {
                        break;
                    }
                }
            });
        }
        drop(tx);
        info!(relays = self.relays.len(), "listening for requests");

        let mut requests = JoinSet::new();
        tokio::pin!(shutdown);
        loop {
            tokio::select! {
                biased;
                _ = &mut shutdown => {
                    info!("shutdown signal received");
                    break;
                }
                event = inbound.recv() => {
                    let Some(event) = event else {
                        debug!("all subscriptions ended");
                        break;
                    };
                    let handler = self.handler.clone();
                    let pool = self.pool.clone();
                    let relays = self.relays.clone();
                    let audit = self.audit.clone();
                    requests.spawn(async move {
                        serve(handler.as_ref(), pool.as_ref(), &relays, audit.as_deref(), &event)
                            .await;
                    });
                }
                Some(_) = requests.join_next(), if !requests.is_empty() => {}
            }
        }

        forwarders.shutdown().await;
        requests.shutdown().await;
        Ok(())
    }
}

async fn serve(
    handler: &dyn RequestHandler,
    pool: &dyn RelayPool,
    relays: &[String],
    audit: Option<&AuditLog>,
    event: &Event,
) {
    let handled = match handler.handle_request(event).await {
        Ok(handled) => handled,
        Err(Nip46Error::UnknownRecipient) => {
            debug!(id = %event.id, "request not addressed to a local identity");
            return;
        }
        Err(e) => {
            warn!(id = %event.id, error = %e, "dropping request");
            return;
        }
    };

    if let Some(audit) = audit {
        audit.record_request(&event.pubkey, &handled.request, &handled.response);
    }
    publish_response(pool, relays, &handled).await;
}

async fn publish_response(pool: &dyn RelayPool, relays: &[String], handled: &HandledRequest) {
    let mut delivered = 0usize;
    for relay in relays {
        match pool.publish(relay, &handled.event).await {
            Ok(()) => delivered += 1,
            Err(e) => warn!(relay = %relay, error = %e, "failed to publish response"),
        }
    }
    debug!(
        id = %handled.request.id,
        method = %handled.request.method,
        delivered,
        "response published"
    );
}
