// SPDX-FileCopyrightText: © 2026 PrivKey LLC
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Initiator side: call methods on a remote bunker.
use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use nostr_sdk::prelude::{Event, Keys, PublicKey, Timestamp, UnsignedEvent};
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use strand_core::crypto::random_bytes;
use strand_core::relay::dedup_relays;
use tokio::sync::{mpsc, oneshot, OnceCell};
use tokio::task::{JoinHandle, JoinSet};
use tracing::{debug, trace, warn};

use crate::bunker::BunkerUri;
use crate::error::{Nip46Error, Result};
use crate::session::Session;
use crate::signer::Signer;
use crate::transport::RelayPool;
use crate::types::{Method, PartialEvent, Request, Response};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Deadline applied by the convenience methods and the [`Signer`] impl.
    /// `None` waits forever. [`BunkerClient::call`] takes its own.
    pub request_timeout: Option<Duration>,
}

/// Receives `auth_url` challenges sent by the bunker while a call is
/// pending. The call itself keeps waiting for its real response.
pub trait AuthUrlHandler: Send + Sync {
    fn on_auth_url(&self, url: &str);
}

impl<F> AuthUrlHandler for F
where
    F: Fn(&str) + Send + Sync,
{
    fn on_auth_url(&self, url: &str) {
        self(url)
    }
}

type PendingMap = Arc<Mutex<HashMap<String, oneshot::Sender<Response>>>>;
type AuthSlot = Arc<RwLock<Option<Arc<dyn AuthUrlHandler>>>>;

/// Removes a call's correlation entry however the call ends.
struct PendingGuard {
    pending: PendingMap,
    id: String,
}

impl PendingGuard {
    fn register(pending: &PendingMap, id: String, tx: oneshot::Sender<Response>) -> Self {
        pending.lock().insert(id.clone(), tx);
        Self {
            pending: pending.clone(),
            id,
        }
    }
}

impl Drop for PendingGuard {
    fn drop(&mut self) {
        self.pending.lock().remove(&self.id);
    }
}

/// Single-assignment signal shared by the publish attempts of one call.
/// The first `fire` wins. When every clone is dropped unfired the receiver
/// resolves to an error.
#[derive(Clone)]
struct Gate(Arc<Mutex<Option<oneshot::Sender<()>>>>);

impl Gate {
    fn new() -> (Self, oneshot::Receiver<()>) {
        let (tx, rx) = oneshot::channel();
        (Self(Arc::new(Mutex::new(Some(tx)))), rx)
    }

    fn fire(&self) {
        if let Some(tx) = self.0.lock().take() {
            let _ = tx.send(());
        }
    }
}

pub struct BunkerClient {
    keys: Keys,
    remote: PublicKey,
    secret: Option<String>,
    relays: Vec<String>,
    pool: Arc<dyn RelayPool>,
    session: Arc<Session>,
    pending: PendingMap,
    id_prefix: String,
    serial: AtomicU64,
    config: ClientConfig,
    auth: AuthSlot,
    user_pubkey: OnceCell<PublicKey>,
    closed: Arc<AtomicBool>,
    listener: JoinHandle<()>,
}

impl BunkerClient {
    /// Derive the session with the bunker, subscribe for responses and
    /// start the listener.
    pub async fn new(
        keys: Keys,
        uri: BunkerUri,
        pool: Arc<dyn RelayPool>,
        config: ClientConfig,
    ) -> Result<Self> {
        let relays = dedup_relays(&uri.relays);
        if relays.is_empty() {
            return Err(Nip46Error::invalid_uri("at least one relay required"));
        }
        let session = Arc::new(Session::new(&keys, uri.remote, keys.public_key())?);
        let events = pool
            .subscribe(&relays, keys.public_key(), Timestamp::now())
            .await?;

        let pending = PendingMap::default();
        let auth = AuthSlot::default();
        let closed = Arc::new(AtomicBool::new(false));
        let listener = tokio::spawn(listen(
            events,
            session.clone(),
            pending.clone(),
            auth.clone(),
            closed.clone(),
        ));

        Ok(Self {
            keys,
            remote: uri.remote,
            secret: uri.secret,
            relays,
            pool,
            session,
            pending,
            id_prefix: hex::encode(random_bytes::<4>()),
            serial: AtomicU64::new(0),
            config,
            auth,
            user_pubkey: OnceCell::new(),
            closed,
            listener,
        })
    }

    pub fn set_auth_url_handler(&self, handler: Arc<dyn AuthUrlHandler>) {
        *self.auth.write() = Some(handler);
    }

    pub fn remote(&self) -> &PublicKey {
        &self.remote
    }

    pub fn relays(&self) -> &[String] {
        &self.relays
    }

    /// True once the response subscription has ended. Every later call
    /// fails with [`Nip46Error::Transport`].
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Calls still waiting for a response.
    pub fn pending_calls(&self) -> usize {
        self.pending.lock().len()
    }

    fn next_id(&self) -> String {
        let serial = self.serial.fetch_add(1, Ordering::Relaxed) + 1;
        format!("{}-{serial}", self.id_prefix)
    }

    fn deadline(&self) -> impl Future<Output = ()> + Send + 'static {
        let timeout = self.config.request_timeout;
        async move {
            match timeout {
                Some(t) => tokio::time::sleep(t).await,
                None => std::future::pending().await,
            }
        }
    }

    /// Send one request and wait for its response.
    ///
    /// `cancel` is observed while waiting for a relay connection, for a
    /// relay to accept the event, and for the response. Cancelling at each
    /// stage yields [`Nip46Error::NoReachableEndpoint`],
    /// [`Nip46Error::TargetUnreachable`] and [`Nip46Error::Cancelled`]
    /// respectively. The same errors are returned without waiting for
    /// `cancel` once every relay attempt has failed at that stage.
    pub async fn call<C>(&self, method: Method, params: Vec<String>, cancel: C) -> Result<String>
    where
        C: Future<Output = ()>,
    {
        let id = self.next_id();
        let request = Request::new(id.clone(), method.as_str(), params);
        let event = self.session.seal(&self.keys, &request)?;

        let (tx, response_rx) = oneshot::channel();
        let _guard = PendingGuard::register(&self.pending, id.clone(), tx);
        // Checked after registering: the listener sets the flag before it
        // drains the pending map.
        if self.is_closed() {
            return Err(Nip46Error::transport("response subscription closed"));
        }

        let (connected, mut connected_rx) = Gate::new();
        let (published, mut published_rx) = Gate::new();
        let mut attempts = JoinSet::new();
        for relay in &self.relays {
            let pool = self.pool.clone();
            let relay = relay.clone();
            let event = event.clone();
            let connected = connected.clone();
            let published = published.clone();
            attempts.spawn(async move {
                if let Err(e) = pool.ensure_relay(&relay).await {
                    debug!(relay = %relay, error = %e, "relay unreachable");
                    return;
                }
                connected.fire();
                match pool.publish(&relay, &event).await {
                    Ok(()) => published.fire(),
                    Err(e) => debug!(relay = %relay, error = %e, "publish refused"),
                }
            });
        }
        drop(connected);
        drop(published);
        debug!(id = %id, method = %method, relays = self.relays.len(), "request sent");

        tokio::pin!(cancel);

        tokio::select! {
            biased;
            _ = &mut cancel => return Err(Nip46Error::NoReachableEndpoint),
            fired = &mut connected_rx => {
                if fired.is_err() {
                    return Err(Nip46Error::NoReachableEndpoint);
                }
            }
        }

        tokio::select! {
            biased;
            _ = &mut cancel => return Err(Nip46Error::TargetUnreachable),
            fired = &mut published_rx => {
                if fired.is_err() {
                    return Err(Nip46Error::TargetUnreachable);
                }
            }
        }

        let response = tokio::select! {
            biased;
            _ = &mut cancel => return Err(Nip46Error::Cancelled),
            response = response_rx => response
                .map_err(|_| Nip46Error::transport("response subscription closed"))?,
        };

        if response.is_error() {
            return Err(Nip46Error::RemoteError(response.error));
        }
        Ok(response.result)
    }

    async fn call_with_deadline(&self, method: Method, params: Vec<String>) -> Result<String> {
        self.call(method, params, self.deadline()).await
    }

    /// Send `connect` with the locator's secret, if any.
    pub async fn connect(&self) -> Result<()> {
        let mut params = vec![self.remote.to_hex()];
        if let Some(secret) = &self.secret {
            params.push(secret.clone());
        }
        let result = self.call_with_deadline(Method::Connect, params).await?;
        if result != "ack" && self.secret.as_deref() != Some(result.as_str()) {
            return Err(Nip46Error::MalformedResponse(format!(
                "unexpected connect result: {result}"
            )));
        }
        Ok(())
    }

    pub async fn ping(&self) -> Result<()> {
        let result = self.call_with_deadline(Method::Ping, vec![]).await?;
        if result != "pong" {
            return Err(Nip46Error::MalformedResponse(format!(
                "unexpected ping result: {result}"
            )));
        }
        Ok(())
    }

    /// The user key the bunker signs with. Cached after the first success.
    pub async fn get_public_key(&self) -> Result<PublicKey> {
        self.user_pubkey
            .get_or_try_init(|| async {
                let hex = self
                    .call_with_deadline(Method::GetPublicKey, vec![])
                    .await?;
                PublicKey::from_hex(&hex)
                    .map_err(|e| Nip46Error::MalformedResponse(format!("public key: {e}")))
            })
            .await
            .copied()
    }

    /// Have the bunker sign `unsigned`. The returned event must verify and
    /// match the template's kind, content, tags and `created_at`, and be
    /// signed by the key [`get_public_key`](Self::get_public_key) reports.
    pub async fn sign_event(&self, unsigned: UnsignedEvent) -> Result<Event> {
        let signer = self.get_public_key().await?;
        let template = PartialEvent {
            kind: unsigned.kind.as_u16(),
            content: unsigned.content.clone(),
            tags: unsigned
                .tags
                .iter()
                .map(|t| t.as_slice().to_vec())
                .collect(),
            created_at: unsigned.created_at.as_u64() as i64,
        };
        let json = self
            .call_with_deadline(Method::SignEvent, vec![serde_json::to_string(&template)?])
            .await?;

        let event: Event = serde_json::from_str(&json)
            .map_err(|e| Nip46Error::MalformedResponse(format!("signed event: {e}")))?;
        event
            .verify()
            .map_err(|e| Nip46Error::MalformedResponse(format!("signed event: {e}")))?;
        if event.pubkey != signer {
            return Err(Nip46Error::MalformedResponse(format!(
                "signed by {} instead of {signer}",
                event.pubkey
            )));
        }
        let same_tags = event
            .tags
            .iter()
            .map(|t| t.as_slice())
            .eq(unsigned.tags.iter().map(|t| t.as_slice()));
        if event.kind != unsigned.kind
            || event.content != unsigned.content
            || event.created_at != unsigned.created_at
            || !same_tags
        {
            return Err(Nip46Error::MalformedResponse(
                "signed event does not match the template".into(),
            ));
        }
        Ok(event)
    }

    async fn cipher(&self, method: Method, peer: &PublicKey, text: &str) -> Result<String> {
        self.call_with_deadline(method, vec![peer.to_hex(), text.to_string()])
            .await
    }
}

impl Drop for BunkerClient {
    fn drop(&mut self) {
        self.listener.abort();
    }
}

impl std::fmt::Debug for BunkerClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BunkerClient")
            .field("remote", &self.remote)
            .field("relays", &self.relays)
            .field("pending", &self.pending_calls())
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl Signer for BunkerClient {
    async fn public_key(&self) -> Result<PublicKey> {
        self.get_public_key().await
    }

    async fn sign_event(&self, unsigned: UnsignedEvent) -> Result<Event> {
        BunkerClient::sign_event(self, unsigned).await
    }

    async fn nip44_encrypt(&self, peer: &PublicKey, plaintext: &str) -> Result<String> {
        self.cipher(Method::Nip44Encrypt, peer, plaintext).await
    }

    async fn nip44_decrypt(&self, peer: &PublicKey, payload: &str) -> Result<String> {
        self.cipher(Method::Nip44Decrypt, peer, payload).await
    }

    async fn nip04_encrypt(&self, peer: &PublicKey, plaintext: &str) -> Result<String> {
        self.cipher(Method::Nip04Encrypt, peer, plaintext).await
    }

    async fn nip04_decrypt(&self, peer: &PublicKey, payload: &str) -> Result<String> {
        self.cipher(Method::Nip04Decrypt, peer, payload).await
    }
}

async fn listen(
    mut events: mpsc::Receiver<Event>,
    session: Arc<Session>,
    pending: PendingMap,
    auth: AuthSlot,
    closed: Arc<AtomicBool>,
) {
    while let Some(event) = events.recv().await {
        if event.pubkey != *session.remote() {
            trace!(from = %event.pubkey, "ignoring event from another sender");
            continue;
        }
        let response = match session.open_response(&event.content) {
            Ok(response) => response,
            Err(e) => {
                debug!(error = %e, "dropping undecodable response");
                continue;
            }
        };

        if response.is_auth_url() {
            let handler = auth.read().clone();
            match handler {
                Some(handler) => handler.on_auth_url(&response.error),
                None => debug!(id = %response.id, "auth_url challenge with no handler"),
            }
            continue;
        }

        let waiter = pending.lock().remove(&response.id);
        match waiter {
            Some(tx) => {
                let _ = tx.send(response);
            }
            None => trace!(id = %response.id, "discarding unmatched response"),
        }
    }

    warn!("response subscription ended");
    closed.store(true, Ordering::Release);
    pending.lock().clear();
}
