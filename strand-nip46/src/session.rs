// SPDX-FileCopyrightText: © 2026 PrivKey LLC
// SPDX-License-Identifier: AGPL-3.0-or-later
use std::collections::HashMap;
use std::hash::Hash;
use std::sync::Arc;

use nostr_sdk::prelude::{Event, EventBuilder, Keys, Kind, PublicKey, SecretKey, Tag};
use parking_lot::RwLock;
use serde::Serialize;
use strand_core::nip44::{self, ConversationKey};
use zeroize::Zeroizing;

use crate::error::{Nip46Error, Result};
use crate::types::{Request, Response};

/// Conversation key between a nostr secret key and a peer's public key.
pub fn conversation_key(secret: &SecretKey, peer: &PublicKey) -> Result<ConversationKey> {
    let secret_bytes = Zeroizing::new(secret.secret_bytes());
    Ok(ConversationKey::derive(&secret_bytes, &peer.to_bytes())?)
}

/// Cryptographic state for one counterparty.
///
/// `identity` is the local identity this session acts for: the user key on
/// the responder side, the client's own key on the initiator side.
pub struct Session {
    remote: PublicKey,
    identity: PublicKey,
    key: ConversationKey,
}

impl Session {
    pub fn new(local: &Keys, remote: PublicKey, identity: PublicKey) -> Result<Self> {
        let key = conversation_key(local.secret_key(), &remote)?;
        Ok(Self {
            remote,
            identity,
            key,
        })
    }

    pub fn remote(&self) -> &PublicKey {
        &self.remote
    }

    pub fn identity(&self) -> &PublicKey {
        &self.identity
    }

    pub fn encrypt(&self, plaintext: &str) -> Result<String> {
        Ok(nip44::encrypt(plaintext.as_bytes(), &self.key)?)
    }

    pub fn decrypt(&self, payload: &str) -> Result<String> {
        Ok(nip44::decrypt_to_string(payload, &self.key)?)
    }

    /// Encode, encrypt and wrap a message in a signed kind 24133 event
    /// addressed to the remote side.
    pub fn seal<T: Serialize>(&self, keys: &Keys, message: &T) -> Result<Event> {
        let json = serde_json::to_string(message)?;
        let content = self.encrypt(&json)?;
        EventBuilder::new(Kind::NostrConnect, content)
            .tag(Tag::public_key(self.remote))
            .sign_with_keys(keys)
            .map_err(|e| Nip46Error::signing(format!("wrap message: {e}")))
    }

    /// Decrypt and decode an inbound request. Every failure is
    /// [`Nip46Error::MalformedRequest`].
    pub fn open_request(&self, content: &str, max_content_size: usize) -> Result<Request> {
        let decrypted = self
            .decrypt(content)
            .map_err(|e| Nip46Error::malformed_request(format!("decrypt: {e}")))?;
        if decrypted.len() > max_content_size {
            return Err(Nip46Error::malformed_request("request too large"));
        }
        let request: Request = serde_json::from_str(&decrypted)
            .map_err(|e| Nip46Error::malformed_request(format!("decode: {e}")))?;
        request.validate()?;
        Ok(request)
    }

    pub fn open_response(&self, content: &str) -> Result<Response> {
        let decrypted = self.decrypt(content)?;
        serde_json::from_str(&decrypted)
            .map_err(|e| Nip46Error::MalformedResponse(format!("decode: {e}")))
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("remote", &self.remote)
            .field("identity", &self.identity)
            .finish_non_exhaustive()
    }
}

/// Sessions memoized per counterparty key.
///
/// Creation happens outside the lock; when two tasks race to create the same
/// session the first inserted value is kept and returned to both.
pub struct SessionMap<K> {
    sessions: RwLock<HashMap<K, Arc<Session>>>,
}

impl<K: Eq + Hash> SessionMap<K> {
    pub fn new() -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
        }
    }

    pub fn get(&self, key: &K) -> Option<Arc<Session>> {
        self.sessions.read().get(key).cloned()
    }

    pub fn insert_if_absent(&self, key: K, session: Session) -> Arc<Session> {
        self.sessions
            .write()
            .entry(key)
            .or_insert_with(|| Arc::new(session))
            .clone()
    }

    /// Decode an inbound request with the session cached for `key`, or with
    /// a fresh one from `create`. A fresh session is kept only once the
    /// request decodes, so undecryptable traffic leaves the map untouched.
    pub fn open_request<F>(
        &self,
        key: K,
        create: F,
        content: &str,
        max_content_size: usize,
    ) -> Result<(Arc<Session>, Request)>
    where
        F: FnOnce() -> Result<Session>,
    {
        if let Some(session) = self.get(&key) {
            let request = session.open_request(content, max_content_size)?;
            return Ok((session, request));
        }
        let session = create()?;
        let request = session.open_request(content, max_content_size)?;
        Ok((self.insert_if_absent(key, session), request))
    }

    pub fn remove(&self, key: &K) -> Option<Arc<Session>> {
        self.sessions.write().remove(key)
    }

    pub fn len(&self) -> usize {
        self.sessions.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.read().is_empty()
    }
}

impl<K: Eq + Hash> Default for SessionMap<K> {
    fn default() -> Self {
        Self::new()
    }
}
