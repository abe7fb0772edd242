// SPDX-FileCopyrightText: © 2026 PrivKey LLC
// SPDX-License-Identifier: AGPL-3.0-or-later
use std::collections::HashMap;

use async_trait::async_trait;
use nostr_sdk::prelude::{nip04, Event, Keys, PublicKey, UnsignedEvent};
use parking_lot::RwLock;
use strand_core::nip44::{self, ConversationKey};

use crate::error::{Nip46Error, Result};
use crate::session::conversation_key;

/// The signing and encryption capability behind a user identity.
///
/// Object safe, so backends hold it as `Arc<dyn Signer>` and do not care
/// whether keys live in-process or behind another bunker.
#[async_trait]
pub trait Signer: Send + Sync {
    async fn public_key(&self) -> Result<PublicKey>;

    /// Sign an event template. The template's pubkey must already be this
    /// signer's public key.
    async fn sign_event(&self, unsigned: UnsignedEvent) -> Result<Event>;

    async fn nip44_encrypt(&self, peer: &PublicKey, plaintext: &str) -> Result<String>;

    async fn nip44_decrypt(&self, peer: &PublicKey, payload: &str) -> Result<String>;

    async fn nip04_encrypt(&self, peer: &PublicKey, plaintext: &str) -> Result<String>;

    async fn nip04_decrypt(&self, peer: &PublicKey, payload: &str) -> Result<String>;
}

/// [`Signer`] over an in-process key pair.
pub struct KeySigner {
    keys: Keys,
    conversations: RwLock<HashMap<PublicKey, ConversationKey>>,
}

impl KeySigner {
    pub fn new(keys: Keys) -> Self {
        Self {
            keys,
            conversations: RwLock::new(HashMap::new()),
        }
    }

    pub fn keys(&self) -> &Keys {
        &self.keys
    }

    fn conversation(&self, peer: &PublicKey) -> Result<ConversationKey> {
        if let Some(key) = self.conversations.read().get(peer) {
            return Ok(key.clone());
        }
        let key = conversation_key(self.keys.secret_key(), peer)?;
        Ok(self
            .conversations
            .write()
            .entry(*peer)
            .or_insert(key)
            .clone())
    }
}

#[async_trait]
impl Signer for KeySigner {
    async fn public_key(&self) -> Result<PublicKey> {
        Ok(self.keys.public_key())
    }

    async fn sign_event(&self, unsigned: UnsignedEvent) -> Result<Event> {
        if unsigned.pubkey != self.keys.public_key() {
            return Err(Nip46Error::signing("event pubkey does not match signer"));
        }
        unsigned
            .sign(&self.keys)
            .await
            .map_err(|e| Nip46Error::signing(format!("signing: {e}")))
    }

    async fn nip44_encrypt(&self, peer: &PublicKey, plaintext: &str) -> Result<String> {
        let key = self.conversation(peer)?;
        Ok(nip44::encrypt(plaintext.as_bytes(), &key)?)
    }

    async fn nip44_decrypt(&self, peer: &PublicKey, payload: &str) -> Result<String> {
        let key = self.conversation(peer)?;
        Ok(nip44::decrypt_to_string(payload, &key)?)
    }

    async fn nip04_encrypt(&self, peer: &PublicKey, plaintext: &str) -> Result<String> {
        nip04::encrypt(self.keys.secret_key(), peer, plaintext)
            .map_err(|e| Nip46Error::signing(format!("NIP-04 encrypt: {e}")))
    }

    async fn nip04_decrypt(&self, peer: &PublicKey, payload: &str) -> Result<String> {
        nip04::decrypt(self.keys.secret_key(), peer, payload)
            .map_err(|e| Nip46Error::signing(format!("NIP-04 decrypt: {e}")))
    }
}
