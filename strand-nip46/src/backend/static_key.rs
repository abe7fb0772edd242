// SPDX-FileCopyrightText: © 2026 PrivKey LLC
// SPDX-License-Identifier: AGPL-3.0-or-later
use std::sync::Arc;

use async_trait::async_trait;
use nostr_sdk::prelude::{Event, Keys, PublicKey};
use tracing::{debug, warn};

use super::{
    check_kind, perform, respond, tagged_recipients, HandledRequest, Identities, Operation,
    RequestHandler,
};
use crate::error::{Nip46Error, Result};
use crate::policy::{AllowAll, AuthorizationPolicy, AuthorizationRequest};
use crate::session::{Session, SessionMap};
use crate::signer::KeySigner;
use crate::types::{Request, DEFAULT_MAX_CONTENT_SIZE};

/// Responder for a single identity whose secret key is held in memory.
///
/// The same key encrypts transport traffic and signs on the user's behalf.
pub struct StaticKeySigner {
    keys: Keys,
    signer: KeySigner,
    sessions: SessionMap<PublicKey>,
    policy: Arc<dyn AuthorizationPolicy>,
    max_content_size: usize,
}

impl StaticKeySigner {
    pub fn new(keys: Keys) -> Self {
        Self {
            signer: KeySigner::new(keys.clone()),
            keys,
            sessions: SessionMap::new(),
            policy: Arc::new(AllowAll),
            max_content_size: DEFAULT_MAX_CONTENT_SIZE,
        }
    }

    pub fn with_policy(mut self, policy: Arc<dyn AuthorizationPolicy>) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_max_content_size(mut self, size: usize) -> Self {
        self.max_content_size = size;
        self
    }

    pub fn public_key(&self) -> PublicKey {
        self.keys.public_key()
    }

    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }

    async fn execute(&self, remote: &PublicKey, request: &Request) -> Result<String> {
        let user = self.keys.public_key();
        let identities = Identities {
            transport: user,
            user,
        };
        let operation = Operation::parse(request, &user)?;
        let outcome = perform(&operation, &self.signer, &identities).await?;

        let method = operation.method();
        let allowed = self.policy.authorize(&AuthorizationRequest {
            method,
            harmless: method.is_harmless(),
            remote,
            secret: operation.secret(),
            params: &request.params,
        });
        if !allowed {
            warn!(remote = %remote, method = %method, "request refused by policy");
            return Err(Nip46Error::Unauthorized);
        }
        Ok(outcome.result)
    }
}

#[async_trait]
impl RequestHandler for StaticKeySigner {
    async fn handle_request(&self, event: &Event) -> Result<HandledRequest> {
        check_kind(event)?;
        let local = self.keys.public_key();
        if !tagged_recipients(event).contains(&local) {
            return Err(Nip46Error::UnknownRecipient);
        }
        if event.content.len() > self.max_content_size.saturating_mul(2) {
            return Err(Nip46Error::malformed_request("content too large"));
        }
        event
            .verify()
            .map_err(|e| Nip46Error::malformed_request(format!("bad signature: {e}")))?;

        let remote = event.pubkey;
        let (session, request) = self.sessions.open_request(
            remote,
            || Session::new(&self.keys, remote, local),
            &event.content,
            self.max_content_size,
        )?;
        debug!(remote = %remote, id = %request.id, method = %request.method, "request");

        let outcome = self.execute(&remote, &request).await;
        respond(&session, &self.keys, request, outcome)
    }
}
