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
use crate::policy::{
    AllowAll, DynamicPolicy, EncryptionRequest, SignatureObserver, SignatureRecord,
    SigningRequest,
};
use crate::session::{Session, SessionMap};
use crate::signer::Signer;
use crate::types::{Request, DEFAULT_MAX_CONTENT_SIZE};

/// Looks up local identities by the public key a request was addressed to.
#[async_trait]
pub trait KeyResolver: Send + Sync {
    /// Transport keys for `recipient`, or `None` when it is not ours.
    async fn transport_keys(&self, recipient: &PublicKey) -> Result<Option<Keys>>;

    /// Signing capability of the user fronted by `recipient`.
    async fn user_signer(&self, recipient: &PublicKey) -> Result<Arc<dyn Signer>>;
}

/// Multi-tenant responder: one process answering for many identities whose
/// keys are resolved per request.
pub struct DynamicSigner {
    resolver: Arc<dyn KeyResolver>,
    policy: Arc<dyn DynamicPolicy>,
    observer: Option<Arc<dyn SignatureObserver>>,
    sessions: SessionMap<(PublicKey, PublicKey)>,
    max_content_size: usize,
}

impl DynamicSigner {
    pub fn new(resolver: Arc<dyn KeyResolver>) -> Self {
        Self {
            resolver,
            policy: Arc::new(AllowAll),
            observer: None,
            sessions: SessionMap::new(),
            max_content_size: DEFAULT_MAX_CONTENT_SIZE,
        }
    }

    pub fn with_policy(mut self, policy: Arc<dyn DynamicPolicy>) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_observer(mut self, observer: Arc<dyn SignatureObserver>) -> Self {
        self.observer = Some(observer);
        self
    }

    pub fn with_max_content_size(mut self, size: usize) -> Self {
        self.max_content_size = size;
        self
    }

    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }

    async fn resolve_recipient(&self, event: &Event) -> Result<Keys> {
        for recipient in tagged_recipients(event) {
            if let Some(keys) = self.resolver.transport_keys(&recipient).await? {
                return Ok(keys);
            }
        }
        Err(Nip46Error::UnknownRecipient)
    }

    fn authorize(&self, operation: &Operation, remote: &PublicKey, ids: &Identities) -> bool {
        match operation {
            Operation::SignEvent(unsigned) => self.policy.authorize_signing(&SigningRequest {
                remote,
                local: &ids.transport,
                user: &ids.user,
                event: unsigned,
            }),
            Operation::Encrypt { method, peer, .. } => {
                self.policy.authorize_encryption(&EncryptionRequest {
                    method: *method,
                    remote,
                    local: &ids.transport,
                    user: &ids.user,
                    peer,
                })
            }
            _ => true,
        }
    }

    async fn execute(
        &self,
        remote: &PublicKey,
        signer: &dyn Signer,
        ids: &Identities,
        request: &Request,
    ) -> Result<String> {
        let operation = Operation::parse(request, &ids.user)?;
        if !self.authorize(&operation, remote, ids) {
            warn!(remote = %remote, method = %operation.method(), "request refused by policy");
            return Err(Nip46Error::Unauthorized);
        }

        let outcome = perform(&operation, signer, ids).await?;
        if let (Some(event), Some(observer)) = (&outcome.signed, &self.observer) {
            observer.on_signature(&SignatureRecord {
                remote,
                local: &ids.transport,
                event,
            });
        }
        Ok(outcome.result)
    }
}

#[async_trait]
impl RequestHandler for DynamicSigner {
    async fn handle_request(&self, event: &Event) -> Result<HandledRequest> {
        check_kind(event)?;
        let keys = self.resolve_recipient(event).await?;
        if event.content.len() > self.max_content_size.saturating_mul(2) {
            return Err(Nip46Error::malformed_request("content too large"));
        }
        event
            .verify()
            .map_err(|e| Nip46Error::malformed_request(format!("bad signature: {e}")))?;

        let local = keys.public_key();
        let signer = self.resolver.user_signer(&local).await?;
        let ids = Identities {
            transport: local,
            user: signer.public_key().await?,
        };

        let remote = event.pubkey;
        let (session, request) = self.sessions.open_request(
            (local, remote),
            || Session::new(&keys, remote, ids.user),
            &event.content,
            self.max_content_size,
        )?;
        debug!(
            local = %local,
            remote = %remote,
            id = %request.id,
            method = %request.method,
            "request"
        );

        let outcome = self.execute(&remote, signer.as_ref(), &ids, &request).await;
        respond(&session, &keys, request, outcome)
    }
}
