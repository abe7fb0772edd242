// SPDX-FileCopyrightText: © 2026 PrivKey LLC
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Responder side: turn an inbound request event into a signed response.
mod dynamic;
mod static_key;

pub use dynamic::{DynamicSigner, KeyResolver};
pub use static_key::StaticKeySigner;

use async_trait::async_trait;
use nostr_sdk::prelude::{Event, Keys, Kind, PublicKey, Tag, Timestamp, UnsignedEvent};
use tracing::warn;

use crate::error::{sanitize_error_for_client, Nip46Error, Result};
use crate::session::Session;
use crate::signer::Signer;
use crate::types::{Method, PartialEvent, Request, Response};

/// Longest accepted gap between now and a `sign_event` template's
/// `created_at`.
pub const MAX_FUTURE_CREATED_AT_SECS: u64 = 86_400;

#[derive(Debug, Clone)]
pub struct HandledRequest {
    pub request: Request,
    pub response: Response,
    /// The response, encrypted, addressed to the sender and signed by the
    /// local identity. Publishing it is the caller's job.
    pub event: Event,
}

#[async_trait]
pub trait RequestHandler: Send + Sync {
    /// Process one inbound kind 24133 event.
    ///
    /// # Errors
    ///
    /// [`Nip46Error::UnknownRecipient`] when no `p` tag names a local
    /// identity, [`Nip46Error::MalformedRequest`] when the content cannot be
    /// decrypted or decoded. No response exists in either case. Every other
    /// failure is reported inside the returned response.
    async fn handle_request(&self, event: &Event) -> Result<HandledRequest>;
}

/// Public keys named by an event's `p` tags, in tag order.
pub fn tagged_recipients(event: &Event) -> Vec<PublicKey> {
    event
        .tags
        .iter()
        .filter_map(|tag| match tag.as_slice() {
            [name, value, ..] if name == "p" => PublicKey::from_hex(value).ok(),
            _ => None,
        })
        .collect()
}

pub(crate) fn check_kind(event: &Event) -> Result<()> {
    if event.kind != Kind::NostrConnect {
        return Err(Nip46Error::malformed_request(format!(
            "unexpected kind {}",
            event.kind.as_u16()
        )));
    }
    Ok(())
}

/// A request whose params have been checked and decoded.
#[derive(Debug, Clone)]
pub(crate) enum Operation {
    Connect {
        remote_id: Option<PublicKey>,
        secret: Option<String>,
    },
    GetPublicKey,
    SignEvent(UnsignedEvent),
    Encrypt {
        method: Method,
        peer: PublicKey,
        text: String,
    },
    Ping,
}

impl Operation {
    pub(crate) fn method(&self) -> Method {
        match self {
            Self::Connect { .. } => Method::Connect,
            Self::GetPublicKey => Method::GetPublicKey,
            Self::SignEvent(_) => Method::SignEvent,
            Self::Encrypt { method, .. } => *method,
            Self::Ping => Method::Ping,
        }
    }

    pub(crate) fn secret(&self) -> Option<&str> {
        match self {
            Self::Connect { secret, .. } => secret.as_deref(),
            _ => None,
        }
    }

    /// Decode params for `method`. `user` becomes the pubkey of any event
    /// template.
    pub(crate) fn parse(request: &Request, user: &PublicKey) -> Result<Self> {
        let method: Method = request.method.parse()?;
        let params = &request.params;

        match method {
            Method::Connect => {
                if params.is_empty() || params.len() > 3 {
                    return Err(Nip46Error::invalid_params(
                        "connect expects [remote_id, secret?, permissions?]",
                    ));
                }
                let remote_id = match params[0].as_str() {
                    "" => None,
                    hex => Some(
                        PublicKey::from_hex(hex)
                            .map_err(|_| Nip46Error::invalid_params("Invalid remote id"))?,
                    ),
                };
                let secret = params.get(1).filter(|s| !s.is_empty()).cloned();
                Ok(Self::Connect { remote_id, secret })
            }
            Method::GetPublicKey => {
                expect_arity(method, params, 0)?;
                Ok(Self::GetPublicKey)
            }
            Method::Ping => {
                expect_arity(method, params, 0)?;
                Ok(Self::Ping)
            }
            Method::SignEvent => {
                expect_arity(method, params, 1)?;
                Ok(Self::SignEvent(parse_event_template(&params[0], user)?))
            }
            Method::Nip44Encrypt
            | Method::Nip44Decrypt
            | Method::Nip04Encrypt
            | Method::Nip04Decrypt => {
                expect_arity(method, params, 2)?;
                let peer = PublicKey::from_hex(&params[0])
                    .map_err(|_| Nip46Error::invalid_params("Invalid pubkey"))?;
                Ok(Self::Encrypt {
                    method,
                    peer,
                    text: params[1].clone(),
                })
            }
        }
    }
}

fn expect_arity(method: Method, params: &[String], expected: usize) -> Result<()> {
    if params.len() != expected {
        return Err(Nip46Error::invalid_params(format!(
            "{method} expects {expected} params, got {}",
            params.len()
        )));
    }
    Ok(())
}

fn parse_event_template(json: &str, user: &PublicKey) -> Result<UnsignedEvent> {
    let partial: PartialEvent = serde_json::from_str(json)
        .map_err(|_| Nip46Error::invalid_params("Invalid event format"))?;

    if partial.created_at < 0 {
        return Err(Nip46Error::invalid_params("Invalid created_at timestamp"));
    }
    let max_future = Timestamp::now().as_u64() + MAX_FUTURE_CREATED_AT_SECS;
    if partial.created_at as u64 > max_future {
        return Err(Nip46Error::invalid_params(
            "created_at timestamp too far in the future",
        ));
    }

    let mut tags = Vec::with_capacity(partial.tags.len());
    for t in &partial.tags {
        let tag = Tag::parse(t).map_err(|_| Nip46Error::invalid_params("Invalid tag in event"))?;
        tags.push(tag);
    }

    Ok(UnsignedEvent::new(
        *user,
        Timestamp::from(partial.created_at as u64),
        Kind::from(partial.kind),
        tags,
        partial.content,
    ))
}

/// Identities a request is answered for.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Identities {
    /// Key that encrypts and signs the transport events.
    pub transport: PublicKey,
    /// Key whose signatures and ciphertexts the caller asks for.
    pub user: PublicKey,
}

#[derive(Debug, Default)]
pub(crate) struct Outcome {
    pub result: String,
    pub signed: Option<Event>,
}

impl Outcome {
    fn text(result: impl Into<String>) -> Self {
        Self {
            result: result.into(),
            signed: None,
        }
    }
}

pub(crate) async fn perform(
    operation: &Operation,
    signer: &dyn Signer,
    identities: &Identities,
) -> Result<Outcome> {
    match operation {
        Operation::Connect { remote_id, .. } => {
            if let Some(id) = remote_id {
                if *id != identities.transport && *id != identities.user {
                    return Err(Nip46Error::invalid_params(
                        "remote id does not name this signer",
                    ));
                }
            }
            Ok(Outcome::text("ack"))
        }
        Operation::GetPublicKey => Ok(Outcome::text(identities.user.to_hex())),
        Operation::Ping => Ok(Outcome::text("pong")),
        Operation::SignEvent(unsigned) => {
            let event = signer.sign_event(unsigned.clone()).await?;
            Ok(Outcome {
                result: serde_json::to_string(&event)?,
                signed: Some(event),
            })
        }
        Operation::Encrypt { method, peer, text } => {
            let result = match method {
                Method::Nip44Encrypt => signer.nip44_encrypt(peer, text).await?,
                Method::Nip44Decrypt => signer.nip44_decrypt(peer, text).await?,
                Method::Nip04Encrypt => signer.nip04_encrypt(peer, text).await?,
                Method::Nip04Decrypt => signer.nip04_decrypt(peer, text).await?,
                other => {
                    return Err(Nip46Error::UnknownMethod(other.to_string()));
                }
            };
            Ok(Outcome::text(result))
        }
    }
}

/// Build, encrypt, wrap and sign the response for `request`.
pub(crate) fn respond(
    session: &Session,
    keys: &Keys,
    request: Request,
    outcome: Result<String>,
) -> Result<HandledRequest> {
    let response = match outcome {
        Ok(result) => Response::ok(request.id.clone(), result),
        Err(e) => {
            warn!(error = %e, method = %request.method, "request failed");
            Response::error(request.id.clone(), sanitize_error_for_client(&e))
        }
    };
    let event = session.seal(keys, &response)?;
    Ok(HandledRequest {
        request,
        response,
        event,
    })
}
