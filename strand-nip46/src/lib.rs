// SPDX-FileCopyrightText: © 2026 PrivKey LLC
// SPDX-License-Identifier: AGPL-3.0-or-later

//! NIP-46 remote signing over NIP-44 encrypted relay messages.
//!
//! Responders implement [`RequestHandler`] ([`StaticKeySigner`] for one key,
//! [`DynamicSigner`] for many) and are driven by a [`Server`]. Initiators
//! talk to a bunker through [`BunkerClient`], which is itself a [`Signer`].

#![forbid(unsafe_code)]

pub mod audit;
pub mod backend;
pub mod bunker;
pub mod client;
pub mod error;
pub mod policy;
pub mod server;
pub mod session;
pub mod signer;
pub mod transport;
pub mod types;

pub use audit::{AuditAction, AuditEntry, AuditLog};
pub use backend::{DynamicSigner, HandledRequest, KeyResolver, RequestHandler, StaticKeySigner};
pub use bunker::{BunkerLocator, BunkerUri, Nip05Profile, Nip05Resolver};
pub use client::{AuthUrlHandler, BunkerClient, ClientConfig};
pub use error::{Nip46Error, Result};
pub use policy::{
    AllowAll, AuthorizationPolicy, AuthorizationRequest, DynamicPolicy, EncryptionRequest,
    Permission, PermissionPolicy, SignatureObserver, SignatureRecord, SigningRequest,
};
pub use server::{Server, ServerConfig};
pub use session::{Session, SessionMap};
pub use signer::{KeySigner, Signer};
pub use transport::{MemoryRelayPool, NostrRelayPool, RelayPool};
pub use types::{Method, PartialEvent, Request, Response};
