// SPDX-FileCopyrightText: © 2026 PrivKey LLC
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Pub/sub relay transport used by both sides of the bunker protocol.
mod memory;
mod nostr;

pub use self::memory::MemoryRelayPool;
pub use self::nostr::NostrRelayPool;

use async_trait::async_trait;
use nostr_sdk::prelude::{Event, Kind, PublicKey, Timestamp};
use tokio::sync::mpsc;

use crate::backend::tagged_recipients;
use crate::error::Result;

/// Capacity of the channel returned by [`RelayPool::subscribe`].
pub const SUBSCRIPTION_BUFFER: usize = 256;

#[async_trait]
pub trait RelayPool: Send + Sync {
    /// Open (or reuse) a connection to `url`.
    async fn ensure_relay(&self, url: &str) -> Result<()>;

    /// Publish to one relay. `Ok` means the relay accepted the event.
    async fn publish(&self, url: &str, event: &Event) -> Result<()>;

    /// Stream kind 24133 events `p`-tagged to `recipient`, created at or
    /// after `since`, from any of `relays`. Events seen on more than one
    /// relay may be delivered more than once.
    async fn subscribe(
        &self,
        relays: &[String],
        recipient: PublicKey,
        since: Timestamp,
    ) -> Result<mpsc::Receiver<Event>>;
}

pub(crate) fn is_addressed_to(event: &Event, recipient: &PublicKey) -> bool {
    event.kind == Kind::NostrConnect && tagged_recipients(event).contains(recipient)
}
