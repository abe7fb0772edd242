// SPDX-FileCopyrightText: © 2026 PrivKey LLC
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Strand Core - encryption primitives for Nostr remote signing
//!
//! This crate provides:
//! - NIP-44 v2 key agreement (secp256k1 ECDH + HKDF)
//! - The versioned authenticated payload cipher (ChaCha20 + HMAC-SHA256)
//! - Relay URL validation shared by clients and responders

#![forbid(unsafe_code)]

pub mod crypto;
pub mod error;
pub mod nip44;
pub mod relay;

pub use error::{CryptoError, Result};
pub use nip44::ConversationKey;
