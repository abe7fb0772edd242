// SPDX-FileCopyrightText: © 2026 PrivKey LLC
// SPDX-License-Identifier: AGPL-3.0-or-later
use thiserror::Error;

/// Failures of a single key derivation, encryption, or decryption.
///
/// Every variant is terminal for the message it was raised on. Nothing in
/// this crate retries.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CryptoError {
    #[error("Invalid key: {0}")]
    InvalidKey(String),

    #[error("Plaintext is empty")]
    EmptyPlaintext,

    #[error("Plaintext too large ({0} bytes)")]
    MessageTooLarge(usize),

    #[error("Unsupported encryption version")]
    UnsupportedVersion,

    #[error("Malformed envelope: {0}")]
    MalformedEnvelope(String),

    #[error("Authentication failed")]
    AuthenticationFailed,

    #[error("Invalid padding")]
    InvalidPadding,

    #[error("Key derivation failed: {0}")]
    KeyDerivation(String),
}

impl CryptoError {
    pub fn invalid_key(msg: impl Into<String>) -> Self {
        Self::InvalidKey(msg.into())
    }

    pub fn malformed(msg: impl Into<String>) -> Self {
        Self::MalformedEnvelope(msg.into())
    }

    pub fn key_derivation(msg: impl Into<String>) -> Self {
        Self::KeyDerivation(msg.into())
    }
}

pub type Result<T> = std::result::Result<T, CryptoError>;
