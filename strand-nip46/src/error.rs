// SPDX-FileCopyrightText: © 2026 PrivKey LLC
// SPDX-License-Identifier: AGPL-3.0-or-later
use strand_core::CryptoError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Nip46Error {
    #[error("Crypto error: {0}")]
    Crypto(#[from] CryptoError),

    #[error("Event is not addressed to a known local identity")]
    UnknownRecipient,

    #[error("Malformed request: {0}")]
    MalformedRequest(String),

    #[error("Malformed response: {0}")]
    MalformedResponse(String),

    #[error("Unknown method: {0}")]
    UnknownMethod(String),

    #[error("Invalid params: {0}")]
    InvalidParams(String),

    #[error("Unauthorized")]
    Unauthorized,

    #[error("No relay could be reached")]
    NoReachableEndpoint,

    #[error("No relay accepted the request")]
    TargetUnreachable,

    #[error("Request cancelled")]
    Cancelled,

    #[error("Remote signer error: {0}")]
    RemoteError(String),

    #[error("Invalid bunker URI: {0}")]
    InvalidBunkerUri(String),

    #[error("Resolution failed: {0}")]
    Resolution(String),

    #[error("Signing failed: {0}")]
    Signing(String),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Nip46Error {
    pub fn malformed_request(msg: impl Into<String>) -> Self {
        Self::MalformedRequest(msg.into())
    }

    pub fn invalid_params(msg: impl Into<String>) -> Self {
        Self::InvalidParams(msg.into())
    }

    pub fn signing(msg: impl Into<String>) -> Self {
        Self::Signing(msg.into())
    }

    pub fn transport(msg: impl Into<String>) -> Self {
        Self::Transport(msg.into())
    }

    pub fn invalid_uri(msg: impl Into<String>) -> Self {
        Self::InvalidBunkerUri(msg.into())
    }
}

pub type Result<T> = std::result::Result<T, Nip46Error>;

/// Text placed in the `error` field of a response.
///
/// Parameter and method errors name the offending input; everything else is
/// reduced to a category so internal details do not leak to the caller.
pub(crate) fn sanitize_error_for_client(e: &Nip46Error) -> String {
    let text = match e {
        Nip46Error::InvalidParams(msg) => return msg.clone(),
        Nip46Error::UnknownMethod(method) => return format!("Unknown method: {method}"),
        Nip46Error::RemoteError(msg) => return msg.clone(),
        Nip46Error::Unauthorized => "Unauthorized",
        Nip46Error::Crypto(CryptoError::InvalidKey(_)) => "Invalid key",
        Nip46Error::Crypto(CryptoError::EmptyPlaintext) => "Empty plaintext",
        Nip46Error::Crypto(CryptoError::MessageTooLarge(_)) => "Message too large",
        Nip46Error::Crypto(
            CryptoError::UnsupportedVersion
            | CryptoError::MalformedEnvelope(_)
            | CryptoError::AuthenticationFailed
            | CryptoError::InvalidPadding,
        ) => "Decryption failed",
        Nip46Error::Crypto(CryptoError::KeyDerivation(_)) => "Cryptographic operation failed",
        Nip46Error::Signing(_) => "Signing failed",
        Nip46Error::Resolution(_) | Nip46Error::UnknownRecipient => "Identity not available",
        Nip46Error::NoReachableEndpoint
        | Nip46Error::TargetUnreachable
        | Nip46Error::Cancelled
        | Nip46Error::Transport(_) => "Network error",
        Nip46Error::MalformedRequest(_)
        | Nip46Error::MalformedResponse(_)
        | Nip46Error::InvalidBunkerUri(_) => "Invalid input",
        Nip46Error::Json(_) => "Data format error",
    };
    text.to_string()
}
