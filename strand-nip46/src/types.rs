// SPDX-FileCopyrightText: © 2026 PrivKey LLC
// SPDX-License-Identifier: AGPL-3.0-or-later
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize};

use crate::error::{Nip46Error, Result};

/// Longest request id accepted from a client.
pub const MAX_REQUEST_ID_LEN: usize = 64;

/// Most params a single request may carry.
pub const MAX_PARAMS: usize = 10;

/// Upper bound on decrypted request content.
pub const DEFAULT_MAX_CONTENT_SIZE: usize = 64 * 1024;

/// `result` value marking an out-of-band authorization challenge.
pub const AUTH_URL_RESULT: &str = "auth_url";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Request {
    pub id: String,
    pub method: String,
    #[serde(default)]
    pub params: Vec<String>,
}

impl Request {
    pub fn new(id: impl Into<String>, method: impl Into<String>, params: Vec<String>) -> Self {
        Self {
            id: id.into(),
            method: method.into(),
            params,
        }
    }

    /// Structural checks applied before a request is dispatched.
    pub fn validate(&self) -> Result<()> {
        if !is_valid_request_id(&self.id) {
            return Err(Nip46Error::malformed_request("invalid request ID"));
        }
        if self.params.len() > MAX_PARAMS {
            return Err(Nip46Error::malformed_request("too many request params"));
        }
        Ok(())
    }
}

pub fn is_valid_request_id(id: &str) -> bool {
    !id.is_empty()
        && id.len() <= MAX_REQUEST_ID_LEN
        && id
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_')
}

/// RPC response. An empty string means the field is absent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Response {
    pub id: String,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub result: String,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub error: String,
}

fn null_as_empty<'de, D>(deserializer: D) -> std::result::Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<String>::deserialize(deserializer)?.unwrap_or_default())
}

impl Response {
    pub fn ok(id: impl Into<String>, result: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            result: result.into(),
            error: String::new(),
        }
    }

    pub fn error(id: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            result: String::new(),
            error: error.into(),
        }
    }

    pub fn is_error(&self) -> bool {
        !self.error.is_empty()
    }

    pub fn is_auth_url(&self) -> bool {
        self.result == AUTH_URL_RESULT
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    Connect,
    GetPublicKey,
    SignEvent,
    Nip44Encrypt,
    Nip44Decrypt,
    Nip04Encrypt,
    Nip04Decrypt,
    Ping,
}

impl Method {
    pub const ALL: [Method; 8] = [
        Method::Connect,
        Method::GetPublicKey,
        Method::SignEvent,
        Method::Nip44Encrypt,
        Method::Nip44Decrypt,
        Method::Nip04Encrypt,
        Method::Nip04Decrypt,
        Method::Ping,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Connect => "connect",
            Self::GetPublicKey => "get_public_key",
            Self::SignEvent => "sign_event",
            Self::Nip44Encrypt => "nip44_encrypt",
            Self::Nip44Decrypt => "nip44_decrypt",
            Self::Nip04Encrypt => "nip04_encrypt",
            Self::Nip04Decrypt => "nip04_decrypt",
            Self::Ping => "ping",
        }
    }

    /// Methods that reveal nothing and act on nothing sensitive.
    pub fn is_harmless(&self) -> bool {
        matches!(self, Self::Connect | Self::GetPublicKey | Self::Ping)
    }

    pub fn is_encryption(&self) -> bool {
        matches!(
            self,
            Self::Nip44Encrypt | Self::Nip44Decrypt | Self::Nip04Encrypt | Self::Nip04Decrypt
        )
    }
}

impl FromStr for Method {
    type Err = Nip46Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|m| m.as_str() == s)
            .ok_or_else(|| Nip46Error::UnknownMethod(s.to_string()))
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Unsigned event template carried by `sign_event`. Any `pubkey` or `id`
/// field is ignored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartialEvent {
    pub kind: u16,
    pub content: String,
    #[serde(default)]
    pub tags: Vec<Vec<String>>,
    pub created_at: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_response_null_fields_decode_as_empty() {
        let r: Response = serde_json::from_str(r#"{"id":"a","result":null,"error":null}"#).unwrap();
        assert_eq!(r.result, "");
        assert_eq!(r.error, "");

        let r: Response = serde_json::from_str(r#"{"id":"a","result":"pong"}"#).unwrap();
        assert_eq!(r.result, "pong");
        assert!(!r.is_error());
    }

    #[test]
    fn test_response_always_encodes_both_fields() {
        let json = serde_json::to_string(&Response::ok("1", "ack")).unwrap();
        assert_eq!(json, r#"{"id":"1","result":"ack","error":""}"#);
    }

    #[test]
    fn test_request_params_default_to_empty() {
        let r: Request = serde_json::from_str(r#"{"id":"x","method":"ping"}"#).unwrap();
        assert!(r.params.is_empty());
    }

    #[test]
    fn test_request_id_validation() {
        assert!(is_valid_request_id("a1b2c3d4-17"));
        assert!(is_valid_request_id("req_1"));
        assert!(!is_valid_request_id(""));
        assert!(!is_valid_request_id("has space"));
        assert!(!is_valid_request_id("semi;colon"));
        assert!(!is_valid_request_id(&"a".repeat(MAX_REQUEST_ID_LEN + 1)));
        assert!(is_valid_request_id(&"a".repeat(MAX_REQUEST_ID_LEN)));
    }

    #[test]
    fn test_request_validate_param_count() {
        let ok = Request::new("1", "ping", vec![String::new(); MAX_PARAMS]);
        assert!(ok.validate().is_ok());
        let too_many = Request::new("1", "ping", vec![String::new(); MAX_PARAMS + 1]);
        assert!(matches!(
            too_many.validate(),
            Err(Nip46Error::MalformedRequest(_))
        ));
    }

    #[test]
    fn test_method_classes() {
        for m in Method::ALL {
            assert_eq!(m.as_str().parse::<Method>().unwrap(), m);
        }
        assert!(Method::Ping.is_harmless());
        assert!(Method::Connect.is_harmless());
        assert!(Method::GetPublicKey.is_harmless());
        assert!(!Method::SignEvent.is_harmless());
        assert!(!Method::Nip04Decrypt.is_harmless());
        assert!(Method::Nip44Encrypt.is_encryption());
        assert!(matches!(
            "switch_relays".parse::<Method>(),
            Err(Nip46Error::UnknownMethod(m)) if m == "switch_relays"
        ));
    }

    #[test]
    fn test_partial_event_ignores_pubkey() {
        let json = r#"{"kind":1,"content":"hi","tags":[["t","x"]],"created_at":5,"pubkey":"ff"}"#;
        let p: PartialEvent = serde_json::from_str(json).unwrap();
        assert_eq!(p.kind, 1);
        assert_eq!(p.tags, vec![vec!["t".to_string(), "x".to_string()]]);
    }
}
