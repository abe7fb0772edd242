// SPDX-FileCopyrightText: © 2026 PrivKey LLC
// SPDX-License-Identifier: AGPL-3.0-or-later
use std::fmt;
use std::str::FromStr;

use async_trait::async_trait;
use nostr_sdk::prelude::PublicKey;
use strand_core::relay::{dedup_relays, validate_relay_url, MAX_RELAYS};

use crate::error::{Nip46Error, Result};

pub const BUNKER_SCHEME: &str = "bunker://";

/// Direct locator: `bunker://<hex>?relay=..&relay=..&secret=..`.
#[derive(Clone, PartialEq, Eq)]
pub struct BunkerUri {
    pub remote: PublicKey,
    pub relays: Vec<String>,
    pub secret: Option<String>,
}

impl BunkerUri {
    pub fn new(remote: PublicKey, relays: Vec<String>) -> Self {
        Self {
            remote,
            relays,
            secret: None,
        }
    }

    pub fn with_secret(mut self, secret: impl Into<String>) -> Self {
        self.secret = Some(secret.into());
        self
    }

    pub fn parse(uri: &str) -> Result<Self> {
        if !uri.starts_with(BUNKER_SCHEME) {
            return Err(Nip46Error::invalid_uri("must start with bunker://"));
        }
        let url = url::Url::parse(uri).map_err(|e| Nip46Error::invalid_uri(e.to_string()))?;

        let pubkey_hex = url
            .host_str()
            .ok_or_else(|| Nip46Error::invalid_uri("missing pubkey"))?;
        let remote = PublicKey::from_hex(pubkey_hex)
            .map_err(|e| Nip46Error::invalid_uri(format!("invalid pubkey: {e}")))?;

        let mut relays = Vec::new();
        let mut secret = None;
        for (key, value) in url.query_pairs() {
            match key.as_ref() {
                "relay" => relays.push(value.to_string()),
                "secret" if !value.is_empty() => secret = Some(value.to_string()),
                _ => {}
            }
        }

        let relays = check_relays(relays)?;
        Ok(Self {
            remote,
            relays,
            secret,
        })
    }
}

fn check_relays(relays: Vec<String>) -> Result<Vec<String>> {
    let relays = dedup_relays(relays);
    if relays.is_empty() {
        return Err(Nip46Error::invalid_uri("at least one relay required"));
    }
    if relays.len() > MAX_RELAYS {
        return Err(Nip46Error::invalid_uri(format!(
            "too many relays (max {MAX_RELAYS})"
        )));
    }
    for relay in &relays {
        validate_relay_url(relay, true)
            .map_err(|e| Nip46Error::invalid_uri(format!("{relay}: {e}")))?;
    }
    Ok(relays)
}

impl FromStr for BunkerUri {
    type Err = Nip46Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl fmt::Display for BunkerUri {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{BUNKER_SCHEME}{}", self.remote.to_hex())?;
        for (i, relay) in self.relays.iter().enumerate() {
            let sep = if i == 0 { '?' } else { '&' };
            write!(f, "{sep}relay={}", urlencoding::encode(relay))?;
        }
        if let Some(secret) = &self.secret {
            let sep = if self.relays.is_empty() { '?' } else { '&' };
            write!(f, "{sep}secret={}", urlencoding::encode(secret))?;
        }
        Ok(())
    }
}

impl fmt::Debug for BunkerUri {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BunkerUri")
            .field("remote", &self.remote)
            .field("relays", &self.relays)
            .field("secret", &self.secret.as_ref().map(|_| "[REDACTED]"))
            .finish()
    }
}

/// Identity and relays published for a NIP-05 name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Nip05Profile {
    pub public_key: PublicKey,
    pub relays: Vec<String>,
}

/// Looks up `name@domain` identifiers. Network access lives with the
/// implementor.
#[async_trait]
pub trait Nip05Resolver: Send + Sync {
    async fn resolve(&self, name: &str, domain: &str) -> Result<Nip05Profile>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BunkerLocator {
    Direct(BunkerUri),
    Nip05 { name: String, domain: String },
}

impl BunkerLocator {
    pub fn parse(input: &str) -> Result<Self> {
        let input = input.trim();
        if input.starts_with(BUNKER_SCHEME) {
            return BunkerUri::parse(input).map(Self::Direct);
        }

        let (name, domain) = input
            .split_once('@')
            .ok_or_else(|| Nip46Error::invalid_uri("expected bunker:// URI or name@domain"))?;
        let valid_name = !name.is_empty()
            && name
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'));
        let valid_domain = domain.contains('.')
            && !domain.starts_with('.')
            && !domain.ends_with('.')
            && domain
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '.'));
        if !valid_name || !valid_domain {
            return Err(Nip46Error::invalid_uri(format!("invalid NIP-05 address: {input}")));
        }

        Ok(Self::Nip05 {
            name: name.to_ascii_lowercase(),
            domain: domain.to_ascii_lowercase(),
        })
    }

    /// Turn the locator into a connectable [`BunkerUri`]. NIP-05 lookups
    /// never carry a secret.
    pub async fn resolve(self, resolver: &dyn Nip05Resolver) -> Result<BunkerUri> {
        match self {
            Self::Direct(uri) => Ok(uri),
            Self::Nip05 { name, domain } => {
                let profile = resolver.resolve(&name, &domain).await?;
                let relays = check_relays(profile.relays).map_err(|e| {
                    Nip46Error::Resolution(format!("{name}@{domain}: {e}"))
                })?;
                Ok(BunkerUri::new(profile.public_key, relays))
            }
        }
    }
}

impl FromStr for BunkerLocator {
    type Err = Nip46Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nostr_sdk::prelude::Keys;

    const RELAY: &str = "wss://relay.damus.io";

    struct Fixed(Nip05Profile);

    #[async_trait]
    impl Nip05Resolver for Fixed {
        async fn resolve(&self, name: &str, domain: &str) -> Result<Nip05Profile> {
            assert_eq!((name, domain), ("bob", "example.com"));
            Ok(self.0.clone())
        }
    }

    #[test]
    fn test_bunker_uri_roundtrip() {
        let pubkey = Keys::generate().public_key();
        let uri = BunkerUri::new(pubkey, vec![RELAY.into(), "wss://nos.lol".into()])
            .with_secret("mysecret");

        let parsed: BunkerUri = uri.to_string().parse().unwrap();
        assert_eq!(parsed, uri);
    }

    #[test]
    fn test_bunker_uri_secret_with_special_chars() {
        let pubkey = Keys::generate().public_key();
        let secret = "pass&word=special chars+more";
        let uri = BunkerUri::new(pubkey, vec![RELAY.into()]).with_secret(secret);

        let rendered = uri.to_string();
        assert!(!rendered.contains("pass&word"));
        assert_eq!(
            BunkerUri::parse(&rendered).unwrap().secret.as_deref(),
            Some(secret)
        );
    }

    #[test]
    fn test_bunker_uri_rejects() {
        let hex = Keys::generate().public_key().to_hex();
        assert!(BunkerUri::parse(&format!("nostrconnect://{hex}?relay={RELAY}")).is_err());
        assert!(BunkerUri::parse(&format!("bunker://{hex}")).is_err());
        assert!(BunkerUri::parse(&format!("bunker://{hex}?relay=https://x.com")).is_err());
        assert!(BunkerUri::parse(&format!("bunker://nothex?relay={RELAY}")).is_err());

        let many: String = (0..=MAX_RELAYS)
            .map(|i| format!("&relay=wss://r{i}.example.com"))
            .collect();
        assert!(BunkerUri::parse(&format!("bunker://{hex}?x=1{many}")).is_err());
    }

    #[test]
    fn test_debug_redacts_secret() {
        let uri = BunkerUri::new(Keys::generate().public_key(), vec![RELAY.into()])
            .with_secret("topsecret");
        assert!(!format!("{uri:?}").contains("topsecret"));
    }

    #[test]
    fn test_locator_parse() {
        let hex = Keys::generate().public_key().to_hex();
        assert!(matches!(
            BunkerLocator::parse(&format!("bunker://{hex}?relay={RELAY}")),
            Ok(BunkerLocator::Direct(_))
        ));
        assert_eq!(
            BunkerLocator::parse("Bob@Example.com").unwrap(),
            BunkerLocator::Nip05 {
                name: "bob".into(),
                domain: "example.com".into()
            }
        );
        for bad in ["bob", "@example.com", "bob@localhost", "bob@exa mple.com", "a@b@c.com"] {
            assert!(BunkerLocator::parse(bad).is_err(), "{bad}");
        }
    }

    #[tokio::test]
    async fn test_locator_resolve_nip05_has_no_secret() {
        let pubkey = Keys::generate().public_key();
        let resolver = Fixed(Nip05Profile {
            public_key: pubkey,
            relays: vec![RELAY.into()],
        });

        let uri = BunkerLocator::parse("bob@example.com")
            .unwrap()
            .resolve(&resolver)
            .await
            .unwrap();
        assert_eq!(uri.remote, pubkey);
        assert_eq!(uri.relays, vec![RELAY.to_string()]);
        assert!(uri.secret.is_none());
    }

    #[tokio::test]
    async fn test_locator_resolve_requires_relays() {
        let resolver = Fixed(Nip05Profile {
            public_key: Keys::generate().public_key(),
            relays: vec![],
        });
        let result = BunkerLocator::parse("bob@example.com")
            .unwrap()
            .resolve(&resolver)
            .await;
        assert!(matches!(result, Err(Nip46Error::Resolution(_))));
    }
}
