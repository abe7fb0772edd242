// SPDX-FileCopyrightText: © 2026 PrivKey LLC
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Authorization strategies for the signer backends.
//!
//! A backend constructed without a policy uses [`AllowAll`].
use std::collections::hash_map::Entry;
use std::collections::HashMap;

use nostr_sdk::prelude::{Event, PublicKey, Timestamp, UnsignedEvent};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;
use tracing::{debug, info, warn};
use zeroize::Zeroizing;

use crate::types::Method;

/// What the static-key backend asks its policy about.
#[derive(Debug, Clone, Copy)]
pub struct AuthorizationRequest<'a> {
    pub method: Method,
    pub harmless: bool,
    pub remote: &'a PublicKey,
    /// Shared secret presented with `connect`; `None` for other methods.
    pub secret: Option<&'a str>,
    pub params: &'a [String],
}

/// Allow or refuse a request whose result has already been computed.
pub trait AuthorizationPolicy: Send + Sync {
    fn authorize(&self, request: &AuthorizationRequest<'_>) -> bool;
}

impl<F> AuthorizationPolicy for F
where
    F: Fn(&AuthorizationRequest<'_>) -> bool + Send + Sync,
{
    fn authorize(&self, request: &AuthorizationRequest<'_>) -> bool {
        self(request)
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct AllowAll;

impl AuthorizationPolicy for AllowAll {
    fn authorize(&self, _request: &AuthorizationRequest<'_>) -> bool {
        true
    }
}

#[derive(Debug, Clone, Copy)]
pub struct SigningRequest<'a> {
    pub remote: &'a PublicKey,
    /// Local identity the request was addressed to.
    pub local: &'a PublicKey,
    pub user: &'a PublicKey,
    pub event: &'a UnsignedEvent,
}

#[derive(Debug, Clone, Copy)]
pub struct EncryptionRequest<'a> {
    pub method: Method,
    pub remote: &'a PublicKey,
    pub local: &'a PublicKey,
    pub user: &'a PublicKey,
    pub peer: &'a PublicKey,
}

/// Independent gates for signing and encryption in the multi-tenant backend.
/// Both default to allow.
pub trait DynamicPolicy: Send + Sync {
    fn authorize_signing(&self, _request: &SigningRequest<'_>) -> bool {
        true
    }

    fn authorize_encryption(&self, _request: &EncryptionRequest<'_>) -> bool {
        true
    }
}

impl DynamicPolicy for AllowAll {}

#[derive(Debug, Clone, Copy)]
pub struct SignatureRecord<'a> {
    pub remote: &'a PublicKey,
    pub local: &'a PublicKey,
    pub event: &'a Event,
}

/// Notified after every successful signature. Cannot veto.
pub trait SignatureObserver: Send + Sync {
    fn on_signature(&self, record: &SignatureRecord<'_>);
}

bitflags::bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
    pub struct Permission: u32 {
        const GET_PUBLIC_KEY = 0b00000001;
        const SIGN_EVENT     = 0b00000010;
        const NIP04_ENCRYPT  = 0b00000100;
        const NIP04_DECRYPT  = 0b00001000;
        const NIP44_ENCRYPT  = 0b00010000;
        const NIP44_DECRYPT  = 0b00100000;

        const DEFAULT = Self::GET_PUBLIC_KEY.bits();

        const ALL = Self::GET_PUBLIC_KEY.bits()
                  | Self::SIGN_EVENT.bits()
                  | Self::NIP04_ENCRYPT.bits()
                  | Self::NIP04_DECRYPT.bits()
                  | Self::NIP44_ENCRYPT.bits()
                  | Self::NIP44_DECRYPT.bits();
    }
}

impl Permission {
    /// Bit required for a method, `None` for methods that need none.
    pub fn for_method(method: Method) -> Option<Self> {
        match method {
            Method::Connect | Method::Ping => None,
            Method::GetPublicKey => Some(Self::GET_PUBLIC_KEY),
            Method::SignEvent => Some(Self::SIGN_EVENT),
            Method::Nip04Encrypt => Some(Self::NIP04_ENCRYPT),
            Method::Nip04Decrypt => Some(Self::NIP04_DECRYPT),
            Method::Nip44Encrypt => Some(Self::NIP44_ENCRYPT),
            Method::Nip44Decrypt => Some(Self::NIP44_DECRYPT),
        }
    }
}

/// Parse the `"sign_event:1,nip44_encrypt"` form sent as the third
/// `connect` param. Kind qualifiers are accepted and ignored.
pub fn parse_permission_string(perms: &str) -> Permission {
    let mut result = Permission::empty();
    for part in perms.split(',') {
        let name = part.split(':').next().unwrap_or_default().trim();
        match name {
            "get_public_key" => result |= Permission::GET_PUBLIC_KEY,
            "sign_event" => result |= Permission::SIGN_EVENT,
            "nip04_encrypt" => result |= Permission::NIP04_ENCRYPT,
            "nip04_decrypt" => result |= Permission::NIP04_DECRYPT,
            "nip44_encrypt" => result |= Permission::NIP44_ENCRYPT,
            "nip44_decrypt" => result |= Permission::NIP44_DECRYPT,
            _ => {}
        }
    }
    if result.is_empty() {
        Permission::DEFAULT
    } else {
        result | Permission::GET_PUBLIC_KEY
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppPermission {
    pub pubkey: PublicKey,
    pub permissions: Permission,
    pub connected_at: Timestamp,
    pub last_used: Timestamp,
    pub request_count: u64,
}

impl AppPermission {
    pub fn new(pubkey: PublicKey, permissions: Permission) -> Self {
        Self {
            pubkey,
            permissions: permissions & Permission::ALL,
            connected_at: Timestamp::now(),
            last_used: Timestamp::now(),
            request_count: 0,
        }
    }
}

/// Stateful [`AuthorizationPolicy`]: apps must `connect` first, optionally
/// with a shared secret, and are then scoped to the permissions they asked
/// for. Harmless methods always pass.
pub struct PermissionPolicy {
    apps: Mutex<HashMap<PublicKey, AppPermission>>,
    expected_secret: Option<Zeroizing<String>>,
    auto_grant: Option<Permission>,
}

impl PermissionPolicy {
    pub const MAX_CONNECTED_APPS: usize = 100;

    pub fn new() -> Self {
        Self {
            apps: Mutex::new(HashMap::new()),
            expected_secret: None,
            auto_grant: None,
        }
    }

    pub fn with_expected_secret(mut self, secret: impl Into<String>) -> Self {
        self.expected_secret = Some(Zeroizing::new(secret.into()));
        self
    }

    /// Grant these permissions on connect regardless of what the app asks for.
    pub fn with_auto_grant(mut self, permissions: Permission) -> Self {
        self.auto_grant = Some(permissions & Permission::ALL);
        self
    }

    fn secret_matches(&self, provided: Option<&str>) -> bool {
        let Some(expected) = &self.expected_secret else {
            return true;
        };
        let Some(provided) = provided else {
            return false;
        };
        let expected_hash = Sha256::digest(expected.as_bytes());
        let provided_hash = Sha256::digest(provided.as_bytes());
        provided_hash.ct_eq(&expected_hash).into()
    }

    fn connect(&self, request: &AuthorizationRequest<'_>) -> bool {
        let app_id = &request.remote.to_hex()[..8];
        if !self.secret_matches(request.secret) {
            warn!(app_id, "connect refused: invalid secret");
            return false;
        }

        let requested = self.auto_grant.unwrap_or_else(|| {
            request
                .params
                .get(2)
                .map(|p| parse_permission_string(p))
                .unwrap_or(Permission::DEFAULT)
        });

        let mut apps = self.apps.lock();
        if apps.len() >= Self::MAX_CONNECTED_APPS && !apps.contains_key(request.remote) {
            warn!(app_id, "connect refused: too many connected apps");
            return false;
        }
        match apps.entry(*request.remote) {
            Entry::Occupied(entry) => {
                let existing = entry.get().permissions;
                if existing != requested & Permission::ALL {
                    warn!(
                        app_id,
                        existing = ?existing,
                        requested = ?requested,
                        "reconnecting app requested different permissions; keeping existing"
                    );
                }
            }
            Entry::Vacant(entry) => {
                entry.insert(AppPermission::new(*request.remote, requested));
                info!(app_id, permissions = ?requested, "app connected");
            }
        }
        true
    }

    pub fn grant(&self, pubkey: PublicKey, permissions: Permission) {
        let mut apps = self.apps.lock();
        match apps.get_mut(&pubkey) {
            Some(app) => {
                app.permissions |= permissions & Permission::ALL;
                app.last_used = Timestamp::now();
            }
            None => {
                apps.insert(pubkey, AppPermission::new(pubkey, permissions));
            }
        }
    }

    pub fn set_permissions(&self, pubkey: &PublicKey, permissions: Permission) {
        if let Some(app) = self.apps.lock().get_mut(pubkey) {
            app.permissions = permissions & Permission::ALL;
            app.last_used = Timestamp::now();
        }
    }

    pub fn revoke(&self, pubkey: &PublicKey) -> bool {
        self.apps.lock().remove(pubkey).is_some()
    }

    pub fn revoke_all(&self) {
        self.apps.lock().clear();
    }

    pub fn is_connected(&self, pubkey: &PublicKey) -> bool {
        self.apps.lock().contains_key(pubkey)
    }

    pub fn has_permission(&self, pubkey: &PublicKey, permission: Permission) -> bool {
        self.apps
            .lock()
            .get(pubkey)
            .is_some_and(|app| app.permissions.contains(permission))
    }

    pub fn get_app(&self, pubkey: &PublicKey) -> Option<AppPermission> {
        self.apps.lock().get(pubkey).cloned()
    }

    pub fn list_apps(&self) -> Vec<AppPermission> {
        self.apps.lock().values().cloned().collect()
    }
}

impl Default for PermissionPolicy {
    fn default() -> Self {
        Self::new()
    }
}

impl AuthorizationPolicy for PermissionPolicy {
    fn authorize(&self, request: &AuthorizationRequest<'_>) -> bool {
        if request.method == Method::Connect {
            return self.connect(request);
        }
        if request.harmless {
            return true;
        }
        let Some(required) = Permission::for_method(request.method) else {
            return true;
        };

        let mut apps = self.apps.lock();
        let Some(app) = apps.get_mut(request.remote) else {
            debug!(method = %request.method, "refused: app not connected");
            return false;
        };
        if !app.permissions.contains(required) {
            debug!(method = %request.method, "refused: permission not granted");
            return false;
        }
        app.last_used = Timestamp::now();
        app.request_count += 1;
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nostr_sdk::prelude::Keys;

    fn request<'a>(
        method: Method,
        remote: &'a PublicKey,
        secret: Option<&'a str>,
        params: &'a [String],
    ) -> AuthorizationRequest<'a> {
        AuthorizationRequest {
            method,
            harmless: method.is_harmless(),
            remote,
            secret,
            params,
        }
    }

    #[test]
    fn test_parse_permission_string() {
        let p = parse_permission_string("sign_event:1,nip44_encrypt");
        assert!(p.contains(Permission::SIGN_EVENT));
        assert!(p.contains(Permission::NIP44_ENCRYPT));
        assert!(p.contains(Permission::GET_PUBLIC_KEY));
        assert!(!p.contains(Permission::NIP04_DECRYPT));

        assert_eq!(parse_permission_string(""), Permission::DEFAULT);
        assert_eq!(parse_permission_string("bogus"), Permission::DEFAULT);
    }

    #[test]
    fn test_allow_all_and_closure_policies() {
        let remote = Keys::generate().public_key();
        let req = request(Method::SignEvent, &remote, None, &[]);
        assert!(AllowAll.authorize(&req));

        fn harmless_only(r: &AuthorizationRequest<'_>) -> bool {
            r.harmless
        }
        assert!(!harmless_only.authorize(&req));
        assert!(harmless_only.authorize(&request(Method::Ping, &remote, None, &[])));
    }

    #[test]
    fn test_sensitive_requires_connect_and_permission() {
        let policy = PermissionPolicy::new();
        let remote = Keys::generate().public_key();

        assert!(!policy.authorize(&request(Method::SignEvent, &remote, None, &[])));
        assert!(policy.authorize(&request(Method::Ping, &remote, None, &[])));

        let params = vec![remote.to_hex(), String::new(), "sign_event".to_string()];
        assert!(policy.authorize(&request(Method::Connect, &remote, None, &params)));
        assert!(policy.is_connected(&remote));
        assert!(policy.authorize(&request(Method::SignEvent, &remote, None, &[])));
        assert!(!policy.authorize(&request(Method::Nip44Decrypt, &remote, None, &[])));
        assert_eq!(policy.get_app(&remote).unwrap().request_count, 1);

        policy.grant(remote, Permission::NIP44_DECRYPT);
        assert!(policy.authorize(&request(Method::Nip44Decrypt, &remote, None, &[])));

        assert!(policy.revoke(&remote));
        assert!(!policy.authorize(&request(Method::SignEvent, &remote, None, &[])));
    }

    #[test]
    fn test_connect_checks_secret() {
        let policy = PermissionPolicy::new().with_expected_secret("s3cret");
        let remote = Keys::generate().public_key();

        assert!(!policy.authorize(&request(Method::Connect, &remote, None, &[])));
        assert!(!policy.authorize(&request(Method::Connect, &remote, Some("wrong"), &[])));
        assert!(!policy.is_connected(&remote));
        assert!(policy.authorize(&request(Method::Connect, &remote, Some("s3cret"), &[])));
        assert!(policy.has_permission(&remote, Permission::GET_PUBLIC_KEY));
        assert!(!policy.has_permission(&remote, Permission::SIGN_EVENT));
    }

    #[test]
    fn test_reconnect_keeps_existing_permissions() {
        let policy = PermissionPolicy::new();
        let remote = Keys::generate().public_key();
        let first = vec![String::new(), String::new(), "nip04_encrypt".to_string()];
        let second = vec![String::new(), String::new(), "sign_event".to_string()];

        assert!(policy.authorize(&request(Method::Connect, &remote, None, &first)));
        assert!(policy.authorize(&request(Method::Connect, &remote, None, &second)));
        assert!(policy.has_permission(&remote, Permission::NIP04_ENCRYPT));
        assert!(!policy.has_permission(&remote, Permission::SIGN_EVENT));
    }

    #[test]
    fn test_auto_grant() {
        let policy = PermissionPolicy::new().with_auto_grant(Permission::ALL);
        let remote = Keys::generate().public_key();
        assert!(policy.authorize(&request(Method::Connect, &remote, None, &[])));
        assert!(policy.has_permission(&remote, Permission::ALL));
    }

    #[test]
    fn test_capacity_limit() {
        let policy = PermissionPolicy::new();
        for _ in 0..PermissionPolicy::MAX_CONNECTED_APPS {
            let pk = Keys::generate().public_key();
            assert!(policy.authorize(&request(Method::Connect, &pk, None, &[])));
        }
        let late = Keys::generate().public_key();
        assert!(!policy.authorize(&request(Method::Connect, &late, None, &[])));
        assert_eq!(policy.list_apps().len(), PermissionPolicy::MAX_CONNECTED_APPS);

        policy.revoke_all();
        assert!(policy.authorize(&request(Method::Connect, &late, None, &[])));
    }
}
