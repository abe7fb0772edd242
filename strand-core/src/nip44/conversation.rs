// SPDX-FileCopyrightText: © 2026 PrivKey LLC
// SPDX-License-Identifier: AGPL-3.0-or-later
use hkdf::Hkdf;
use k256::elliptic_curve::group::GroupEncoding;
use k256::elliptic_curve::PrimeField;
use k256::{NonZeroScalar, ProjectivePoint, PublicKey, Scalar};
use sha2::Sha256;
use zeroize::{Zeroize, ZeroizeOnDrop, Zeroizing};

use crate::crypto::ct_eq;
use crate::error::{CryptoError, Result};

const CONVERSATION_SALT: &[u8] = b"nip44-v2";

pub const CONVERSATION_KEY_SIZE: usize = 32;

const CHACHA_KEY_SIZE: usize = 32;
const CHACHA_NONCE_SIZE: usize = 12;
const HMAC_KEY_SIZE: usize = 32;
const MESSAGE_KEYS_SIZE: usize = CHACHA_KEY_SIZE + CHACHA_NONCE_SIZE + HMAC_KEY_SIZE;

/// Symmetric key shared by one pair of identities.
///
/// Both sides arrive at the same value: `derive(a_secret, b_public)` equals
/// `derive(b_secret, a_public)`.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct ConversationKey([u8; CONVERSATION_KEY_SIZE]);

impl ConversationKey {
    /// ECDH between a secret scalar and an x-only public key, followed by
    /// HKDF-Extract with the `nip44-v2` salt.
    ///
    /// # Errors
    ///
    /// [`CryptoError::InvalidKey`] if the secret is zero or not below the
    /// curve order, or if the public key is not an x-coordinate on the curve.
    pub fn derive(secret: &[u8; 32], public_xonly: &[u8; 32]) -> Result<Self> {
        let scalar = Option::<Scalar>::from(Scalar::from_repr((*secret).into()))
            .ok_or_else(|| CryptoError::invalid_key("secret key not below curve order"))?;
        let scalar = Option::<NonZeroScalar>::from(NonZeroScalar::new(scalar))
            .ok_or_else(|| CryptoError::invalid_key("secret key is zero"))?;

        let mut compressed = [0u8; 33];
        compressed[0] = 0x02;
        compressed[1..].copy_from_slice(public_xonly);
        let point = PublicKey::from_sec1_bytes(&compressed)
            .map_err(|_| CryptoError::invalid_key("public key is not on the curve"))?;

        let shared = (ProjectivePoint::from(*point.as_affine()) * *scalar).to_affine();
        let encoded = Zeroizing::new(shared.to_bytes());
        let shared_x = &encoded[1..33];

        let (prk, _) = Hkdf::<Sha256>::extract(Some(CONVERSATION_SALT), shared_x);
        let mut key = [0u8; CONVERSATION_KEY_SIZE];
        key.copy_from_slice(&prk);
        Ok(Self(key))
    }

    pub fn from_bytes(bytes: [u8; CONVERSATION_KEY_SIZE]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; CONVERSATION_KEY_SIZE] {
        &self.0
    }

    /// Expand this key with a message nonce into the per-message subkeys.
    pub(crate) fn message_keys(&self, nonce: &[u8; 32]) -> Result<MessageKeys> {
        let hk = Hkdf::<Sha256>::from_prk(&self.0)
            .map_err(|e| CryptoError::key_derivation(format!("conversation key: {e}")))?;
        let mut okm = Zeroizing::new([0u8; MESSAGE_KEYS_SIZE]);
        hk.expand(nonce, &mut okm[..])
            .map_err(|e| CryptoError::key_derivation(format!("message keys: {e}")))?;

        let mut keys = MessageKeys {
            chacha_key: [0u8; CHACHA_KEY_SIZE],
            chacha_nonce: [0u8; CHACHA_NONCE_SIZE],
            hmac_key: [0u8; HMAC_KEY_SIZE],
        };
        keys.chacha_key.copy_from_slice(&okm[..CHACHA_KEY_SIZE]);
        keys.chacha_nonce
            .copy_from_slice(&okm[CHACHA_KEY_SIZE..CHACHA_KEY_SIZE + CHACHA_NONCE_SIZE]);
        keys.hmac_key
            .copy_from_slice(&okm[CHACHA_KEY_SIZE + CHACHA_NONCE_SIZE..]);
        Ok(keys)
    }
}

impl PartialEq for ConversationKey {
    fn eq(&self, other: &Self) -> bool {
        ct_eq(&self.0, &other.0)
    }
}

impl Eq for ConversationKey {}

impl std::fmt::Debug for ConversationKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("ConversationKey").field(&"[REDACTED]").finish()
    }
}

/// Stream cipher key, stream cipher nonce and MAC key for one message.
#[derive(Zeroize, ZeroizeOnDrop)]
pub(crate) struct MessageKeys {
    pub(crate) chacha_key: [u8; CHACHA_KEY_SIZE],
    pub(crate) chacha_nonce: [u8; CHACHA_NONCE_SIZE],
    pub(crate) hmac_key: [u8; HMAC_KEY_SIZE],
}

#[cfg(test)]
mod tests {
    use super::*;
    use k256::elliptic_curve::sec1::ToEncodedPoint;

    const CURVE_ORDER: &str = "fffffffffffffffffffffffffffffffebaaedce6af48a03bbfd25e8cd0364141";

    fn secret(byte: u8) -> [u8; 32] {
        let mut s = [0u8; 32];
        s[31] = byte;
        s
    }

    fn xonly(secret: &[u8; 32]) -> [u8; 32] {
        let sk = k256::SecretKey::from_slice(secret).unwrap();
        let point = sk.public_key().to_encoded_point(true);
        let mut x = [0u8; 32];
        x.copy_from_slice(point.x().unwrap());
        x
    }

    fn from_hex(s: &str) -> [u8; 32] {
        hex::decode(s).unwrap().try_into().unwrap()
    }

    #[test]
    fn test_derivation_is_symmetric() {
        let a = secret(1);
        let b = secret(2);
        let ab = ConversationKey::derive(&a, &xonly(&b)).unwrap();
        let ba = ConversationKey::derive(&b, &xonly(&a)).unwrap();
        assert_eq!(ab, ba);
    }

    #[test]
    fn test_different_peers_give_different_keys() {
        let a = secret(1);
        let ab = ConversationKey::derive(&a, &xonly(&secret(2))).unwrap();
        let ac = ConversationKey::derive(&a, &xonly(&secret(3))).unwrap();
        assert_ne!(ab, ac);
    }

    #[test]
    fn test_zero_secret_rejected() {
        let peer = xonly(&secret(2));
        let err = ConversationKey::derive(&[0u8; 32], &peer).unwrap_err();
        assert!(matches!(err, CryptoError::InvalidKey(_)));
    }

    #[test]
    fn test_secret_at_or_above_order_rejected() {
        let peer = xonly(&secret(2));
        let order = from_hex(CURVE_ORDER);
        assert!(matches!(
            ConversationKey::derive(&order, &peer),
            Err(CryptoError::InvalidKey(_))
        ));
        assert!(matches!(
            ConversationKey::derive(&[0xff; 32], &peer),
            Err(CryptoError::InvalidKey(_))
        ));

        let mut below = order;
        below[31] -= 1;
        assert!(ConversationKey::derive(&below, &peer).is_ok());
    }

    #[test]
    fn test_public_key_off_curve_rejected() {
        let err = ConversationKey::derive(&secret(1), &[0xff; 32]).unwrap_err();
        assert!(matches!(err, CryptoError::InvalidKey(_)));
    }

    #[test]
    fn test_message_keys_depend_on_nonce() {
        let key = ConversationKey::from_bytes([7u8; 32]);
        let a = key.message_keys(&[0u8; 32]).unwrap();
        let b = key.message_keys(&[1u8; 32]).unwrap();
        assert_ne!(a.chacha_key, b.chacha_key);
        assert_ne!(a.hmac_key, b.hmac_key);
        assert_ne!(a.chacha_key, a.hmac_key);
    }

    #[test]
    fn test_debug_is_redacted() {
        let key = ConversationKey::from_bytes([0xab; 32]);
        let debug = format!("{key:?}");
        assert!(!debug.contains("ab, ab"));
        assert!(debug.contains("REDACTED"));
    }
}
