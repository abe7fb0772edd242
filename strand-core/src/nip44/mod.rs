// SPDX-FileCopyrightText: © 2026 PrivKey LLC
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Version 2 of the versioned payload cipher used for Nostr direct content.
//!
//! An envelope is `base64(version || nonce || ciphertext || mac)` where the
//! ciphertext is ChaCha20 over the padded plaintext and the MAC is
//! HMAC-SHA256 over `nonce || ciphertext`. The MAC is always verified before
//! any decryption takes place.
mod conversation;
mod padding;

pub use conversation::{ConversationKey, CONVERSATION_KEY_SIZE};
pub use padding::{calc_padded_len, MAX_PLAINTEXT_SIZE, MIN_PADDED_LEN};

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use chacha20::cipher::{KeyIvInit, StreamCipher};
use chacha20::ChaCha20;
use tracing::trace;
use zeroize::Zeroize;

use crate::crypto::{ct_eq, hmac_sha256, random_bytes};
use crate::error::{CryptoError, Result};
use conversation::MessageKeys;

pub const VERSION: u8 = 2;
pub const NONCE_SIZE: usize = 32;
pub const MAC_SIZE: usize = 32;

/// Shortest base64 payload that can hold a version 2 envelope.
pub const MIN_PAYLOAD_SIZE: usize = 132;
/// Shortest decoded envelope: version, nonce, a minimal padded block, MAC.
pub const MIN_DECODED_SIZE: usize = 99;

/// Encrypt under a fresh random nonce.
pub fn encrypt(plaintext: &[u8], key: &ConversationKey) -> Result<String> {
    if plaintext.is_empty() {
        return Err(CryptoError::EmptyPlaintext);
    }
    let nonce: [u8; NONCE_SIZE] = random_bytes();
    encrypt_with_nonce(plaintext, key, &nonce)
}

/// Encrypt with a caller supplied nonce.
///
/// Reusing a nonce under the same conversation key reveals the XOR of the
/// two plaintexts. Outside of tests, use [`encrypt`].
pub fn encrypt_with_nonce(
    plaintext: &[u8],
    key: &ConversationKey,
    nonce: &[u8; NONCE_SIZE],
) -> Result<String> {
    if plaintext.is_empty() {
        return Err(CryptoError::EmptyPlaintext);
    }
    let keys = key.message_keys(nonce)?;
    let mut buffer = padding::pad(plaintext)?;
    apply_keystream(&keys, &mut buffer)?;
    let mac = hmac_sha256(&keys.hmac_key, &[nonce.as_slice(), buffer.as_slice()])?;

    let mut envelope = Vec::with_capacity(1 + NONCE_SIZE + buffer.len() + MAC_SIZE);
    envelope.push(VERSION);
    envelope.extend_from_slice(nonce);
    envelope.extend_from_slice(&buffer);
    envelope.extend_from_slice(&mac);

    trace!(padded = buffer.len(), "nip44 encrypted payload");
    Ok(BASE64.encode(envelope))
}

/// Authenticate and decrypt a payload.
///
/// Failures are reported in order of detection: version markers and length
/// first, then base64 and envelope framing, then the MAC, then padding.
pub fn decrypt(payload: &str, key: &ConversationKey) -> Result<Vec<u8>> {
    if payload.len() < MIN_PAYLOAD_SIZE || payload.starts_with('#') {
        return Err(CryptoError::UnsupportedVersion);
    }

    let data = BASE64
        .decode(payload)
        .map_err(|e| CryptoError::malformed(format!("invalid base64: {e}")))?;
    if data.len() < MIN_DECODED_SIZE {
        return Err(CryptoError::malformed(format!(
            "envelope too short ({} bytes)",
            data.len()
        )));
    }
    if data[0] != VERSION {
        return Err(CryptoError::malformed(format!(
            "unknown version {}",
            data[0]
        )));
    }

    let mut nonce = [0u8; NONCE_SIZE];
    nonce.copy_from_slice(&data[1..1 + NONCE_SIZE]);
    let mac = &data[data.len() - MAC_SIZE..];
    let ciphertext = &data[1 + NONCE_SIZE..data.len() - MAC_SIZE];

    let keys = key.message_keys(&nonce)?;
    let expected = hmac_sha256(&keys.hmac_key, &[nonce.as_slice(), ciphertext])?;
    if !ct_eq(&expected, mac) {
        return Err(CryptoError::AuthenticationFailed);
    }

    let mut padded = ciphertext.to_vec();
    apply_keystream(&keys, &mut padded)?;
    let plaintext = padding::unpad(&padded);
    padded.zeroize();
    plaintext
}

/// [`decrypt`] followed by UTF-8 validation.
pub fn decrypt_to_string(payload: &str, key: &ConversationKey) -> Result<String> {
    let bytes = decrypt(payload, key)?;
    String::from_utf8(bytes)
        .map_err(|_| CryptoError::malformed("plaintext is not valid UTF-8"))
}

fn apply_keystream(keys: &MessageKeys, buffer: &mut [u8]) -> Result<()> {
    let mut cipher = ChaCha20::new_from_slices(&keys.chacha_key, &keys.chacha_nonce)
        .map_err(|e| CryptoError::key_derivation(format!("chacha20 init: {e}")))?;
    cipher.apply_keystream(buffer);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fixed_key() -> ConversationKey {
        ConversationKey::from_bytes([0x11; 32])
    }

    fn reencode(data: &[u8]) -> String {
        BASE64.encode(data)
    }

    #[test]
    fn test_fixed_nonce_is_deterministic() {
        let key = fixed_key();
        let a = encrypt_with_nonce(b"hello", &key, &[0u8; 32]).unwrap();
        let b = encrypt_with_nonce(b"hello", &key, &[0u8; 32]).unwrap();
        assert_eq!(a, b);
        // 1 + 32 + (2 + 32) + 32 bytes
        assert_eq!(a.len(), 132);
        assert_eq!(decrypt(&a, &key).unwrap(), b"hello");
    }

    #[test]
    fn test_single_character_change_fails() {
        let key = fixed_key();
        let payload = encrypt_with_nonce(b"hello", &key, &[0u8; 32]).unwrap();
        let mut chars: Vec<char> = payload.chars().collect();
        chars[60] = if chars[60] == 'A' { 'B' } else { 'A' };
        let tampered: String = chars.into_iter().collect();
        assert!(decrypt(&tampered, &key).is_err());
    }

    #[test]
    fn test_random_nonce_differs() {
        let key = fixed_key();
        let a = encrypt(b"hello", &key).unwrap();
        let b = encrypt(b"hello", &key).unwrap();
        assert_ne!(a, b);
        assert_eq!(decrypt_to_string(&a, &key).unwrap(), "hello");
        assert_eq!(decrypt_to_string(&b, &key).unwrap(), "hello");
    }

    #[test]
    fn test_every_bit_flip_after_version_fails_authentication() {
        let key = fixed_key();
        let payload = encrypt_with_nonce(b"hello", &key, &[3u8; 32]).unwrap();
        let data = BASE64.decode(&payload).unwrap();
        for byte in 1..data.len() {
            for bit in 0..8 {
                let mut tampered = data.clone();
                tampered[byte] ^= 1 << bit;
                assert_eq!(
                    decrypt(&reencode(&tampered), &key).unwrap_err(),
                    CryptoError::AuthenticationFailed,
                    "byte {byte} bit {bit}"
                );
            }
        }
    }

    #[test]
    fn test_wrong_version_byte() {
        let key = fixed_key();
        let payload = encrypt(b"hello", &key).unwrap();
        let mut data = BASE64.decode(&payload).unwrap();
        data[0] = 1;
        assert!(matches!(
            decrypt(&reencode(&data), &key),
            Err(CryptoError::MalformedEnvelope(_))
        ));
    }

    #[test]
    fn test_wrong_key_fails_authentication() {
        let payload = encrypt(b"hello", &fixed_key()).unwrap();
        let other = ConversationKey::from_bytes([0x22; 32]);
        assert_eq!(
            decrypt(&payload, &other).unwrap_err(),
            CryptoError::AuthenticationFailed
        );
    }

    #[test]
    fn test_empty_plaintext_rejected() {
        assert_eq!(
            encrypt(b"", &fixed_key()).unwrap_err(),
            CryptoError::EmptyPlaintext
        );
        assert_eq!(
            encrypt_with_nonce(b"", &fixed_key(), &[0u8; 32]).unwrap_err(),
            CryptoError::EmptyPlaintext
        );
    }

    #[test]
    fn test_short_or_hash_prefixed_payload_is_unsupported() {
        let key = fixed_key();
        assert_eq!(
            decrypt("AgAA", &key).unwrap_err(),
            CryptoError::UnsupportedVersion
        );
        assert_eq!(decrypt("", &key).unwrap_err(), CryptoError::UnsupportedVersion);

        let hashed = format!("#{}", "A".repeat(200));
        assert_eq!(
            decrypt(&hashed, &key).unwrap_err(),
            CryptoError::UnsupportedVersion
        );
    }

    #[test]
    fn test_invalid_base64_is_malformed() {
        let key = fixed_key();
        let garbage = "!".repeat(MIN_PAYLOAD_SIZE);
        assert!(matches!(
            decrypt(&garbage, &key),
            Err(CryptoError::MalformedEnvelope(_))
        ));
    }

    #[test]
    fn test_decoded_too_short_is_malformed() {
        let key = fixed_key();
        // 98 bytes encode to 132 base64 characters
        let payload = reencode(&[2u8; 98]);
        assert_eq!(payload.len(), 132);
        assert!(matches!(
            decrypt(&payload, &key),
            Err(CryptoError::MalformedEnvelope(_))
        ));
    }

    #[test]
    fn test_authenticated_bad_padding_rejected() {
        let key = fixed_key();
        let nonce = [9u8; 32];
        let keys = key.message_keys(&nonce).unwrap();

        // claims 40 bytes of content inside a 32 byte block
        let mut buffer = vec![0u8; 34];
        buffer[1] = 40;
        apply_keystream(&keys, &mut buffer).unwrap();
        let mac = hmac_sha256(&keys.hmac_key, &[nonce.as_slice(), buffer.as_slice()]).unwrap();

        let mut data = vec![VERSION];
        data.extend_from_slice(&nonce);
        data.extend_from_slice(&buffer);
        data.extend_from_slice(&mac);
        assert_eq!(
            decrypt(&reencode(&data), &key).unwrap_err(),
            CryptoError::InvalidPadding
        );
    }

    #[test]
    fn test_invalid_utf8_rejected_by_string_variant() {
        let key = fixed_key();
        let payload = encrypt(&[0xff, 0xfe, 0xfd], &key).unwrap();
        assert_eq!(decrypt(&payload, &key).unwrap(), vec![0xff, 0xfe, 0xfd]);
        assert!(matches!(
            decrypt_to_string(&payload, &key),
            Err(CryptoError::MalformedEnvelope(_))
        ));
    }

    #[test]
    fn test_large_message_roundtrip() {
        let key = fixed_key();
        let plaintext = vec![0x5au8; 70_000];
        let payload = encrypt(&plaintext, &key).unwrap();
        assert_eq!(decrypt(&payload, &key).unwrap(), plaintext);
    }

    #[test]
    fn test_unicode_roundtrip() {
        let key = fixed_key();
        let text = "ünïcödé 🔑 签名";
        let payload = encrypt(text.as_bytes(), &key).unwrap();
        assert_eq!(decrypt_to_string(&payload, &key).unwrap(), text);
    }

    mod interop {
        use super::super::*;
        use nostr_sdk::nips::nip44 as sdk;
        use nostr_sdk::Keys;

        fn conversation(local: &Keys, remote: &Keys) -> ConversationKey {
            ConversationKey::derive(
                &local.secret_key().secret_bytes(),
                &remote.public_key().to_bytes(),
            )
            .unwrap()
        }

        #[test]
        fn test_our_payload_opens_with_nostr_sdk() {
            let alice = Keys::generate();
            let bob = Keys::generate();
            let key = conversation(&alice, &bob);

            let payload = encrypt(b"sign this please", &key).unwrap();
            let opened = sdk::decrypt(bob.secret_key(), &alice.public_key(), &payload).unwrap();
            assert_eq!(opened, "sign this please");
        }

        #[test]
        fn test_nostr_sdk_payload_opens_with_ours() {
            let alice = Keys::generate();
            let bob = Keys::generate();

            let payload = sdk::encrypt(
                alice.secret_key(),
                &bob.public_key(),
                "from the other side",
                sdk::Version::V2,
            )
            .unwrap();
            let key = conversation(&bob, &alice);
            assert_eq!(
                decrypt_to_string(&payload, &key).unwrap(),
                "from the other side"
            );
        }
    }
}
