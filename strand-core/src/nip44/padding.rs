// SPDX-FileCopyrightText: © 2026 PrivKey LLC
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Length-prefixed padding to a small set of size buckets.
//!
//! Plaintexts up to 65535 bytes carry a big-endian `u16` length. Longer ones
//! carry a zero `u16` followed by a big-endian `u32` length.
use crate::error::{CryptoError, Result};

pub const MIN_PADDED_LEN: usize = 32;

/// Largest plaintext the extended prefix can describe.
pub const MAX_PLAINTEXT_SIZE: usize = u32::MAX as usize;

const SHORT_PREFIX_LEN: usize = 2;
const LONG_PREFIX_LEN: usize = 6;

/// Size of the padded region (prefix excluded) for a plaintext length.
pub fn calc_padded_len(unpadded_len: usize) -> usize {
    if unpadded_len <= MIN_PADDED_LEN {
        return MIN_PADDED_LEN;
    }
    let next_power = 1usize << (usize::BITS - (unpadded_len - 1).leading_zeros());
    let chunk = if next_power <= 256 { 32 } else { next_power / 8 };
    chunk * ((unpadded_len - 1) / chunk + 1)
}

fn prefix_len(unpadded_len: usize) -> usize {
    if unpadded_len <= u16::MAX as usize {
        SHORT_PREFIX_LEN
    } else {
        LONG_PREFIX_LEN
    }
}

pub(crate) fn pad(plaintext: &[u8]) -> Result<Vec<u8>> {
    let len = plaintext.len();
    if len == 0 {
        return Err(CryptoError::EmptyPlaintext);
    }
    if len > MAX_PLAINTEXT_SIZE {
        return Err(CryptoError::MessageTooLarge(len));
    }

    let prefix = prefix_len(len);
    let total = prefix + calc_padded_len(len);
    let mut padded = Vec::with_capacity(total);
    if prefix == SHORT_PREFIX_LEN {
        padded.extend_from_slice(&(len as u16).to_be_bytes());
    } else {
        padded.extend_from_slice(&[0, 0]);
        padded.extend_from_slice(&(len as u32).to_be_bytes());
    }
    padded.extend_from_slice(plaintext);
    padded.resize(total, 0);
    Ok(padded)
}

pub(crate) fn unpad(padded: &[u8]) -> Result<Vec<u8>> {
    if padded.len() < SHORT_PREFIX_LEN {
        return Err(CryptoError::InvalidPadding);
    }

    let short = u16::from_be_bytes([padded[0], padded[1]]) as usize;
    let (prefix, len) = if short != 0 {
        (SHORT_PREFIX_LEN, short)
    } else {
        let long_bytes: [u8; 4] = padded
            .get(SHORT_PREFIX_LEN..LONG_PREFIX_LEN)
            .and_then(|b| b.try_into().ok())
            .ok_or(CryptoError::InvalidPadding)?;
        let long = u32::from_be_bytes(long_bytes) as usize;
        // the long form is only valid where the short form cannot express the length
        if long <= u16::MAX as usize {
            return Err(CryptoError::InvalidPadding);
        }
        (LONG_PREFIX_LEN, long)
    };

    if padded.len() != prefix + calc_padded_len(len) {
        return Err(CryptoError::InvalidPadding);
    }
    Ok(padded[prefix..prefix + len].to_vec())
}
