// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! AES-256-GCM Seal/Open
//!
//! **Format**:
//! ```text
//! [ciphertext (plaintext length) | tag (16 bytes)]
//! ```
//!
//! - Nonce: 12 bytes, carried separately by the caller
//! - Tag verification is constant time (provided by `aes-gcm`)
//! - AAD authenticates the public transaction context
//!
//! **CRITICAL**: never seal two messages under the same (key, nonce) pair.
//! This module does not track nonces; the envelope builder draws a fresh one
//! for every call.

use crate::error::{Result, ShieldedError};
use crate::types::{EncryptionNonce, SessionKey, TAG_SIZE};
use aes_gcm::{
    aead::{Aead, KeyInit, Payload},
    Aes256Gcm, Key, Nonce,
};

fn cipher(key: &SessionKey) -> Aes256Gcm {
    Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key.as_bytes()))
}

/// Encrypt `plaintext` and append the authentication tag
///
/// # Errors
///
/// Returns `InvalidPayload` only if the plaintext exceeds the GCM length limit.
pub fn seal(
    key: &SessionKey,
    nonce: &EncryptionNonce,
    plaintext: &[u8],
    aad: &[u8],
) -> Result<Vec<u8>> {
    cipher(key)
        .encrypt(
            Nonce::from_slice(nonce.as_bytes()),
            Payload {
                msg: plaintext,
                aad,
            },
        )
        .map_err(|_| ShieldedError::invalid_payload("plaintext", "exceeds AES-GCM length limit"))
}

/// Verify the tag and decrypt
///
/// # Errors
///
/// Returns `AuthenticationFailed` on any mismatch of key, nonce, ciphertext,
/// tag or AAD. No partial plaintext is ever returned.
pub fn open(
    key: &SessionKey,
    nonce: &EncryptionNonce,
    ciphertext_with_tag: &[u8],
    aad: &[u8],
) -> Result<Vec<u8>> {
    if ciphertext_with_tag.len() < TAG_SIZE {
        return Err(ShieldedError::AuthenticationFailed);
    }

    let plaintext = cipher(key).decrypt(
        Nonce::from_slice(nonce.as_bytes()),
        Payload {
            msg: ciphertext_with_tag,
            aad,
        },
    )?;

    Ok(plaintext)
}
