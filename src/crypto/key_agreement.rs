// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! ECDH Session Key Agreement
//!
//! Derives the symmetric SessionKey shared with the TEE. Both sides compute it
//! independently from their own private key and the other side's public key,
//! so no handshake message is exchanged.

use crate::error::{Result, ShieldedError};
use crate::types::{SessionKey, COMPRESSED_PUBKEY_SIZE};
use hkdf::Hkdf;
use k256::{PublicKey, SecretKey};
use sha2::Sha256;

/// HKDF info string; must match the TEE side exactly
pub const SESSION_KEY_HKDF_INFO: &[u8] = b"aes-gcm key";

/// Derive the session key from a local private scalar and the TEE public key
///
/// Performs ECDH on secp256k1 and expands the x-coordinate of the shared point
/// with HKDF-SHA256 (no salt) into a 32-byte AES-256 key.
///
/// # Arguments
///
/// * `local_sk` - Local encryption private key (32 bytes, nonzero, below the curve order)
/// * `remote_pk` - TEE public key (33 bytes compressed)
///
/// # Errors
///
/// Returns `InvalidKey` if either key is malformed or not a valid curve point.
///
/// # Example
///
/// ```ignore
/// let session_key = derive_session_key(&local.secret_bytes(), tee_key.as_bytes())?;
/// ```
pub fn derive_session_key(local_sk: &[u8], remote_pk: &[u8]) -> Result<SessionKey> {
    if local_sk.len() != 32 {
        return Err(ShieldedError::invalid_key(
            "local_encryption_key",
            format!("expected 32 bytes, got {}", local_sk.len()),
        ));
    }

    let local_secret = SecretKey::from_slice(local_sk).map_err(|e| {
        ShieldedError::invalid_key("local_encryption_key", format!("failed to parse: {}", e))
    })?;

    if remote_pk.len() != COMPRESSED_PUBKEY_SIZE {
        return Err(ShieldedError::invalid_key(
            "tee_public_key",
            format!(
                "expected {} bytes compressed, got {}",
                COMPRESSED_PUBKEY_SIZE,
                remote_pk.len()
            ),
        ));
    }

    // Identity and off-curve encodings are rejected here
    let remote = PublicKey::from_sec1_bytes(remote_pk).map_err(|e| {
        ShieldedError::invalid_key("tee_public_key", format!("invalid curve point: {}", e))
    })?;

    let shared = k256::ecdh::diffie_hellman(local_secret.to_nonzero_scalar(), remote.as_affine());

    let hkdf = Hkdf::<Sha256>::new(None, shared.raw_secret_bytes());
    let mut key = [0u8; 32];
    hkdf.expand(SESSION_KEY_HKDF_INFO, &mut key).map_err(|e| {
        ShieldedError::invalid_key("session_key", format!("HKDF expansion failed: {}", e))
    })?;

    Ok(SessionKey::from_bytes(key))
}
