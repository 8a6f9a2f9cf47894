// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Signed-read response decryption
//!
//! The TEE seals each signed-read result under the session key with a nonce
//! of its own choosing and returns:
//!
//! ```text
//! [nonce (12 bytes) | ciphertext+tag]
//! ```
//!
//! The AAD of a response is the AAD of the request it answers, so a frame
//! produced for one signed read never opens as the result of another. Any
//! failure, including a frame too short to hold a nonce and a tag, is
//! reported as `AuthenticationFailed`; callers must treat it as
//! "result unavailable".

use crate::aad;
use crate::crypto::{open, seal};
use crate::error::{Result, ShieldedError};
use crate::session::ShieldedSession;
use crate::types::{EncryptionNonce, SessionKey, TransactionContext, NONCE_SIZE, TAG_SIZE};
use tracing::warn;

/// Split a response frame into nonce and ciphertext+tag
pub fn split_frame(frame: &[u8]) -> Result<(EncryptionNonce, &[u8])> {
    if frame.len() < NONCE_SIZE + TAG_SIZE {
        return Err(ShieldedError::AuthenticationFailed);
    }
    let (nonce, ciphertext) = frame.split_at(NONCE_SIZE);
    Ok((EncryptionNonce::from_slice(nonce)?, ciphertext))
}

/// Open a response frame bound to `request_aad`
pub fn open_response(key: &SessionKey, frame: &[u8], request_aad: &[u8]) -> Result<Vec<u8>> {
    let (nonce, ciphertext) = split_frame(frame)?;
    open(key, &nonce, ciphertext, request_aad)
}

/// Seal a response frame (the TEE side of [`open_response`])
pub fn seal_response(key: &SessionKey, plaintext: &[u8], request_aad: &[u8]) -> Result<Vec<u8>> {
    let nonce = EncryptionNonce::random();
    let ciphertext = seal(key, &nonce, plaintext, request_aad)?;

    let mut frame = Vec::with_capacity(NONCE_SIZE + ciphertext.len());
    frame.extend_from_slice(nonce.as_bytes());
    frame.extend_from_slice(&ciphertext);
    Ok(frame)
}

/// Decrypt the response to the signed read described by `request`
pub async fn decrypt_response(
    session: &ShieldedSession,
    request: &TransactionContext,
    response: &[u8],
) -> Result<Vec<u8>> {
    let key = session.session_key().await?;
    open_response(&key, response, &aad::encode(request)).map_err(|e| {
        warn!(
            "🔒 Signed-read response rejected ({} bytes, request nonce {}): result unavailable",
            response.len(),
            request.nonce
        );
        e
    })
}
