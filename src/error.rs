// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Error types for the shielded-transaction pipeline
//!
//! ## Error Variants
//!
//! - **InvalidKey**: malformed or out-of-range key material (fatal, never retried)
//! - **AnchorUnavailable**: freshness data could not be fetched (retryable with backoff)
//! - **AuthenticationFailed**: AEAD tag mismatch on open (fatal for that ciphertext)
//! - **UnsupportedOperation**: invalid request combination, e.g. an encrypted deployment
//! - **Expired**: freshness anchor is past its window at submission time
//! - **Transport**: network collaborator failed outside of anchor fetches
//! - **Config**: configuration could not be loaded or validated
//! - **InvalidPayload**: a wire field has the wrong shape
//!
//! Variants never carry plaintext or key bytes.

use thiserror::Error;

/// Result alias used throughout the crate
pub type Result<T> = std::result::Result<T, ShieldedError>;

/// Errors surfaced by the shielded-transaction pipeline
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ShieldedError {
    /// Key material is malformed, out of range, or not a valid curve point
    #[error("Invalid key ({key_type}): {reason}")]
    InvalidKey {
        /// Which key failed (e.g. "local_encryption_key", "tee_public_key")
        key_type: String,
        /// Specific failure reason
        reason: String,
    },

    /// Freshness anchor could not be obtained from the network
    #[error("Freshness anchor unavailable: {0}")]
    AnchorUnavailable(String),

    /// AEAD authentication failed; no plaintext is available
    #[error("Authentication failed: result unavailable")]
    AuthenticationFailed,

    /// Caller requested a combination the protocol cannot express
    #[error("Unsupported operation: {0}")]
    UnsupportedOperation(String),

    /// Freshness anchor expired before submission
    #[error("Freshness anchor expired at block {expires_at_block} (current height {current_height})")]
    Expired {
        expires_at_block: u64,
        current_height: u64,
    },

    /// Network collaborator failure (submission, call, key fetch)
    #[error("Transport error: {0}")]
    Transport(String),

    /// Configuration loading or validation failed
    #[error("Configuration error: {0}")]
    Config(String),

    /// A payload field has the wrong format or size
    #[error("Invalid payload field '{field}': {reason}")]
    InvalidPayload { field: String, reason: String },
}

impl ShieldedError {
    /// Shorthand for [`ShieldedError::InvalidKey`]
    pub fn invalid_key(key_type: &str, reason: impl Into<String>) -> Self {
        ShieldedError::InvalidKey {
            key_type: key_type.to_string(),
            reason: reason.into(),
        }
    }

    /// Shorthand for [`ShieldedError::InvalidPayload`]
    pub fn invalid_payload(field: &str, reason: impl Into<String>) -> Self {
        ShieldedError::InvalidPayload {
            field: field.to_string(),
            reason: reason.into(),
        }
    }

    /// Whether a fresh attempt (new nonce, new ciphertext) may succeed
    ///
    /// Cryptographic failures and programming errors are never retryable.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ShieldedError::AnchorUnavailable(_) | ShieldedError::Transport(_)
        )
    }
}

impl From<hex::FromHexError> for ShieldedError {
    fn from(err: hex::FromHexError) -> Self {
        ShieldedError::InvalidPayload {
            field: "hex_field".to_string(),
            reason: format!("hex decode error: {}", err),
        }
    }
}

impl From<k256::elliptic_curve::Error> for ShieldedError {
    fn from(err: k256::elliptic_curve::Error) -> Self {
        ShieldedError::InvalidKey {
            key_type: "unknown".to_string(),
            reason: format!("k256 error: {}", err),
        }
    }
}

// aead::Error is opaque; the only failure `open` reports is a tag mismatch.
impl From<aes_gcm::aead::Error> for ShieldedError {
    fn from(_: aes_gcm::aead::Error) -> Self {
        ShieldedError::AuthenticationFailed
    }
}

impl From<ethers::utils::rlp::DecoderError> for ShieldedError {
    fn from(err: ethers::utils::rlp::DecoderError) -> Self {
        ShieldedError::InvalidPayload {
            field: "rlp".to_string(),
            reason: err.to_string(),
        }
    }
}

impl From<anyhow::Error> for ShieldedError {
    fn from(err: anyhow::Error) -> Self {
        ShieldedError::Config(err.to_string())
    }
}
