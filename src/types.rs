// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Core data model for shielded calls
//!
//! Public context fields travel in the clear and are bound to the ciphertext
//! through AAD. Secret material (`SessionKey`, local keys) never implements a
//! `Debug` that prints bytes.

use crate::error::{Result, ShieldedError};
use ethers::types::{Address, Bytes, H256, U256};
use k256::{elliptic_curve::sec1::ToEncodedPoint, PublicKey, SecretKey};
use rand::{rngs::OsRng, RngCore};
use serde::{Deserialize, Serialize};
use std::fmt;

/// AES-GCM nonce size in bytes
pub const NONCE_SIZE: usize = 12;

/// AES-GCM authentication tag size in bytes
pub const TAG_SIZE: usize = 16;

/// Compressed secp256k1 public key size in bytes
pub const COMPRESSED_PUBKEY_SIZE: usize = 33;

/// Current version of the encryption metadata layout
pub const MESSAGE_VERSION: u8 = 0;

/// Symmetric key shared with the TEE for the lifetime of a session
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct SessionKey([u8; 32]);

impl SessionKey {
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl fmt::Debug for SessionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SessionKey(<redacted>)")
    }
}

/// 12-byte AES-GCM nonce, unique per encryption under one SessionKey
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EncryptionNonce(pub [u8; NONCE_SIZE]);

impl EncryptionNonce {
    /// Draw a fresh nonce from the operating system CSPRNG
    pub fn random() -> Self {
        let mut bytes = [0u8; NONCE_SIZE];
        OsRng.fill_bytes(&mut bytes);
        Self(bytes)
    }

    pub fn from_slice(bytes: &[u8]) -> Result<Self> {
        let array: [u8; NONCE_SIZE] = bytes.try_into().map_err(|_| ShieldedError::InvalidPayload {
            field: "encryption_nonce".to_string(),
            reason: format!("expected {} bytes, got {}", NONCE_SIZE, bytes.len()),
        })?;
        Ok(Self(array))
    }

    pub fn as_bytes(&self) -> &[u8; NONCE_SIZE] {
        &self.0
    }
}

/// The TEE's compressed secp256k1 public key
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct RemotePublicKey([u8; COMPRESSED_PUBKEY_SIZE]);

impl RemotePublicKey {
    /// Parse and validate a 33-byte compressed point
    pub fn from_slice(bytes: &[u8]) -> Result<Self> {
        if bytes.len() != COMPRESSED_PUBKEY_SIZE {
            return Err(ShieldedError::invalid_key(
                "tee_public_key",
                format!(
                    "expected {} bytes compressed, got {}",
                    COMPRESSED_PUBKEY_SIZE,
                    bytes.len()
                ),
            ));
        }
        PublicKey::from_sec1_bytes(bytes)
            .map_err(|e| ShieldedError::invalid_key("tee_public_key", format!("invalid point: {}", e)))?;

        let mut array = [0u8; COMPRESSED_PUBKEY_SIZE];
        array.copy_from_slice(bytes);
        Ok(Self(array))
    }

    /// Parse a 0x-prefixed (or bare) hex string
    pub fn from_hex(hex_str: &str) -> Result<Self> {
        let clean = hex_str.trim().strip_prefix("0x").unwrap_or(hex_str.trim());
        let bytes = hex::decode(clean)?;
        Self::from_slice(&bytes)
    }

    pub fn as_bytes(&self) -> &[u8; COMPRESSED_PUBKEY_SIZE] {
        &self.0
    }
}

impl fmt::Debug for RemotePublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RemotePublicKey(0x{})", hex::encode(self.0))
    }
}

/// Local secp256k1 encryption key (ephemeral per session, or caller supplied)
#[derive(Clone)]
pub struct EncryptionKeyPair {
    secret: SecretKey,
    public: [u8; COMPRESSED_PUBKEY_SIZE],
}

impl EncryptionKeyPair {
    /// Generate a random key pair for one session
    pub fn ephemeral() -> Self {
        Self::from_secret(SecretKey::random(&mut OsRng))
    }

    /// Build a deterministic key pair from a caller-supplied 32-byte scalar
    pub fn from_bytes(secret: &[u8]) -> Result<Self> {
        if secret.len() != 32 {
            return Err(ShieldedError::invalid_key(
                "local_encryption_key",
                format!("expected 32 bytes, got {}", secret.len()),
            ));
        }
        let secret = SecretKey::from_slice(secret).map_err(|e| {
            ShieldedError::invalid_key("local_encryption_key", format!("out of range: {}", e))
        })?;
        Ok(Self::from_secret(secret))
    }

    fn from_secret(secret: SecretKey) -> Self {
        let encoded = secret.public_key().to_encoded_point(true);
        let mut public = [0u8; COMPRESSED_PUBKEY_SIZE];
        public.copy_from_slice(encoded.as_bytes());
        Self { secret, public }
    }

    /// Raw 32-byte private scalar, for key agreement only
    pub fn secret_bytes(&self) -> [u8; 32] {
        let mut out = [0u8; 32];
        out.copy_from_slice(&self.secret.to_bytes());
        out
    }

    /// Compressed public key transmitted in the encryption metadata
    pub fn public_key(&self) -> [u8; COMPRESSED_PUBKEY_SIZE] {
        self.public
    }
}

impl fmt::Debug for EncryptionKeyPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EncryptionKeyPair")
            .field("public", &format!("0x{}", hex::encode(self.public)))
            .finish_non_exhaustive()
    }
}

/// Recent chain-state reference bounding how long a payload stays valid
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FreshnessAnchor {
    /// Hash of the block the anchor was taken from
    pub block_hash: H256,
    /// Last block height at which the payload is still accepted
    pub expires_at_block: u64,
}

/// Encryption metadata carried in the clear next to the ciphertext
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct EncryptionMetadata {
    pub encryption_pubkey: [u8; COMPRESSED_PUBKEY_SIZE],
    pub encryption_nonce: EncryptionNonce,
    pub anchor: FreshnessAnchor,
    pub message_version: u8,
    pub signed_read: bool,
}

/// Public fields of a shielded call; the canonical AAD input
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TransactionContext {
    pub from: Address,
    pub chain_id: u64,
    pub nonce: u64,
    pub to: Option<Address>,
    pub value: U256,
    pub encryption: EncryptionMetadata,
}

/// Caller-provided fields of a context before encryption metadata is filled in
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ContextDraft {
    pub from: Address,
    pub chain_id: u64,
    pub nonce: u64,
    pub to: Option<Address>,
    pub value: U256,
    /// Caller-supplied anchor; fetched from the oracle when `None`
    pub anchor: Option<FreshnessAnchor>,
    pub signed_read: bool,
}

impl ContextDraft {
    pub fn new(from: Address, chain_id: u64, nonce: u64, to: Option<Address>) -> Self {
        Self {
            from,
            chain_id,
            nonce,
            to,
            value: U256::zero(),
            anchor: None,
            signed_read: false,
        }
    }

    pub fn with_value(mut self, value: U256) -> Self {
        self.value = value;
        self
    }

    pub fn with_anchor(mut self, anchor: FreshnessAnchor) -> Self {
        self.anchor = Some(anchor);
        self
    }

    pub fn signed_read(mut self) -> Self {
        self.signed_read = true;
        self
    }
}

/// Ciphertext plus the exact context it is bound to
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EncryptedEnvelope {
    /// Ciphertext followed by the 16-byte tag
    pub ciphertext: Bytes,
    pub context: TransactionContext,
}

impl EncryptedEnvelope {
    /// Nonce the ciphertext was sealed with (carried in the context metadata)
    pub fn nonce(&self) -> EncryptionNonce {
        self.context.encryption.encryption_nonce
    }

    /// AAD bytes the ciphertext was sealed against
    pub fn aad(&self) -> Vec<u8> {
        crate::aad::encode(&self.context)
    }
}

/// Latest block as reported by the network
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BlockRef {
    pub hash: H256,
    pub number: u64,
}
