// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Cryptographic primitives for shielded calls
//!
//! - **Key agreement**: ECDH on secp256k1 with the TEE public key, HKDF-SHA256 to a 32-byte key
//! - **AEAD**: AES-256-GCM with a 12-byte nonce and a 16-byte appended tag
//!
//! ## Security Considerations
//!
//! - Session keys live in memory only and are never logged
//! - Nonces must be unique per encryption under one session key
//! - AAD binds the public transaction context to the ciphertext

pub mod aead;
pub mod key_agreement;

pub use aead::{open, seal};
pub use key_agreement::{derive_session_key, SESSION_KEY_HKDF_INFO};
