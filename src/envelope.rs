// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Encrypted Envelope Builder
//!
//! Combines the session key, a freshness anchor, a fresh nonce and the AAD of
//! the final context into one sealed envelope:
//!
//! 1. Session key from the session (derived on first use)
//! 2. Anchor from the oracle unless the caller supplied one
//! 3. Fresh 12-byte nonce from `OsRng`
//! 4. AAD = RLP of the final context, including the nonce and anchor
//! 5. AES-256-GCM seal
//!
//! The nonce is drawn only after every fallible network step has completed,
//! and each attempt in `build_with_retry` draws its own.

use crate::aad;
use crate::crypto::{open, seal};
use crate::error::{Result, ShieldedError};
use crate::freshness::FreshnessOracle;
use crate::session::ShieldedSession;
use crate::types::{
    ContextDraft, EncryptedEnvelope, EncryptionMetadata, EncryptionNonce, FreshnessAnchor,
    SessionKey, TransactionContext, MESSAGE_VERSION,
};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Default number of build attempts for retryable failures
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// Base delay for exponential backoff (250ms, 500ms, 1s, ...)
pub const DEFAULT_RETRY_BASE_DELAY: Duration = Duration::from_millis(250);

/// Bounded retry for transient failures
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            base_delay: DEFAULT_RETRY_BASE_DELAY,
        }
    }
}

impl RetryPolicy {
    fn delay_for(&self, attempt: u32) -> Duration {
        self.base_delay.saturating_mul(2u32.saturating_pow(attempt))
    }
}

/// Builds sealed envelopes for shielded writes and signed reads
pub struct EncryptedEnvelopeBuilder {
    oracle: Arc<FreshnessOracle>,
    retry: RetryPolicy,
}

impl EncryptedEnvelopeBuilder {
    pub fn new(oracle: Arc<FreshnessOracle>) -> Self {
        Self::with_retry(oracle, RetryPolicy::default())
    }

    pub fn with_retry(oracle: Arc<FreshnessOracle>, retry: RetryPolicy) -> Self {
        Self { oracle, retry }
    }

    pub fn oracle(&self) -> &Arc<FreshnessOracle> {
        &self.oracle
    }

    /// Seal `plaintext` bound to the context described by `draft`
    ///
    /// `window` overrides the oracle's default freshness window for this call.
    ///
    /// # Errors
    ///
    /// - `InvalidKey` if the session key cannot be derived
    /// - `AnchorUnavailable` if no anchor can be fetched
    /// - `Expired` if the caller supplied an anchor that is already past its window
    pub async fn build(
        &self,
        session: &ShieldedSession,
        plaintext: &[u8],
        draft: ContextDraft,
        window: Option<u64>,
    ) -> Result<EncryptedEnvelope> {
        let key = session.session_key().await?;
        let anchor = self.resolve_anchor(draft.anchor, window).await?;

        let nonce = EncryptionNonce::random();
        let context = TransactionContext {
            from: draft.from,
            chain_id: draft.chain_id,
            nonce: draft.nonce,
            to: draft.to,
            value: draft.value,
            encryption: EncryptionMetadata {
                encryption_pubkey: session.encryption_public_key(),
                encryption_nonce: nonce,
                anchor,
                message_version: MESSAGE_VERSION,
                signed_read: draft.signed_read,
            },
        };

        let aad = aad::encode(&context);
        let ciphertext = seal(&key, &nonce, plaintext, &aad)?;

        debug!(
            "📦 Envelope sealed: chain_id={} nonce={} plaintext={} bytes expires_at={}",
            context.chain_id,
            context.nonce,
            plaintext.len(),
            anchor.expires_at_block
        );

        Ok(EncryptedEnvelope {
            ciphertext: ciphertext.into(),
            context,
        })
    }

    /// Like [`build`](Self::build), retrying transient failures with backoff
    ///
    /// Every attempt is a complete rebuild with a new nonce.
    pub async fn build_with_retry(
        &self,
        session: &ShieldedSession,
        plaintext: &[u8],
        draft: ContextDraft,
        window: Option<u64>,
    ) -> Result<EncryptedEnvelope> {
        let max_attempts = self.retry.max_attempts.max(1);
        let mut attempt = 0;

        loop {
            match self.build(session, plaintext, draft.clone(), window).await {
                Ok(envelope) => return Ok(envelope),
                Err(e) if e.is_retryable() && attempt + 1 < max_attempts => {
                    let delay = self.retry.delay_for(attempt);
                    warn!(
                        "📦 Envelope build attempt {}/{} failed: {} (retrying in {}ms)",
                        attempt + 1,
                        max_attempts,
                        e,
                        delay.as_millis()
                    );
                    // force a fresh chain head on the next attempt
                    self.oracle.invalidate().await;
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => {
                    if e.is_retryable() {
                        info!(
                            "📦 Envelope build gave up after {} attempts: {}",
                            max_attempts, e
                        );
                    }
                    return Err(e);
                }
            }
        }
    }

    async fn resolve_anchor(
        &self,
        supplied: Option<FreshnessAnchor>,
        window: Option<u64>,
    ) -> Result<FreshnessAnchor> {
        match supplied {
            Some(anchor) => {
                let current_height = self.oracle.current_height().await?;
                if anchor.is_expired(current_height) {
                    return Err(ShieldedError::Expired {
                        expires_at_block: anchor.expires_at_block,
                        current_height,
                    });
                }
                Ok(anchor)
            }
            None => self.oracle.current_anchor(window).await,
        }
    }
}

/// Open an envelope with the key it was sealed under (the TEE side of `build`)
pub fn open_envelope(key: &SessionKey, envelope: &EncryptedEnvelope) -> Result<Vec<u8>> {
    open(key, &envelope.nonce(), &envelope.ciphertext, &envelope.aad())
}
