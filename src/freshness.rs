// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Freshness anchors
//!
//! A shielded call carries the hash of a recent block and the last height at
//! which it may be included. The oracle fetches the chain head from the
//! network and keeps it for a short TTL so concurrent calls do not each pay a
//! round trip. It never invents an anchor: if the head cannot be fetched the
//! call fails with `AnchorUnavailable`.

use crate::error::{Result, ShieldedError};
use crate::types::{BlockRef, FreshnessAnchor};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use tracing::{debug, warn};

/// Default validity window in blocks
pub const DEFAULT_FRESHNESS_WINDOW: u64 = 100;

/// Default time a fetched chain head may be reused
pub const DEFAULT_ANCHOR_CACHE_TTL: Duration = Duration::from_secs(2);

/// Source of the latest block (network collaborator)
#[async_trait]
pub trait ChainStateSource: Send + Sync {
    async fn latest_block(&self) -> Result<BlockRef>;
}

/// Returns true once `current_height` is past the anchor's expiry
pub fn is_expired(anchor: &FreshnessAnchor, current_height: u64) -> bool {
    current_height > anchor.expires_at_block
}

impl FreshnessAnchor {
    pub fn is_expired(&self, current_height: u64) -> bool {
        is_expired(self, current_height)
    }
}

#[derive(Debug, Clone, Copy)]
struct CachedHead {
    block: BlockRef,
    fetched_at: Instant,
}

/// Supplies freshness anchors from the chain head
pub struct FreshnessOracle {
    source: Arc<dyn ChainStateSource>,
    default_window: u64,
    cache_ttl: Duration,
    cache: RwLock<Option<CachedHead>>,
}

impl FreshnessOracle {
    pub fn new(source: Arc<dyn ChainStateSource>) -> Self {
        Self::with_settings(source, DEFAULT_FRESHNESS_WINDOW, DEFAULT_ANCHOR_CACHE_TTL)
    }

    pub fn with_settings(
        source: Arc<dyn ChainStateSource>,
        default_window: u64,
        cache_ttl: Duration,
    ) -> Self {
        Self {
            source,
            default_window,
            cache_ttl,
            cache: RwLock::new(None),
        }
    }

    pub fn default_window(&self) -> u64 {
        self.default_window
    }

    /// Build an anchor expiring `window` blocks after the chain head
    ///
    /// `window` overrides the configured default for this call only.
    pub async fn current_anchor(&self, window: Option<u64>) -> Result<FreshnessAnchor> {
        let window = window.unwrap_or(self.default_window);
        let head = self.head().await?;

        let expires_at_block = head.number.checked_add(window).ok_or_else(|| {
            ShieldedError::invalid_payload(
                "freshness_window",
                format!("expiry overflows: height {} + window {}", head.number, window),
            )
        })?;

        Ok(FreshnessAnchor {
            block_hash: head.hash,
            expires_at_block,
        })
    }

    /// Latest known chain height (cached within the TTL)
    pub async fn current_height(&self) -> Result<u64> {
        Ok(self.head().await?.number)
    }

    /// Drop the cached head so the next call refetches
    pub async fn invalidate(&self) {
        *self.cache.write().await = None;
    }

    async fn head(&self) -> Result<BlockRef> {
        if let Some(cached) = *self.cache.read().await {
            if cached.fetched_at.elapsed() < self.cache_ttl {
                return Ok(cached.block);
            }
        }

        let block = self.source.latest_block().await.map_err(|e| {
            warn!("⏱️  Failed to fetch chain head for freshness anchor: {}", e);
            match e {
                ShieldedError::AnchorUnavailable(msg) => ShieldedError::AnchorUnavailable(msg),
                other => ShieldedError::AnchorUnavailable(other.to_string()),
            }
        })?;

        let mut cache = self.cache.write().await;
        // a concurrent fetch may already have stored a newer head
        if let Some(existing) = *cache {
            if existing.block.number > block.number
                && existing.fetched_at.elapsed() < self.cache_ttl
            {
                return Ok(existing.block);
            }
        }
        *cache = Some(CachedHead {
            block,
            fetched_at: Instant::now(),
        });
        debug!("⏱️  Chain head refreshed: height={} hash={:?}", block.number, block.hash);

        Ok(block)
    }
}
