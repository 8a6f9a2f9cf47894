// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Client configuration
//!
//! Loaded from an optional TOML file, then overridden by environment variables
//! (a `.env` file is honoured via `dotenv`):
//!
//! | Variable | Field |
//! |---|---|
//! | `SHIELDED_RPC_URL` | `rpc_url` |
//! | `SHIELDED_CHAIN_ID` | `chain_id` |
//! | `SHIELDED_FRESHNESS_WINDOW` | `freshness_window` |
//! | `SHIELDED_GAS_LIMIT` | `gas_limit` |
//! | `SHIELDED_TEE_KEY_METHOD` | `tee_public_key_method` |
//! | `SHIELDED_SIGNING_KEY` | `signing_key` |
//! | `SHIELDED_ENCRYPTION_KEY` | `encryption_key` |
//!
//! Private keys are 0x-prefixed 32-byte hex strings and are never logged.

use crate::envelope::RetryPolicy;
use crate::error::{Result, ShieldedError};
use crate::freshness::DEFAULT_FRESHNESS_WINDOW;
use crate::network::DEFAULT_TEE_PUBLIC_KEY_METHOD;
use crate::types::EncryptionKeyPair;
use anyhow::{anyhow, Context};
use ethers::signers::{LocalWallet, Signer};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::time::Duration;
use tracing::info;

#[derive(Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ShieldedConfig {
    pub rpc_url: String,
    pub chain_id: u64,
    /// Blocks after the anchor block during which a call stays valid
    pub freshness_window: u64,
    pub anchor_cache_ttl_ms: u64,
    pub max_build_attempts: u32,
    pub retry_base_delay_ms: u64,
    /// Gas limit for shielded transactions when the request sets none
    pub gas_limit: u64,
    pub tee_public_key_method: String,
    pub signing_key: Option<String>,
    /// Deterministic encryption key; a random one is generated per session when unset
    pub encryption_key: Option<String>,
}

impl Default for ShieldedConfig {
    fn default() -> Self {
        Self {
            rpc_url: "http://localhost:8545".to_string(),
            chain_id: 5124,
            freshness_window: DEFAULT_FRESHNESS_WINDOW,
            anchor_cache_ttl_ms: 2_000,
            max_build_attempts: 3,
            retry_base_delay_ms: 250,
            gas_limit: 3_000_000,
            tee_public_key_method: DEFAULT_TEE_PUBLIC_KEY_METHOD.to_string(),
            signing_key: None,
            encryption_key: None,
        }
    }
}

impl fmt::Debug for ShieldedConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let redact = |key: &Option<String>| key.as_ref().map(|_| "<redacted>");
        f.debug_struct("ShieldedConfig")
            .field("rpc_url", &self.rpc_url)
            .field("chain_id", &self.chain_id)
            .field("freshness_window", &self.freshness_window)
            .field("anchor_cache_ttl_ms", &self.anchor_cache_ttl_ms)
            .field("max_build_attempts", &self.max_build_attempts)
            .field("retry_base_delay_ms", &self.retry_base_delay_ms)
            .field("gas_limit", &self.gas_limit)
            .field("tee_public_key_method", &self.tee_public_key_method)
            .field("signing_key", &redact(&self.signing_key))
            .field("encryption_key", &redact(&self.encryption_key))
            .finish()
    }
}

impl ShieldedConfig {
    pub fn from_toml_str(contents: &str) -> Result<Self> {
        let config: Self = toml::from_str(contents)
            .map_err(|e| ShieldedError::Config(format!("invalid TOML: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {}", path.display()))?;
        Self::from_toml_str(&contents)
    }

    /// File (if given) + `.env` + process environment
    pub fn load(path: Option<&Path>) -> Result<Self> {
        dotenv::dotenv().ok();

        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        config.apply_env_overrides_from(|name| std::env::var(name).ok())?;
        config.validate()?;

        info!(
            "⚙️  Shielded client config loaded: chain_id={} rpc_url={} window={}",
            config.chain_id, config.rpc_url, config.freshness_window
        );
        Ok(config)
    }

    /// Apply overrides from `lookup` (normally `std::env::var`)
    pub fn apply_env_overrides_from<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(url) = lookup("SHIELDED_RPC_URL") {
            self.rpc_url = url;
        }
        if let Some(value) = lookup("SHIELDED_CHAIN_ID") {
            self.chain_id = parse_number("SHIELDED_CHAIN_ID", &value)?;
        }
        if let Some(value) = lookup("SHIELDED_FRESHNESS_WINDOW") {
            self.freshness_window = parse_number("SHIELDED_FRESHNESS_WINDOW", &value)?;
        }
        if let Some(value) = lookup("SHIELDED_GAS_LIMIT") {
            self.gas_limit = parse_number("SHIELDED_GAS_LIMIT", &value)?;
        }
        if let Some(method) = lookup("SHIELDED_TEE_KEY_METHOD") {
            self.tee_public_key_method = method;
        }
        if let Some(key) = lookup("SHIELDED_SIGNING_KEY") {
            self.signing_key = Some(key);
        }
        if let Some(key) = lookup("SHIELDED_ENCRYPTION_KEY") {
            self.encryption_key = Some(key);
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.rpc_url.trim().is_empty() {
            return Err(ShieldedError::Config("rpc_url is empty".into()));
        }
        if self.chain_id == 0 {
            return Err(ShieldedError::Config("chain_id must be nonzero".into()));
        }
        if self.freshness_window == 0 {
            return Err(ShieldedError::Config(
                "freshness_window must be at least one block".into(),
            ));
        }
        if self.max_build_attempts == 0 {
            return Err(ShieldedError::Config(
                "max_build_attempts must be at least 1".into(),
            ));
        }
        Ok(())
    }

    pub fn anchor_cache_ttl(&self) -> Duration {
        Duration::from_millis(self.anchor_cache_ttl_ms)
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_build_attempts,
            base_delay: Duration::from_millis(self.retry_base_delay_ms),
        }
    }

    /// Account wallet bound to `chain_id`
    pub fn signing_wallet(&self) -> Result<LocalWallet> {
        let raw = self
            .signing_key
            .as_deref()
            .ok_or_else(|| ShieldedError::Config("SHIELDED_SIGNING_KEY not set".into()))?;
        let bytes = parse_private_key("signing_key", raw)?;
        let wallet = LocalWallet::from_bytes(&bytes)
            .map_err(|e| ShieldedError::invalid_key("signing_key", e.to_string()))?;
        Ok(wallet.with_chain_id(self.chain_id))
    }

    /// Configured encryption key, or a fresh ephemeral one
    pub fn encryption_key_pair(&self) -> Result<EncryptionKeyPair> {
        match self.encryption_key.as_deref() {
            Some(raw) => {
                let bytes = parse_private_key("encryption_key", raw)?;
                EncryptionKeyPair::from_bytes(&bytes)
            }
            None => Ok(EncryptionKeyPair::ephemeral()),
        }
    }
}

fn parse_number<T: std::str::FromStr>(name: &str, value: &str) -> Result<T>
where
    T::Err: fmt::Display,
{
    value
        .trim()
        .parse::<T>()
        .map_err(|e| anyhow!("{} is not a valid number: {}", name, e).into())
}

/// Parse a 0x-prefixed, 64-hex-character private key
fn parse_private_key(key_type: &str, raw: &str) -> Result<[u8; 32]> {
    let raw = raw.trim();

    let hex_str = raw.strip_prefix("0x").ok_or_else(|| {
        ShieldedError::invalid_key(key_type, "must start with '0x' prefix (Ethereum format)")
    })?;

    if hex_str.len() != 64 {
        return Err(ShieldedError::invalid_key(
            key_type,
            format!(
                "must be exactly 64 hex characters (32 bytes), got {} characters",
                hex_str.len()
            ),
        ));
    }

    let bytes = hex::decode(hex_str)
        .map_err(|e| ShieldedError::invalid_key(key_type, format!("invalid hex: {}", e)))?;

    let mut key = [0u8; 32];
    key.copy_from_slice(&bytes);
    Ok(key)
}
