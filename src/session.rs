// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Shielded Session
//!
//! Holds the local encryption key and the cached (TEE public key, SessionKey)
//! pair. The pair is written once per session, or again on reconnect, and is
//! read by every call. Both halves are replaced together so a SessionKey never
//! outlives the remote key it was derived from.
//!
//! **Security**: keys are stored in memory only and never logged.

use crate::crypto::derive_session_key;
use crate::error::Result;
use crate::types::{EncryptionKeyPair, RemotePublicKey, SessionKey, COMPRESSED_PUBKEY_SIZE};
use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::info;

/// Source of the TEE public key (network collaborator)
#[async_trait]
pub trait TeeKeySource: Send + Sync {
    async fn tee_public_key(&self) -> Result<RemotePublicKey>;
}

struct SessionSecrets {
    remote: RemotePublicKey,
    key: SessionKey,
}

/// Per-process session with one TEE
///
/// # Example
///
/// ```ignore
/// let session = ShieldedSession::new(EncryptionKeyPair::ephemeral(), network.clone());
/// let key = session.session_key().await?; // fetches the TEE key on first use
/// ```
pub struct ShieldedSession {
    encryption: EncryptionKeyPair,
    key_source: Arc<dyn TeeKeySource>,
    secrets: RwLock<Option<Arc<SessionSecrets>>>,
}

impl ShieldedSession {
    pub fn new(encryption: EncryptionKeyPair, key_source: Arc<dyn TeeKeySource>) -> Self {
        Self {
            encryption,
            key_source,
            secrets: RwLock::new(None),
        }
    }

    /// Compressed public key sent alongside every ciphertext
    pub fn encryption_public_key(&self) -> [u8; COMPRESSED_PUBKEY_SIZE] {
        self.encryption.public_key()
    }

    /// Session key, derived on first use
    pub async fn session_key(&self) -> Result<SessionKey> {
        Ok(self.secrets().await?.key)
    }

    /// Cached TEE public key, fetched on first use
    pub async fn remote_public_key(&self) -> Result<RemotePublicKey> {
        Ok(self.secrets().await?.remote)
    }

    /// Whether the session key has been derived yet
    pub async fn is_established(&self) -> bool {
        self.secrets.read().await.is_some()
    }

    async fn secrets(&self) -> Result<Arc<SessionSecrets>> {
        if let Some(secrets) = self.secrets.read().await.as_ref() {
            return Ok(secrets.clone());
        }

        let mut slot = self.secrets.write().await;
        // another caller may have populated it while we waited for the lock
        if let Some(secrets) = slot.as_ref() {
            return Ok(secrets.clone());
        }

        let remote = self.key_source.tee_public_key().await?;
        let secrets = Arc::new(self.derive(remote)?);
        *slot = Some(secrets.clone());
        Ok(secrets)
    }

    fn derive(&self, remote: RemotePublicKey) -> Result<SessionSecrets> {
        let key = derive_session_key(&self.encryption.secret_bytes(), remote.as_bytes())?;
        info!("🔑 Session key derived for TEE key {:?}", remote);
        Ok(SessionSecrets { remote, key })
    }

    /// Replace the TEE key (e.g. after connecting to a different node)
    ///
    /// Returns `true` when the key changed and the session key was re-derived.
    pub async fn set_remote_public_key(&self, remote: RemotePublicKey) -> Result<bool> {
        let mut slot = self.secrets.write().await;
        if matches!(slot.as_ref(), Some(current) if current.remote == remote) {
            return Ok(false);
        }
        *slot = Some(Arc::new(self.derive(remote)?));
        Ok(true)
    }

    /// Refetch the TEE key from the network and re-derive if it changed
    pub async fn reconnect(&self) -> Result<bool> {
        let remote = self.key_source.tee_public_key().await?;
        let changed = self.set_remote_public_key(remote).await?;
        if changed {
            info!("🔄 TEE key rotated on reconnect; session key re-derived");
        }
        Ok(changed)
    }

    /// Forget the cached TEE key and session key
    pub async fn clear(&self) {
        if self.secrets.write().await.take().is_some() {
            info!("🗑️  Session key cleared");
        }
    }
}
