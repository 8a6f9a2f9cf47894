// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Request Dispatcher
//!
//! Routes each call by its explicit [`Operation`]:
//!
//! | Operation | `to` | Route |
//! |---|---|---|
//! | `ShieldedWrite` | `Some` | signed `0x4A` tx via `eth_sendRawTransaction` |
//! | `SignedRead` | `Some` | signed `0x4A` tx via `eth_call`, response decrypted |
//! | `Transparent` | any | conventional transaction or call |
//! | `ShieldedWrite` / `SignedRead` | `None` | `UnsupportedOperation` |
//!
//! Encrypted contract deployment does not exist in the protocol; deployments
//! must go through the transparent path.

use crate::config::ShieldedConfig;
use crate::envelope::EncryptedEnvelopeBuilder;
use crate::error::{Result, ShieldedError};
use crate::freshness::{ChainStateSource, FreshnessOracle};
use crate::network::ShieldedNetwork;
use crate::response::decrypt_response;
use crate::session::{ShieldedSession, TeeKeySource};
use crate::transaction::{ShieldedTransaction, SignedShieldedTransaction};
use crate::types::{ContextDraft, EncryptionKeyPair, FreshnessAnchor};
use ethers::signers::{LocalWallet, Signer};
use ethers::types::{Address, Bytes, TransactionRequest, H256, U256};
use std::sync::Arc;
use tracing::{debug, info};

/// How a call is carried, chosen by the caller
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    /// Unencrypted transaction or call
    Transparent,
    /// Encrypted state-changing transaction
    ShieldedWrite,
    /// Encrypted, signed, non-broadcast call with an encrypted result
    SignedRead,
}

/// A single call as described by the caller
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallRequest {
    pub operation: Operation,
    /// `None` means contract deployment
    pub to: Option<Address>,
    pub value: U256,
    /// Calldata (plaintext for shielded operations)
    pub data: Bytes,
    /// Account nonce; fetched from the network when `None`
    pub nonce: Option<u64>,
    pub gas_limit: Option<U256>,
    /// Per-call freshness window override (blocks)
    pub freshness_window: Option<u64>,
    /// Caller-supplied anchor
    pub anchor: Option<FreshnessAnchor>,
    /// Transparent only: execute as `eth_call` instead of sending
    pub read_only: bool,
}

impl CallRequest {
    fn with_operation(operation: Operation, to: Option<Address>, data: Bytes) -> Self {
        Self {
            operation,
            to,
            value: U256::zero(),
            data,
            nonce: None,
            gas_limit: None,
            freshness_window: None,
            anchor: None,
            read_only: false,
        }
    }

    pub fn shielded_write(to: Address, data: impl Into<Bytes>) -> Self {
        Self::with_operation(Operation::ShieldedWrite, Some(to), data.into())
    }

    pub fn signed_read(to: Address, data: impl Into<Bytes>) -> Self {
        Self::with_operation(Operation::SignedRead, Some(to), data.into())
    }

    pub fn transparent_send(to: Address, data: impl Into<Bytes>) -> Self {
        Self::with_operation(Operation::Transparent, Some(to), data.into())
    }

    pub fn transparent_call(to: Address, data: impl Into<Bytes>) -> Self {
        let mut request = Self::with_operation(Operation::Transparent, Some(to), data.into());
        request.read_only = true;
        request
    }

    /// Contract creation; only valid on the transparent path
    pub fn deploy(bytecode: impl Into<Bytes>) -> Self {
        Self::with_operation(Operation::Transparent, None, bytecode.into())
    }

    pub fn with_operation_kind(mut self, operation: Operation) -> Self {
        self.operation = operation;
        self
    }

    pub fn with_value(mut self, value: U256) -> Self {
        self.value = value;
        self
    }

    pub fn with_nonce(mut self, nonce: u64) -> Self {
        self.nonce = Some(nonce);
        self
    }

    pub fn with_gas_limit(mut self, gas_limit: U256) -> Self {
        self.gas_limit = Some(gas_limit);
        self
    }

    pub fn with_freshness_window(mut self, blocks: u64) -> Self {
        self.freshness_window = Some(blocks);
        self
    }

    pub fn with_anchor(mut self, anchor: FreshnessAnchor) -> Self {
        self.anchor = Some(anchor);
        self
    }

    pub fn is_deployment(&self) -> bool {
        self.to.is_none()
    }
}

/// Network path a request takes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    ShieldedTransaction,
    SignedCall,
    TransparentTransaction,
    TransparentCall,
}

/// Result of a dispatched request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// Transaction accepted by the node
    Submitted(H256),
    /// Decrypted signed-read result
    Plaintext(Vec<u8>),
    /// Unencrypted call result
    Returned(Bytes),
}

impl DispatchOutcome {
    pub fn tx_hash(&self) -> Option<H256> {
        match self {
            DispatchOutcome::Submitted(hash) => Some(*hash),
            _ => None,
        }
    }
}

/// Decide the route for a request without touching the network
pub fn classify(request: &CallRequest) -> Result<Route> {
    match (request.operation, request.to) {
        (Operation::ShieldedWrite | Operation::SignedRead, None) => {
            Err(ShieldedError::UnsupportedOperation(
                "encrypted contract deployment is not supported; deploy transparently".into(),
            ))
        }
        (Operation::ShieldedWrite, Some(_)) => Ok(Route::ShieldedTransaction),
        (Operation::SignedRead, Some(_)) => Ok(Route::SignedCall),
        (Operation::Transparent, _) if request.read_only => Ok(Route::TransparentCall),
        (Operation::Transparent, _) => Ok(Route::TransparentTransaction),
    }
}

/// Entry point for callers: classifies, encrypts, signs and submits
pub struct RequestDispatcher<N: ShieldedNetwork + 'static> {
    network: Arc<N>,
    session: Arc<ShieldedSession>,
    builder: EncryptedEnvelopeBuilder,
    wallet: LocalWallet,
    chain_id: u64,
    default_gas_limit: U256,
}

impl<N: ShieldedNetwork + 'static> RequestDispatcher<N> {
    /// Wire a session, oracle and builder around `network`
    pub fn new(
        network: Arc<N>,
        wallet: LocalWallet,
        encryption: EncryptionKeyPair,
        config: &ShieldedConfig,
    ) -> Self {
        let chain_source: Arc<dyn ChainStateSource> = network.clone();
        let key_source: Arc<dyn TeeKeySource> = network.clone();

        let oracle = Arc::new(FreshnessOracle::with_settings(
            chain_source,
            config.freshness_window,
            config.anchor_cache_ttl(),
        ));
        let builder = EncryptedEnvelopeBuilder::with_retry(oracle, config.retry_policy());
        let session = Arc::new(ShieldedSession::new(encryption, key_source));

        Self::from_parts(
            network,
            session,
            builder,
            wallet,
            config.chain_id,
            U256::from(config.gas_limit),
        )
    }

    pub fn from_parts(
        network: Arc<N>,
        session: Arc<ShieldedSession>,
        builder: EncryptedEnvelopeBuilder,
        wallet: LocalWallet,
        chain_id: u64,
        default_gas_limit: U256,
    ) -> Self {
        Self {
            network,
            session,
            builder,
            wallet,
            chain_id,
            default_gas_limit,
        }
    }

    pub fn session(&self) -> &Arc<ShieldedSession> {
        &self.session
    }

    pub fn network(&self) -> &Arc<N> {
        &self.network
    }

    pub fn sender(&self) -> Address {
        self.wallet.address()
    }

    /// Route and execute one request
    ///
    /// # Errors
    ///
    /// - `UnsupportedOperation` for encrypted deployments
    /// - `AnchorUnavailable` / `InvalidKey` from envelope construction
    /// - `Expired` if the anchor lapsed before submission
    /// - `AuthenticationFailed` if a signed-read response does not open
    /// - `Transport` for network failures
    pub async fn dispatch(&self, request: CallRequest) -> Result<DispatchOutcome> {
        let route = classify(&request)?;
        debug!("🧭 Dispatching {:?} request via {:?}", request.operation, route);

        match route {
            Route::ShieldedTransaction => {
                let signed = self.prepare_shielded(&request, false).await?;
                self.ensure_fresh(&signed).await?;

                let hash = self.network.send_raw_transaction(signed.encode()).await?;
                info!(
                    "🛡️  Shielded transaction submitted: {:?} (nonce {})",
                    hash,
                    signed.tx.context().nonce
                );
                Ok(DispatchOutcome::Submitted(hash))
            }
            Route::SignedCall => {
                let signed = self.prepare_shielded(&request, true).await?;
                self.ensure_fresh(&signed).await?;

                let response = self.network.signed_call(signed.encode()).await?;
                let plaintext =
                    decrypt_response(&self.session, signed.tx.context(), &response).await?;
                debug!("🛡️  Signed read returned {} bytes", plaintext.len());
                Ok(DispatchOutcome::Plaintext(plaintext))
            }
            Route::TransparentTransaction => {
                let hash = self
                    .network
                    .transparent_send(self.transparent_request(&request))
                    .await?;
                info!("📤 Transparent transaction submitted: {:?}", hash);
                Ok(DispatchOutcome::Submitted(hash))
            }
            Route::TransparentCall => {
                let output = self
                    .network
                    .transparent_call(self.transparent_request(&request))
                    .await?;
                Ok(DispatchOutcome::Returned(output))
            }
        }
    }

    /// Build and sign the typed transaction for a shielded route
    pub async fn prepare_shielded(
        &self,
        request: &CallRequest,
        signed_read: bool,
    ) -> Result<SignedShieldedTransaction> {
        let from = self.wallet.address();
        let nonce = match request.nonce {
            Some(nonce) => nonce,
            None => self.network.transaction_count(from).await?,
        };
        // all network lookups happen before the envelope draws its nonce
        let gas_price = self.network.gas_price().await?;
        let gas_limit = request.gas_limit.unwrap_or(self.default_gas_limit);

        let mut draft =
            ContextDraft::new(from, self.chain_id, nonce, request.to).with_value(request.value);
        if let Some(anchor) = request.anchor {
            draft = draft.with_anchor(anchor);
        }
        if signed_read {
            draft = draft.signed_read();
        }

        let envelope = self
            .builder
            .build_with_retry(&self.session, &request.data, draft, request.freshness_window)
            .await?;

        ShieldedTransaction::new(envelope, gas_price, gas_limit).sign(&self.wallet)
    }

    async fn ensure_fresh(&self, signed: &SignedShieldedTransaction) -> Result<()> {
        let anchor = signed.tx.context().encryption.anchor;
        let current_height = self.builder.oracle().current_height().await?;
        if anchor.is_expired(current_height) {
            return Err(ShieldedError::Expired {
                expires_at_block: anchor.expires_at_block,
                current_height,
            });
        }
        Ok(())
    }

    fn transparent_request(&self, request: &CallRequest) -> TransactionRequest {
        let mut tx = TransactionRequest::new()
            .from(self.wallet.address())
            .value(request.value)
            .data(request.data.clone())
            .chain_id(self.chain_id);
        if let Some(to) = request.to {
            tx = tx.to(to);
        }
        if let Some(nonce) = request.nonce {
            tx = tx.nonce(nonce);
        }
        if let Some(gas) = request.gas_limit {
            tx = tx.gas(gas);
        }
        tx
    }
}
