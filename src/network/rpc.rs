// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
use super::ShieldedNetwork;
use crate::config::ShieldedConfig;
use crate::error::{Result, ShieldedError};
use crate::freshness::ChainStateSource;
use crate::session::TeeKeySource;
use crate::types::{BlockRef, RemotePublicKey};
use async_trait::async_trait;
use ethers::middleware::SignerMiddleware;
use ethers::providers::{Http, Middleware, Provider};
use ethers::signers::{LocalWallet, Signer};
use ethers::types::{Address, BlockNumber, Bytes, TransactionRequest, H256, U256};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

/// JSON-RPC method returning the TEE's compressed public key
pub const DEFAULT_TEE_PUBLIC_KEY_METHOD: &str = "seismic_getTeePublicKey";

/// Narrow a node-reported quantity to `u64`, rejecting out-of-range values
fn quantity_u64(value: U256, context: &str) -> Result<u64> {
    if value > U256::from(u64::MAX) {
        return Err(ShieldedError::Transport(format!(
            "{}: value {} exceeds u64",
            context, value
        )));
    }
    Ok(value.low_u64())
}

fn transport<E: std::fmt::Display>(context: &str) -> impl FnOnce(E) -> ShieldedError + '_ {
    move |e| ShieldedError::Transport(format!("{}: {}", context, e))
}

/// [`ShieldedNetwork`] over an HTTP JSON-RPC endpoint
pub struct RpcNetwork {
    provider: Arc<Provider<Http>>,
    signer: Option<SignerMiddleware<Arc<Provider<Http>>, LocalWallet>>,
    tee_key_method: String,
}

impl RpcNetwork {
    pub fn new(rpc_url: &str, tee_key_method: &str) -> Result<Self> {
        let provider = Provider::<Http>::try_from(rpc_url)
            .map_err(|e| ShieldedError::Config(format!("invalid RPC URL '{}': {}", rpc_url, e)))?
            .interval(Duration::from_millis(500));

        Ok(Self {
            provider: Arc::new(provider),
            signer: None,
            tee_key_method: tee_key_method.to_string(),
        })
    }

    pub fn from_config(config: &ShieldedConfig) -> Result<Self> {
        Self::new(&config.rpc_url, &config.tee_public_key_method)
    }

    /// Attach the account wallet used for transparent transactions
    pub fn with_wallet(mut self, wallet: LocalWallet) -> Self {
        self.signer = Some(SignerMiddleware::new(self.provider.clone(), wallet));
        self
    }

    pub fn provider(&self) -> &Arc<Provider<Http>> {
        &self.provider
    }

    /// Fail unless the endpoint reports `expected` as its chain id
    pub async fn verify_chain_id(&self, expected: u64) -> Result<()> {
        let chain_id = self
            .provider
            .get_chainid()
            .await
            .map_err(transport("eth_chainId"))?;

        if chain_id != U256::from(expected) {
            return Err(ShieldedError::Config(format!(
                "Chain ID mismatch: expected {}, got {}",
                expected, chain_id
            )));
        }
        info!("🔗 Connected to chain {}", expected);
        Ok(())
    }
}

#[async_trait]
impl ChainStateSource for RpcNetwork {
    async fn latest_block(&self) -> Result<BlockRef> {
        let block = self
            .provider
            .get_block(BlockNumber::Latest)
            .await
            .map_err(|e| ShieldedError::AnchorUnavailable(format!("eth_getBlockByNumber: {}", e)))?
            .ok_or_else(|| ShieldedError::AnchorUnavailable("node returned no latest block".into()))?;

        match (block.hash, block.number) {
            (Some(hash), Some(number)) => Ok(BlockRef {
                hash,
                number: number.as_u64(),
            }),
            _ => Err(ShieldedError::AnchorUnavailable(
                "latest block is missing hash or number".into(),
            )),
        }
    }
}

#[async_trait]
impl TeeKeySource for RpcNetwork {
    async fn tee_public_key(&self) -> Result<RemotePublicKey> {
        let encoded: String = self
            .provider
            .request(&self.tee_key_method, Vec::<()>::new())
            .await
            .map_err(transport(&self.tee_key_method))?;

        let key = RemotePublicKey::from_hex(&encoded)?;
        debug!("🔑 Fetched TEE public key {:?}", key);
        Ok(key)
    }
}

#[async_trait]
impl ShieldedNetwork for RpcNetwork {
    async fn send_raw_transaction(&self, raw: Bytes) -> Result<H256> {
        let pending = self
            .provider
            .send_raw_transaction(raw)
            .await
            .map_err(transport("eth_sendRawTransaction"))?;
        Ok(pending.tx_hash())
    }

    async fn signed_call(&self, raw: Bytes) -> Result<Bytes> {
        self.provider
            .request("eth_call", (raw, BlockNumber::Latest))
            .await
            .map_err(transport("eth_call"))
    }

    async fn transparent_send(&self, tx: TransactionRequest) -> Result<H256> {
        let signer = self.signer.as_ref().ok_or_else(|| {
            ShieldedError::Config("no wallet configured for transparent transactions".into())
        })?;

        let pending = signer
            .send_transaction(tx, None)
            .await
            .map_err(transport("eth_sendTransaction"))?;
        Ok(pending.tx_hash())
    }

    async fn transparent_call(&self, tx: TransactionRequest) -> Result<Bytes> {
        self.provider
            .call(&tx.into(), None)
            .await
            .map_err(transport("eth_call"))
    }

    async fn gas_price(&self) -> Result<U256> {
        self.provider
            .get_gas_price()
            .await
            .map_err(transport("eth_gasPrice"))
    }

    async fn transaction_count(&self, address: Address) -> Result<u64> {
        let count = self
            .provider
            .get_transaction_count(address, None)
            .await
            .map_err(transport("eth_getTransactionCount"))?;
        quantity_u64(count, "eth_getTransactionCount")
    }
}

impl std::fmt::Debug for RpcNetwork {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RpcNetwork")
            .field("tee_key_method", &self.tee_key_method)
            .field("signer", &self.signer.as_ref().map(|s| s.signer().address()))
            .finish()
    }
}
