// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Network collaborator boundary
//!
//! The pipeline talks to the node through [`ShieldedNetwork`]. The production
//! implementation is [`RpcNetwork`] over ethers' JSON-RPC provider; tests plug
//! in an in-memory TEE.

pub mod rpc;

pub use rpc::{RpcNetwork, DEFAULT_TEE_PUBLIC_KEY_METHOD};

use crate::error::Result;
use crate::freshness::ChainStateSource;
use crate::session::TeeKeySource;
use async_trait::async_trait;
use ethers::types::{Address, Bytes, TransactionRequest, H256, U256};

/// Everything the dispatcher needs from the node
#[async_trait]
pub trait ShieldedNetwork: ChainStateSource + TeeKeySource {
    /// Broadcast a signed `0x4A` transaction; returns its hash
    async fn send_raw_transaction(&self, raw: Bytes) -> Result<H256>;

    /// Execute a signed `0x4A` transaction as a non-broadcast call;
    /// returns the TEE's encrypted response frame
    async fn signed_call(&self, raw: Bytes) -> Result<Bytes>;

    /// Conventional (unencrypted) transaction, signed by the account wallet
    async fn transparent_send(&self, tx: TransactionRequest) -> Result<H256>;

    /// Conventional (unencrypted) `eth_call`
    async fn transparent_call(&self, tx: TransactionRequest) -> Result<Bytes>;

    async fn gas_price(&self) -> Result<U256>;

    async fn transaction_count(&self, address: Address) -> Result<u64>;
}
