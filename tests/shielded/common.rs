//! Shared fixtures: an in-memory TEE node implementing `ShieldedNetwork`
#![allow(dead_code)]

use async_trait::async_trait;
use ethers::signers::{LocalWallet, Signer};
use ethers::types::{Address, Bytes, TransactionRequest, H256, U256};
use shielded_tx_client::crypto::derive_session_key;
use shielded_tx_client::response::seal_response;
use shielded_tx_client::{
    open_envelope, BlockRef, ChainStateSource, EncryptionKeyPair, RemotePublicKey, Result,
    ShieldedError, ShieldedNetwork, SignedShieldedTransaction, TeeKeySource,
};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Mutex, Once};

pub const CHAIN_ID: u64 = 5124;
pub const ACCOUNT_NONCE: u64 = 7;

static TRACING: Once = Once::new();

pub fn init_tracing() {
    TRACING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_test_writer()
            .with_max_level(tracing::Level::DEBUG)
            .try_init();
    });
}

pub fn test_wallet() -> LocalWallet {
    LocalWallet::from_bytes(&[0x42; 32])
        .unwrap()
        .with_chain_id(CHAIN_ID)
}

pub fn contract() -> Address {
    Address::repeat_byte(0x22)
}

/// What the TEE saw after decrypting a shielded transaction
#[derive(Debug, Clone)]
pub struct Received {
    pub sender: Address,
    pub plaintext: Vec<u8>,
    pub signed: SignedShieldedTransaction,
}

/// Simulated TEE-backed node
pub struct InMemoryTee {
    key: EncryptionKeyPair,
    height: AtomicU64,
    block_hash: H256,
    /// Remaining `latest_block` calls that fail with a transport error
    failing_head_calls: AtomicUsize,
    pub head_calls: AtomicUsize,
    pub key_fetches: AtomicUsize,
    pub writes: Mutex<Vec<Received>>,
    pub reads: Mutex<Vec<Received>>,
    pub transparent: Mutex<Vec<TransactionRequest>>,
    /// Replace signed-read responses with raw bytes (to simulate a bad TEE)
    pub corrupt_responses: Mutex<Option<Vec<u8>>>,
    /// Answer signed reads with the previous response frame instead
    pub replay_last_response: AtomicBool,
    last_response: Mutex<Option<Vec<u8>>>,
    /// Height the chain jumps to once `latest_block` has been called N times
    height_jump: Mutex<Option<(usize, u64)>>,
}

impl InMemoryTee {
    pub fn new(height: u64) -> Self {
        Self {
            key: EncryptionKeyPair::from_bytes(&[0x33; 32]).unwrap(),
            height: AtomicU64::new(height),
            block_hash: H256::repeat_byte(0xB1),
            failing_head_calls: AtomicUsize::new(0),
            head_calls: AtomicUsize::new(0),
            key_fetches: AtomicUsize::new(0),
            writes: Mutex::new(Vec::new()),
            reads: Mutex::new(Vec::new()),
            transparent: Mutex::new(Vec::new()),
            corrupt_responses: Mutex::new(None),
            replay_last_response: AtomicBool::new(false),
            last_response: Mutex::new(None),
            height_jump: Mutex::new(None),
        }
    }

    pub fn block_hash(&self) -> H256 {
        self.block_hash
    }

    pub fn public_key(&self) -> RemotePublicKey {
        RemotePublicKey::from_slice(&self.key.public_key()).unwrap()
    }

    pub fn set_height(&self, height: u64) {
        self.height.store(height, Ordering::SeqCst);
    }

    /// After `calls` head lookups, report `height` from then on
    pub fn jump_height_after(&self, calls: usize, height: u64) {
        *self.height_jump.lock().unwrap() = Some((calls, height));
    }

    pub fn fail_next_head_calls(&self, count: usize) {
        self.failing_head_calls.store(count, Ordering::SeqCst);
    }

    /// TEE side: decode, derive the key from the carried pubkey, open with rebuilt AAD
    pub fn receive(&self, raw: &[u8]) -> Result<(Received, shielded_tx_client::SessionKey)> {
        let signed = SignedShieldedTransaction::decode(raw)?;
        let context = signed.tx.context();
        let key = derive_session_key(
            &self.key.secret_bytes(),
            &context.encryption.encryption_pubkey,
        )?;

        let current = self.height.load(Ordering::SeqCst);
        if context.encryption.anchor.is_expired(current) {
            return Err(ShieldedError::Expired {
                expires_at_block: context.encryption.anchor.expires_at_block,
                current_height: current,
            });
        }

        let plaintext = open_envelope(&key, &signed.tx.envelope)?;
        Ok((
            Received {
                sender: context.from,
                plaintext,
                signed,
            },
            key,
        ))
    }
}

#[async_trait]
impl ChainStateSource for InMemoryTee {
    async fn latest_block(&self) -> Result<BlockRef> {
        let calls = self.head_calls.fetch_add(1, Ordering::SeqCst);
        if let Some((after, height)) = *self.height_jump.lock().unwrap() {
            if calls >= after {
                self.height.store(height, Ordering::SeqCst);
            }
        }
        let remaining = self.failing_head_calls.load(Ordering::SeqCst);
        if remaining > 0 {
            self.failing_head_calls.store(remaining - 1, Ordering::SeqCst);
            return Err(ShieldedError::Transport("node unreachable".to_string()));
        }
        Ok(BlockRef {
            hash: self.block_hash,
            number: self.height.load(Ordering::SeqCst),
        })
    }
}

#[async_trait]
impl TeeKeySource for InMemoryTee {
    async fn tee_public_key(&self) -> Result<RemotePublicKey> {
        self.key_fetches.fetch_add(1, Ordering::SeqCst);
        Ok(self.public_key())
    }
}

#[async_trait]
impl ShieldedNetwork for InMemoryTee {
    async fn send_raw_transaction(&self, raw: Bytes) -> Result<H256> {
        let (received, _) = self.receive(&raw)?;
        let hash = received.signed.hash();
        self.writes.lock().unwrap().push(received);
        Ok(hash)
    }

    async fn signed_call(&self, raw: Bytes) -> Result<Bytes> {
        if let Some(bytes) = self.corrupt_responses.lock().unwrap().clone() {
            return Ok(bytes.into());
        }
        if self.replay_last_response.load(Ordering::SeqCst) {
            if let Some(previous) = self.last_response.lock().unwrap().clone() {
                return Ok(previous.into());
            }
        }

        let (received, key) = self.receive(&raw)?;
        let mut result = b"result:".to_vec();
        result.extend_from_slice(&received.plaintext);
        let frame = seal_response(&key, &result, &received.signed.tx.envelope.aad())?;
        self.reads.lock().unwrap().push(received);

        *self.last_response.lock().unwrap() = Some(frame.clone());
        Ok(frame.into())
    }

    async fn transparent_send(&self, tx: TransactionRequest) -> Result<H256> {
        self.transparent.lock().unwrap().push(tx);
        Ok(H256::repeat_byte(0x77))
    }

    async fn transparent_call(&self, tx: TransactionRequest) -> Result<Bytes> {
        let data = tx.data.clone().unwrap_or_default();
        self.transparent.lock().unwrap().push(tx);
        Ok(data)
    }

    async fn gas_price(&self) -> Result<U256> {
        Ok(U256::from(1_000_000_000u64))
    }

    async fn transaction_count(&self, _address: Address) -> Result<u64> {
        Ok(ACCOUNT_NONCE)
    }
}
