// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Shielded typed transaction (type `0x4A`)
//!
//! **Wire format**:
//! ```text
//! 0x4A || rlp([chain_id, nonce, gas_price, gas_limit, to, value, input,
//!              encryption_pubkey, encryption_nonce, message_version,
//!              recent_block_hash, expires_at_block, signed_read,
//!              y_parity, r, s])
//! ```
//!
//! `input` is the envelope ciphertext (with tag). The signing hash is
//! keccak256 over the type byte and the RLP list of the first 13 fields.
//! The sender is never encoded; it is recovered from the signature, and the
//! TEE rebuilds the AAD from it.

use crate::error::{Result, ShieldedError};
use crate::types::{
    EncryptedEnvelope, EncryptionMetadata, EncryptionNonce, FreshnessAnchor, TransactionContext,
    COMPRESSED_PUBKEY_SIZE,
};
use ethers::signers::{LocalWallet, Signer};
use ethers::types::{Address, Bytes, Signature, H256, U256};
use ethers::utils::rlp::{DecoderError, Rlp, RlpStream};
use tiny_keccak::{Hasher, Keccak};

/// Typed-transaction identifier for shielded transactions
pub const SHIELDED_TX_TYPE: u8 = 0x4A;

const UNSIGNED_FIELDS: usize = 13;
const SIGNED_FIELDS: usize = 16;

fn keccak256(data: &[u8]) -> [u8; 32] {
    let mut hasher = Keccak::v256();
    hasher.update(data);
    let mut hash = [0u8; 32];
    hasher.finalize(&mut hash);
    hash
}

/// Unsigned shielded transaction wrapping a sealed envelope
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShieldedTransaction {
    pub envelope: EncryptedEnvelope,
    pub gas_price: U256,
    pub gas_limit: U256,
}

impl ShieldedTransaction {
    pub fn new(envelope: EncryptedEnvelope, gas_price: U256, gas_limit: U256) -> Self {
        Self {
            envelope,
            gas_price,
            gas_limit,
        }
    }

    pub fn context(&self) -> &TransactionContext {
        &self.envelope.context
    }

    fn append_unsigned_fields(&self, stream: &mut RlpStream) {
        let context = &self.envelope.context;
        let metadata = &context.encryption;

        stream.append(&context.chain_id);
        stream.append(&context.nonce);
        stream.append(&self.gas_price);
        stream.append(&self.gas_limit);
        match &context.to {
            Some(to) => {
                stream.append(to);
            }
            None => {
                stream.append_empty_data();
            }
        }
        stream.append(&context.value);
        stream.append(&self.envelope.ciphertext.to_vec());
        stream.append(&metadata.encryption_pubkey.to_vec());
        stream.append(&metadata.encryption_nonce.as_bytes().to_vec());
        stream.append(&metadata.message_version);
        stream.append(&metadata.anchor.block_hash);
        stream.append(&metadata.anchor.expires_at_block);
        stream.append(&u8::from(metadata.signed_read));
    }

    /// Hash signed by the sender's signing key
    pub fn signing_hash(&self) -> H256 {
        let mut stream = RlpStream::new_list(UNSIGNED_FIELDS);
        self.append_unsigned_fields(&mut stream);

        let mut payload = vec![SHIELDED_TX_TYPE];
        payload.extend_from_slice(&stream.out());
        H256::from(keccak256(&payload))
    }

    /// Sign with the account's signing key
    ///
    /// # Errors
    ///
    /// - `UnsupportedOperation` if the wallet address differs from `context.from`
    /// - `InvalidKey` if signing fails
    pub fn sign(self, wallet: &LocalWallet) -> Result<SignedShieldedTransaction> {
        if wallet.address() != self.envelope.context.from {
            return Err(ShieldedError::UnsupportedOperation(format!(
                "context sender {:?} does not match signing key {:?}",
                self.envelope.context.from,
                wallet.address()
            )));
        }

        let signature = wallet
            .sign_hash(self.signing_hash())
            .map_err(|e| ShieldedError::invalid_key("signing_key", e.to_string()))?;

        SignedShieldedTransaction::from_parts(self, signature)
    }
}

/// Map a signature `v` (raw parity, legacy 27/28, or EIP-155) to `27 + parity`
fn normalize_v(v: u64) -> Result<u64> {
    let parity = match v {
        0 | 1 => v,
        27 | 28 => v - 27,
        // EIP-155: 35 + 2 * chain_id + parity
        v if v >= 35 => (v - 35) % 2,
        v => {
            return Err(ShieldedError::invalid_payload(
                "signature",
                format!("invalid recovery value v={}", v),
            ))
        }
    };
    Ok(27 + parity)
}

/// Decode a one-byte RLP flag that must be exactly 0 or 1
fn strict_flag(rlp: &Rlp<'_>, index: usize, field: &str) -> Result<u8> {
    let value: u8 = rlp.val_at(index)?;
    if value > 1 {
        return Err(ShieldedError::invalid_payload(
            field,
            format!("expected 0 or 1, got {}", value),
        ));
    }
    Ok(value)
}

/// Signed shielded transaction ready for `eth_sendRawTransaction` or `eth_call`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedShieldedTransaction {
    pub tx: ShieldedTransaction,
    /// Always stored with `v` in {27, 28}
    signature: Signature,
}

impl SignedShieldedTransaction {
    /// Pair a transaction with a signature, normalizing its recovery value
    ///
    /// # Errors
    ///
    /// `InvalidPayload` if `v` is not 0/1, 27/28 or an EIP-155 value.
    pub fn from_parts(tx: ShieldedTransaction, mut signature: Signature) -> Result<Self> {
        signature.v = normalize_v(signature.v)?;
        Ok(Self { tx, signature })
    }

    pub fn signature(&self) -> &Signature {
        &self.signature
    }

    fn y_parity(&self) -> u8 {
        (self.signature.v - 27) as u8
    }

    /// Type byte followed by the RLP body
    pub fn encode(&self) -> Bytes {
        let mut stream = RlpStream::new_list(SIGNED_FIELDS);
        self.tx.append_unsigned_fields(&mut stream);
        stream.append(&self.y_parity());
        stream.append(&self.signature.r);
        stream.append(&self.signature.s);

        let body = stream.out();
        let mut raw = Vec::with_capacity(1 + body.len());
        raw.push(SHIELDED_TX_TYPE);
        raw.extend_from_slice(&body);
        raw.into()
    }

    /// Transaction hash as reported by the node
    pub fn hash(&self) -> H256 {
        H256::from(keccak256(&self.encode()))
    }

    /// Recover the signer from the signature
    pub fn recover_sender(&self) -> Result<Address> {
        self.signature
            .recover(self.tx.signing_hash())
            .map_err(|e| ShieldedError::invalid_key("signature", e.to_string()))
    }

    /// Parse a raw `0x4A` transaction, recovering `from` from the signature
    pub fn decode(raw: &[u8]) -> Result<Self> {
        let (type_byte, body) = raw
            .split_first()
            .ok_or_else(|| ShieldedError::invalid_payload("transaction", "empty input"))?;
        if *type_byte != SHIELDED_TX_TYPE {
            return Err(ShieldedError::invalid_payload(
                "transaction",
                format!("expected type 0x{:02x}, got 0x{:02x}", SHIELDED_TX_TYPE, type_byte),
            ));
        }

        let rlp = Rlp::new(body);
        if rlp.item_count()? != SIGNED_FIELDS {
            return Err(DecoderError::RlpIncorrectListLen.into());
        }

        let to = if rlp.at(4)?.is_empty() {
            None
        } else {
            Some(rlp.val_at::<Address>(4)?)
        };
        let ciphertext: Vec<u8> = rlp.val_at(6)?;
        let pubkey_bytes: Vec<u8> = rlp.val_at(7)?;
        let nonce_bytes: Vec<u8> = rlp.val_at(8)?;
        let signed_read = strict_flag(&rlp, 12, "signed_read")?;
        let y_parity = strict_flag(&rlp, 13, "y_parity")?;

        let encryption_pubkey: [u8; COMPRESSED_PUBKEY_SIZE] =
            pubkey_bytes.as_slice().try_into().map_err(|_| {
                ShieldedError::invalid_payload(
                    "encryption_pubkey",
                    format!(
                        "expected {} bytes, got {}",
                        COMPRESSED_PUBKEY_SIZE,
                        pubkey_bytes.len()
                    ),
                )
            })?;
        let encryption_nonce = EncryptionNonce::from_slice(&nonce_bytes)?;

        let context = TransactionContext {
            // replaced by the recovered signer below
            from: Address::zero(),
            chain_id: rlp.val_at(0)?,
            nonce: rlp.val_at(1)?,
            to,
            value: rlp.val_at(5)?,
            encryption: EncryptionMetadata {
                encryption_pubkey,
                encryption_nonce,
                anchor: FreshnessAnchor {
                    block_hash: rlp.val_at(10)?,
                    expires_at_block: rlp.val_at(11)?,
                },
                message_version: rlp.val_at(9)?,
                signed_read: signed_read == 1,
            },
        };

        let mut signed = SignedShieldedTransaction {
            tx: ShieldedTransaction {
                envelope: EncryptedEnvelope {
                    ciphertext: ciphertext.into(),
                    context,
                },
                gas_price: rlp.val_at(2)?,
                gas_limit: rlp.val_at(3)?,
            },
            signature: Signature {
                r: rlp.val_at(14)?,
                s: rlp.val_at(15)?,
                v: 27 + u64::from(y_parity),
            },
        };

        signed.tx.envelope.context.from = signed.recover_sender()?;
        Ok(signed)
    }
}
