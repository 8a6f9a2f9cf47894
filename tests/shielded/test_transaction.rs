//! Typed `0x4A` transaction encoding and signing

use super::common::{contract, test_wallet, InMemoryTee, CHAIN_ID};
use ethers::signers::{LocalWallet, Signer};
use ethers::types::U256;
use shielded_tx_client::{
    ContextDraft, EncryptedEnvelopeBuilder, EncryptionKeyPair, FreshnessOracle, ShieldedError,
    ShieldedSession, ShieldedTransaction, SignedShieldedTransaction, SHIELDED_TX_TYPE,
};
use std::sync::Arc;

async fn unsigned(from: ethers::types::Address) -> ShieldedTransaction {
    let tee = Arc::new(InMemoryTee::new(1_000));
    let session = ShieldedSession::new(EncryptionKeyPair::ephemeral(), tee.clone());
    let builder = EncryptedEnvelopeBuilder::new(Arc::new(FreshnessOracle::new(tee)));

    let envelope = builder
        .build(
            &session,
            b"transfer(42)",
            ContextDraft::new(from, CHAIN_ID, 7, Some(contract())),
            None,
        )
        .await
        .unwrap();
    ShieldedTransaction::new(envelope, U256::from(1_000_000_000u64), U256::from(100_000u64))
}

#[tokio::test]
async fn test_signed_transaction_recovers_sender() {
    let wallet = test_wallet();
    let signed = unsigned(wallet.address()).await.sign(&wallet).unwrap();

    assert_eq!(signed.encode()[0], SHIELDED_TX_TYPE);
    assert_eq!(signed.recover_sender().unwrap(), wallet.address());
}

#[tokio::test]
async fn test_decode_preserves_envelope() {
    let wallet = test_wallet();
    let signed = unsigned(wallet.address()).await.sign(&wallet).unwrap();

    let decoded = SignedShieldedTransaction::decode(&signed.encode()).unwrap();
    assert_eq!(decoded.tx.envelope, signed.tx.envelope);
    assert_eq!(decoded.hash(), signed.hash());
}

#[tokio::test]
async fn test_foreign_key_cannot_sign() {
    let wallet = test_wallet();
    let other = LocalWallet::from_bytes(&[0x43; 32]).unwrap();

    let result = unsigned(wallet.address()).await.sign(&other);
    assert!(matches!(result, Err(ShieldedError::UnsupportedOperation(_))));
}

#[tokio::test]
async fn test_tampered_raw_transaction_changes_sender() {
    let wallet = test_wallet();
    let signed = unsigned(wallet.address()).await.sign(&wallet).unwrap();

    let mut tampered = signed.clone();
    tampered.tx.envelope.context.nonce += 1;
    let decoded = SignedShieldedTransaction::decode(&tampered.encode())
        .expect("r and s are still valid, so a sender is recovered");

    // the signature now vouches for a different hash, hence a different sender
    assert_ne!(decoded.tx.context().from, wallet.address());
    assert_ne!(decoded.tx.signing_hash(), signed.tx.signing_hash());
}

#[test]
fn test_truncated_raw_transaction_rejected() {
    assert!(SignedShieldedTransaction::decode(&[SHIELDED_TX_TYPE]).is_err());
    assert!(SignedShieldedTransaction::decode(&[SHIELDED_TX_TYPE, 0xC0]).is_err());
}
