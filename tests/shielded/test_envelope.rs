//! Envelope construction: nonce freshness, retry, anchors

use super::common::{contract, init_tracing, test_wallet, InMemoryTee, CHAIN_ID};
use ethers::signers::Signer;
use ethers::types::{Address, H256, U256};
use shielded_tx_client::crypto::derive_session_key;
use futures_util::future::join_all;
use shielded_tx_client::{
    open_envelope, ContextDraft, EncryptedEnvelopeBuilder, EncryptionKeyPair, FreshnessAnchor,
    FreshnessOracle, RetryPolicy, ShieldedError, ShieldedSession, ShieldedTransaction,
};
use std::collections::HashSet;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

fn draft() -> ContextDraft {
    ContextDraft::new(Address::repeat_byte(0x11), CHAIN_ID, 7, Some(contract()))
}

fn fast_retry(max_attempts: u32) -> RetryPolicy {
    RetryPolicy {
        max_attempts,
        base_delay: Duration::from_millis(1),
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_builds_never_repeat_a_nonce() {
    init_tracing();
    let tee = Arc::new(InMemoryTee::new(1_000));
    let session = Arc::new(ShieldedSession::new(
        EncryptionKeyPair::ephemeral(),
        tee.clone(),
    ));
    let builder = Arc::new(EncryptedEnvelopeBuilder::new(Arc::new(FreshnessOracle::new(
        tee.clone(),
    ))));

    let tasks = (0..10_000).map(|i| {
        let session = session.clone();
        let builder = builder.clone();
        tokio::spawn(async move {
            let plaintext = format!("call-{}", i).into_bytes();
            builder
                .build(&session, &plaintext, draft(), None)
                .await
                .map(|envelope| envelope.nonce())
        })
    });

    let mut nonces = HashSet::new();
    for result in join_all(tasks).await {
        let nonce = result.unwrap().unwrap();
        assert!(nonces.insert(nonce), "nonce reused: {:?}", nonce);
    }
    assert_eq!(nonces.len(), 10_000);
    assert_eq!(
        tee.key_fetches.load(Ordering::SeqCst),
        1,
        "TEE key fetched once per session"
    );
}

#[tokio::test]
async fn test_envelope_carries_session_metadata() {
    let tee = Arc::new(InMemoryTee::new(1_000));
    let encryption = EncryptionKeyPair::ephemeral();
    let public = encryption.public_key();
    let session = ShieldedSession::new(encryption, tee.clone());
    let builder = EncryptedEnvelopeBuilder::new(Arc::new(FreshnessOracle::new(tee.clone())));

    let envelope = builder
        .build(&session, b"payload", draft().signed_read(), Some(20))
        .await
        .unwrap();

    let metadata = &envelope.context.encryption;
    assert_eq!(metadata.encryption_pubkey, public);
    assert_eq!(metadata.anchor.block_hash, tee.block_hash());
    assert_eq!(metadata.anchor.expires_at_block, 1_020);
    assert!(metadata.signed_read);
    assert_eq!(envelope.ciphertext.len(), b"payload".len() + 16);
}

#[tokio::test]
async fn test_same_plaintext_twice_gives_different_ciphertexts() {
    let tee = Arc::new(InMemoryTee::new(1_000));
    let session = ShieldedSession::new(EncryptionKeyPair::ephemeral(), tee.clone());
    let builder = EncryptedEnvelopeBuilder::new(Arc::new(FreshnessOracle::new(tee)));

    let a = builder.build(&session, b"same", draft(), None).await.unwrap();
    let b = builder.build(&session, b"same", draft(), None).await.unwrap();
    assert_ne!(a.nonce(), b.nonce());
    assert_ne!(a.ciphertext, b.ciphertext);
}

#[tokio::test]
async fn test_transient_anchor_failure_is_retried() {
    init_tracing();
    let tee = Arc::new(InMemoryTee::new(1_000));
    tee.fail_next_head_calls(2);

    let session = ShieldedSession::new(EncryptionKeyPair::ephemeral(), tee.clone());
    let builder = EncryptedEnvelopeBuilder::with_retry(
        Arc::new(FreshnessOracle::new(tee.clone())),
        fast_retry(3),
    );

    let envelope = builder
        .build_with_retry(&session, b"payload", draft(), None)
        .await
        .unwrap();
    assert_eq!(tee.head_calls.load(Ordering::SeqCst), 3);

    let key = session.session_key().await.unwrap();
    assert_eq!(open_envelope(&key, &envelope).unwrap(), b"payload");
}

#[tokio::test]
async fn test_retry_gives_up_after_max_attempts() {
    let tee = Arc::new(InMemoryTee::new(1_000));
    tee.fail_next_head_calls(10);

    let session = ShieldedSession::new(EncryptionKeyPair::ephemeral(), tee.clone());
    let builder = EncryptedEnvelopeBuilder::with_retry(
        Arc::new(FreshnessOracle::new(tee.clone())),
        fast_retry(2),
    );

    let result = builder
        .build_with_retry(&session, b"payload", draft(), None)
        .await;
    assert!(matches!(result, Err(ShieldedError::AnchorUnavailable(_))));
    assert_eq!(tee.head_calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_expired_caller_anchor_rejected() {
    let tee = Arc::new(InMemoryTee::new(1_001));
    let session = ShieldedSession::new(EncryptionKeyPair::ephemeral(), tee.clone());
    let builder = EncryptedEnvelopeBuilder::new(Arc::new(FreshnessOracle::new(tee)));

    let stale = FreshnessAnchor {
        block_hash: H256::repeat_byte(0x01),
        expires_at_block: 1_000,
    };
    let result = builder
        .build(&session, b"payload", draft().with_anchor(stale), None)
        .await;
    assert_eq!(
        result.unwrap_err(),
        ShieldedError::Expired {
            expires_at_block: 1_000,
            current_height: 1_001
        }
    );
}

#[tokio::test]
async fn test_valid_caller_anchor_is_used_verbatim() {
    let tee = Arc::new(InMemoryTee::new(1_000));
    let session = ShieldedSession::new(EncryptionKeyPair::ephemeral(), tee.clone());
    let builder = EncryptedEnvelopeBuilder::new(Arc::new(FreshnessOracle::new(tee)));

    let anchor = FreshnessAnchor {
        block_hash: H256::repeat_byte(0x0F),
        expires_at_block: 1_000,
    };
    let envelope = builder
        .build(&session, b"payload", draft().with_anchor(anchor), None)
        .await
        .unwrap();
    assert_eq!(envelope.context.encryption.anchor, anchor);
}

#[tokio::test]
async fn test_overflowing_window_is_not_retried() {
    let tee = Arc::new(InMemoryTee::new(1_000));
    let session = ShieldedSession::new(EncryptionKeyPair::ephemeral(), tee.clone());
    let builder = EncryptedEnvelopeBuilder::with_retry(
        Arc::new(FreshnessOracle::new(tee.clone())),
        fast_retry(3),
    );

    let result = builder
        .build_with_retry(&session, b"payload", draft(), Some(u64::MAX))
        .await;
    assert!(matches!(result, Err(ShieldedError::InvalidPayload { .. })));
    assert_eq!(tee.head_calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_fixed_local_key_transfer_opens_at_tee() {
    let tee = Arc::new(InMemoryTee::new(1_000));
    let local = EncryptionKeyPair::from_bytes(&[0x01; 32]).unwrap();
    let expected_pubkey = local.public_key();
    let expected_key = derive_session_key(&local.secret_bytes(), tee.public_key().as_bytes()).unwrap();

    let session = ShieldedSession::new(local, tee.clone());
    let builder = EncryptedEnvelopeBuilder::new(Arc::new(FreshnessOracle::new(tee.clone())));

    let wallet = test_wallet();
    let envelope = builder
        .build(
            &session,
            b"transfer(42)",
            ContextDraft::new(wallet.address(), CHAIN_ID, 7, Some(contract())),
            None,
        )
        .await
        .unwrap();

    assert_eq!(session.session_key().await.unwrap(), expected_key);
    assert_eq!(envelope.context.encryption.encryption_pubkey, expected_pubkey);
    assert_eq!(envelope.context.chain_id, 5124);
    assert_eq!(envelope.context.nonce, 7);
    assert_eq!(open_envelope(&expected_key, &envelope).unwrap(), b"transfer(42)");

    let signed = ShieldedTransaction::new(envelope, U256::from(1_000_000_000u64), U256::from(100_000u64))
        .sign(&wallet)
        .unwrap();
    let (received, _) = tee.receive(&signed.encode()).unwrap();
    assert_eq!(received.plaintext, b"transfer(42)");
    assert_eq!(received.sender, wallet.address());
}
