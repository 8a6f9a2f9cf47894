// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
pub mod aad;
pub mod config;
pub mod crypto;
pub mod dispatcher;
pub mod envelope;
pub mod error;
pub mod freshness;
pub mod network;
pub mod response;
pub mod session;
pub mod transaction;
pub mod types;

// Re-export the pipeline entry points
pub use config::ShieldedConfig;
pub use dispatcher::{classify, CallRequest, DispatchOutcome, Operation, RequestDispatcher, Route};
pub use envelope::{open_envelope, EncryptedEnvelopeBuilder, RetryPolicy};
pub use error::{Result, ShieldedError};
pub use freshness::{is_expired, ChainStateSource, FreshnessOracle};
pub use network::{RpcNetwork, ShieldedNetwork};
pub use response::decrypt_response;
pub use session::{ShieldedSession, TeeKeySource};
pub use transaction::{ShieldedTransaction, SignedShieldedTransaction, SHIELDED_TX_TYPE};

// Re-export the data model
pub use types::{
    BlockRef, ContextDraft, EncryptedEnvelope, EncryptionKeyPair, EncryptionMetadata,
    EncryptionNonce, FreshnessAnchor, RemotePublicKey, SessionKey, TransactionContext,
};
