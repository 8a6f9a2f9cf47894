// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Canonical AAD encoding of the public transaction context
//!
//! Layout (RLP):
//! ```text
//! [from, chain_id, nonce, to | "", value,
//!   [encryption_pubkey, encryption_nonce, recent_block_hash,
//!    expires_at_block, message_version, signed_read]]
//! ```
//!
//! Every field is always present and in fixed order, so two contexts encode
//! to the same bytes exactly when they are equal. The output is never sent on
//! the wire; it only feeds the AEAD tag.

use crate::types::{EncryptionMetadata, TransactionContext};
use ethers::utils::rlp::RlpStream;

const CONTEXT_FIELDS: usize = 6;
const METADATA_FIELDS: usize = 6;

/// Encode `context` into the bytes authenticated by the AEAD tag
pub fn encode(context: &TransactionContext) -> Vec<u8> {
    let mut stream = RlpStream::new_list(CONTEXT_FIELDS);
    stream.append(&context.from);
    stream.append(&context.chain_id);
    stream.append(&context.nonce);
    match &context.to {
        Some(to) => {
            stream.append(to);
        }
        None => {
            stream.append_empty_data();
        }
    }
    stream.append(&context.value);
    append_metadata(&mut stream, &context.encryption);
    stream.out().to_vec()
}

pub(crate) fn append_metadata(stream: &mut RlpStream, metadata: &EncryptionMetadata) {
    stream.begin_list(METADATA_FIELDS);
    stream.append(&metadata.encryption_pubkey.to_vec());
    stream.append(&metadata.encryption_nonce.as_bytes().to_vec());
    stream.append(&metadata.anchor.block_hash);
    stream.append(&metadata.anchor.expires_at_block);
    stream.append(&metadata.message_version);
    stream.append(&u8::from(metadata.signed_read));
}
