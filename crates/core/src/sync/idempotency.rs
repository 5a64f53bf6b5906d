//! Idempotency keys for provider calls.

use sha2::{Digest, Sha256};
use uuid::Uuid;

use ledgerbridge_shared::types::DocumentId;

use crate::integration::Provider;

/// Derives the idempotency key for posting a document.
///
/// `generation` is the number of successes already recorded for the pair, so
/// every retry of one run shares a key and a forced resync gets a new one.
/// The first 16 bytes of the SHA-256 digest are rendered as a UUID, which fits
/// QuickBooks' 50 character `requestid` limit.
#[must_use]
pub fn idempotency_key(document_id: DocumentId, provider: Provider, generation: u64) -> String {
    let digest = Sha256::digest(format!("{document_id}:{provider}:{generation}").as_bytes());
    let mut bytes = [0u8; 16];
    bytes.copy_from_slice(&digest[..16]);
    Uuid::from_bytes(bytes).to_string()
}
