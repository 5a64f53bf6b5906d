//! Ledger storage contract.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use ledgerbridge_shared::types::{DocumentId, OrganizationId};

use super::types::SyncAttempt;
use crate::error::PersistenceError;
use crate::integration::Provider;

/// Append-only record of sync attempts per (document, provider).
///
/// Rows are never updated or deleted; a resync appends.
#[async_trait]
pub trait SyncLedger: Send + Sync {
    /// Appends an attempt.
    async fn append(&self, attempt: &SyncAttempt) -> Result<(), PersistenceError>;

    /// Most recent `success` for the pair.
    async fn latest_success(
        &self,
        document_id: DocumentId,
        provider: Provider,
    ) -> Result<Option<SyncAttempt>, PersistenceError>;

    /// Number of `success` rows for the pair.
    async fn success_count(
        &self,
        document_id: DocumentId,
        provider: Provider,
    ) -> Result<u64, PersistenceError>;

    /// Every attempt for the pair, oldest first.
    async fn history(
        &self,
        document_id: DocumentId,
        provider: Provider,
    ) -> Result<Vec<SyncAttempt>, PersistenceError>;

    /// When the organization last synced anything to the provider.
    async fn last_success_at(
        &self,
        organization_id: OrganizationId,
        provider: Provider,
    ) -> Result<Option<DateTime<Utc>>, PersistenceError>;
}
