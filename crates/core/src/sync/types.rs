//! Sync options and results.

use serde::{Deserialize, Serialize};

use ledgerbridge_shared::types::DocumentId;

use super::error::SyncError;
use crate::integration::Provider;
use crate::ledger::SyncStatus;
use crate::provider::ExternalRecordId;

/// Per-run options.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncOptions {
    /// Post again even if the document already synced successfully.
    #[serde(default)]
    pub force_resync: bool,
}

impl SyncOptions {
    /// Options for a forced resync.
    #[must_use]
    pub const fn forced() -> Self {
        Self { force_resync: true }
    }
}

/// Outcome for one document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentSyncResult {
    /// Document.
    pub document_id: DocumentId,
    /// Target provider.
    pub provider: Provider,
    /// `Success`, `Failed` or `Skipped`.
    pub status: SyncStatus,
    /// Provider record, when one exists.
    pub external_id: Option<ExternalRecordId>,
    /// Failure cause.
    pub error: Option<SyncError>,
}

impl DocumentSyncResult {
    /// Document posted in this run.
    #[must_use]
    pub fn synced(document_id: DocumentId, provider: Provider, external_id: ExternalRecordId) -> Self {
        Self {
            document_id,
            provider,
            status: SyncStatus::Success,
            external_id: Some(external_id),
            error: None,
        }
    }

    /// Document not posted because it already was.
    #[must_use]
    pub fn skipped(
        document_id: DocumentId,
        provider: Provider,
        external_id: Option<ExternalRecordId>,
    ) -> Self {
        Self {
            document_id,
            provider,
            status: SyncStatus::Skipped,
            external_id,
            error: None,
        }
    }

    /// Document failed.
    #[must_use]
    pub fn failed(document_id: DocumentId, provider: Provider, error: SyncError) -> Self {
        Self {
            document_id,
            provider,
            status: SyncStatus::Failed,
            external_id: None,
            error: Some(error),
        }
    }

    /// Keeps the provider record id on a failed result, for a record that was
    /// created but could not be recorded.
    #[must_use]
    pub fn with_external_id(mut self, external_id: ExternalRecordId) -> Self {
        self.external_id = Some(external_id);
        self
    }

    /// Returns true if the document was posted in this run.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.status == SyncStatus::Success
    }

    /// Short label used in sync summaries.
    #[must_use]
    pub const fn outcome_label(&self) -> &'static str {
        match self.status {
            SyncStatus::Success => "synced",
            SyncStatus::Skipped => "skipped",
            SyncStatus::Pending | SyncStatus::Failed => "failed",
        }
    }
}

/// Aggregated outcome of a batch, results in input order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchResult {
    /// Target provider.
    pub provider: Provider,
    /// Documents posted.
    pub synced_count: usize,
    /// Documents that failed.
    pub failed_count: usize,
    /// Documents already synced.
    pub skipped_count: usize,
    /// Per-document outcomes.
    pub results: Vec<DocumentSyncResult>,
}

impl BatchResult {
    /// Tallies per-document results.
    #[must_use]
    pub fn new(provider: Provider, results: Vec<DocumentSyncResult>) -> Self {
        let count = |status| results.iter().filter(|r| r.status == status).count();

        Self {
            provider,
            synced_count: count(SyncStatus::Success),
            failed_count: count(SyncStatus::Failed),
            skipped_count: count(SyncStatus::Skipped),
            results,
        }
    }
}
