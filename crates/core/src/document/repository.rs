//! Document storage contract.

use async_trait::async_trait;

use ledgerbridge_shared::types::{DocumentId, OrganizationId};

use super::types::Document;
use crate::error::PersistenceError;

/// A change applied to many documents at once.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BulkUpdate {
    /// Set the category of every line item.
    Categorize {
        /// Internal category name.
        category: String,
    },
    /// Set (or clear) the project of every line item.
    AssignProject {
        /// Project ID, `None` to clear.
        project_id: Option<String>,
    },
    /// Mark the documents as verified by a person.
    MarkVerified,
    /// Soft-delete the documents.
    Delete,
}

/// Access to the document store owned by the OCR pipeline.
///
/// Sync only appends annotations; the bulk updates serve the documents API.
#[async_trait]
pub trait DocumentRepository: Send + Sync {
    /// Finds a live document of the organization.
    async fn find(
        &self,
        organization_id: OrganizationId,
        document_id: DocumentId,
    ) -> Result<Option<Document>, PersistenceError>;

    /// Appends a line to the document's notes.
    async fn append_note(&self, document_id: DocumentId, note: &str)
    -> Result<(), PersistenceError>;

    /// Replaces the consolidated sync summary.
    async fn set_sync_summary(
        &self,
        document_id: DocumentId,
        summary: &str,
    ) -> Result<(), PersistenceError>;

    /// Applies an update to the organization's documents among `document_ids`.
    /// Returns how many documents changed.
    async fn apply_bulk(
        &self,
        organization_id: OrganizationId,
        document_ids: &[DocumentId],
        update: &BulkUpdate,
    ) -> Result<u64, PersistenceError>;
}
