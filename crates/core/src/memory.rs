//! In-memory implementations of the storage contracts.
//!
//! Used by tests across the workspace and for running the API without a
//! database.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use tokio::sync::RwLock;

use ledgerbridge_shared::types::{DocumentId, OrganizationId};

use crate::document::{BulkUpdate, Document, DocumentRepository, DocumentStatus, annotation};
use crate::error::PersistenceError;
use crate::integration::{Credential, CredentialRepository, Provider};
use crate::ledger::{SyncAttempt, SyncLedger, SyncStatus};
use crate::mapping::{CategoryMapping, CategoryMappingRepository};

/// Credentials keyed by (organization, provider).
#[derive(Debug, Default)]
pub struct MemoryCredentials {
    rows: DashMap<(OrganizationId, Provider), Credential>,
}

impl MemoryCredentials {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CredentialRepository for MemoryCredentials {
    async fn find(
        &self,
        organization_id: OrganizationId,
        provider: Provider,
    ) -> Result<Option<Credential>, PersistenceError> {
        Ok(self
            .rows
            .get(&(organization_id, provider))
            .map(|row| row.value().clone()))
    }

    async fn list(
        &self,
        organization_id: OrganizationId,
    ) -> Result<Vec<Credential>, PersistenceError> {
        let mut credentials: Vec<Credential> = self
            .rows
            .iter()
            .filter(|row| row.key().0 == organization_id)
            .map(|row| row.value().clone())
            .collect();
        credentials.sort_by_key(|c| c.provider);
        Ok(credentials)
    }

    async fn save(&self, credential: &Credential) -> Result<(), PersistenceError> {
        self.rows.insert(
            (credential.organization_id, credential.provider),
            credential.clone(),
        );
        Ok(())
    }

    async fn deactivate(
        &self,
        organization_id: OrganizationId,
        provider: Provider,
    ) -> Result<bool, PersistenceError> {
        Ok(self
            .rows
            .get_mut(&(organization_id, provider))
            .map(|mut row| row.is_active = false)
            .is_some())
    }
}

struct StoredDocument {
    document: Document,
    deleted: bool,
}

/// Documents keyed by ID, with soft delete.
#[derive(Default)]
pub struct MemoryDocuments {
    rows: RwLock<HashMap<DocumentId, StoredDocument>>,
}

impl MemoryDocuments {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds or replaces a document.
    pub async fn insert(&self, document: Document) {
        self.rows.write().await.insert(
            document.id,
            StoredDocument {
                document,
                deleted: false,
            },
        );
    }

    /// Returns a document regardless of organization or deletion.
    pub async fn get(&self, document_id: DocumentId) -> Option<Document> {
        self.rows
            .read()
            .await
            .get(&document_id)
            .map(|row| row.document.clone())
    }

    /// Returns true if the document was soft-deleted.
    pub async fn is_deleted(&self, document_id: DocumentId) -> bool {
        self.rows
            .read()
            .await
            .get(&document_id)
            .is_some_and(|row| row.deleted)
    }
}

#[async_trait]
impl DocumentRepository for MemoryDocuments {
    async fn find(
        &self,
        organization_id: OrganizationId,
        document_id: DocumentId,
    ) -> Result<Option<Document>, PersistenceError> {
        Ok(self
            .rows
            .read()
            .await
            .get(&document_id)
            .filter(|row| !row.deleted && row.document.organization_id == organization_id)
            .map(|row| row.document.clone()))
    }

    async fn append_note(
        &self,
        document_id: DocumentId,
        note: &str,
    ) -> Result<(), PersistenceError> {
        let mut rows = self.rows.write().await;
        let row = rows
            .get_mut(&document_id)
            .ok_or_else(|| PersistenceError::new(format!("document {document_id} not found")))?;
        row.document.notes = Some(annotation::append_line(row.document.notes.as_deref(), note));
        Ok(())
    }

    async fn set_sync_summary(
        &self,
        document_id: DocumentId,
        summary: &str,
    ) -> Result<(), PersistenceError> {
        let mut rows = self.rows.write().await;
        let row = rows
            .get_mut(&document_id)
            .ok_or_else(|| PersistenceError::new(format!("document {document_id} not found")))?;
        row.document.external_sync_notes = Some(summary.to_string());
        Ok(())
    }

    async fn apply_bulk(
        &self,
        organization_id: OrganizationId,
        document_ids: &[DocumentId],
        update: &BulkUpdate,
    ) -> Result<u64, PersistenceError> {
        let mut rows = self.rows.write().await;
        let mut changed = 0;

        for id in document_ids {
            let Some(row) = rows
                .get_mut(id)
                .filter(|row| !row.deleted && row.document.organization_id == organization_id)
            else {
                continue;
            };

            match update {
                BulkUpdate::Categorize { category } => {
                    for line in &mut row.document.line_items {
                        line.category_name = Some(category.clone());
                    }
                }
                BulkUpdate::AssignProject { project_id } => {
                    for line in &mut row.document.line_items {
                        line.project_id.clone_from(project_id);
                    }
                }
                BulkUpdate::MarkVerified => row.document.status = DocumentStatus::Verified,
                BulkUpdate::Delete => row.deleted = true,
            }
            changed += 1;
        }

        Ok(changed)
    }
}

/// Category mappings keyed by (organization, provider, category).
#[derive(Debug, Default)]
pub struct MemoryMappings {
    rows: DashMap<(OrganizationId, Provider, String), String>,
}

impl MemoryMappings {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CategoryMappingRepository for MemoryMappings {
    async fn find(
        &self,
        organization_id: OrganizationId,
        provider: Provider,
        internal_category: &str,
    ) -> Result<Option<String>, PersistenceError> {
        Ok(self
            .rows
            .get(&(organization_id, provider, internal_category.to_string()))
            .map(|code| code.value().clone()))
    }

    async fn list(
        &self,
        organization_id: OrganizationId,
        provider: Provider,
    ) -> Result<Vec<CategoryMapping>, PersistenceError> {
        let mut mappings: Vec<CategoryMapping> = self
            .rows
            .iter()
            .filter(|row| row.key().0 == organization_id && row.key().1 == provider)
            .map(|row| CategoryMapping {
                organization_id,
                provider,
                internal_category: row.key().2.clone(),
                external_account_code: row.value().clone(),
            })
            .collect();
        mappings.sort_by(|a, b| a.internal_category.cmp(&b.internal_category));
        Ok(mappings)
    }

    async fn upsert(&self, mapping: &CategoryMapping) -> Result<(), PersistenceError> {
        self.rows.insert(
            (
                mapping.organization_id,
                mapping.provider,
                mapping.internal_category.clone(),
            ),
            mapping.external_account_code.clone(),
        );
        Ok(())
    }
}

/// Append-only attempt log.
///
/// Appends of one status can be made to fail, to exercise the paths where
/// the ledger write after a provider call is lost.
#[derive(Default)]
pub struct MemoryLedger {
    attempts: RwLock<Vec<SyncAttempt>>,
    failing_status: Mutex<Option<SyncStatus>>,
}

impl MemoryLedger {
    /// Creates an empty ledger.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes appends of `status` fail until cleared with `None`.
    pub fn fail_appends(&self, status: Option<SyncStatus>) {
        if let Ok(mut failing) = self.failing_status.lock() {
            *failing = status;
        }
    }

    /// Every recorded attempt, oldest first.
    pub async fn all(&self) -> Vec<SyncAttempt> {
        self.attempts.read().await.clone()
    }

    /// Recorded attempts with the given status.
    pub async fn count(&self, status: SyncStatus) -> usize {
        self.attempts
            .read()
            .await
            .iter()
            .filter(|a| a.status == status)
            .count()
    }

    fn should_fail(&self, status: SyncStatus) -> bool {
        self.failing_status
            .lock()
            .map(|failing| *failing == Some(status))
            .unwrap_or(false)
    }
}

#[async_trait]
impl SyncLedger for MemoryLedger {
    async fn append(&self, attempt: &SyncAttempt) -> Result<(), PersistenceError> {
        if self.should_fail(attempt.status) {
            return Err(PersistenceError::new("ledger unavailable"));
        }
        self.attempts.write().await.push(attempt.clone());
        Ok(())
    }

    async fn latest_success(
        &self,
        document_id: DocumentId,
        provider: Provider,
    ) -> Result<Option<SyncAttempt>, PersistenceError> {
        Ok(self
            .attempts
            .read()
            .await
            .iter()
            .rev()
            .find(|a| {
                a.document_id == document_id
                    && a.provider == provider
                    && a.status == SyncStatus::Success
            })
            .cloned())
    }

    async fn success_count(
        &self,
        document_id: DocumentId,
        provider: Provider,
    ) -> Result<u64, PersistenceError> {
        let count = self
            .attempts
            .read()
            .await
            .iter()
            .filter(|a| {
                a.document_id == document_id
                    && a.provider == provider
                    && a.status == SyncStatus::Success
            })
            .count();
        Ok(count as u64)
    }

    async fn history(
        &self,
        document_id: DocumentId,
        provider: Provider,
    ) -> Result<Vec<SyncAttempt>, PersistenceError> {
        Ok(self
            .attempts
            .read()
            .await
            .iter()
            .filter(|a| a.document_id == document_id && a.provider == provider)
            .cloned()
            .collect())
    }

    async fn last_success_at(
        &self,
        organization_id: OrganizationId,
        provider: Provider,
    ) -> Result<Option<DateTime<Utc>>, PersistenceError> {
        Ok(self
            .attempts
            .read()
            .await
            .iter()
            .filter(|a| {
                a.organization_id == organization_id
                    && a.provider == provider
                    && a.status == SyncStatus::Success
            })
            .map(|a| a.attempted_at)
            .max())
    }
}
