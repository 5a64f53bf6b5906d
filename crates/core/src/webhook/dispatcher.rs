//! Webhook dispatcher.

use std::sync::Arc;

use futures::future::join_all;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use ledgerbridge_shared::types::{DocumentId, OrganizationId};

use crate::document::annotation;
use crate::sync::{DocumentSyncResult, SyncError, SyncOptions, SyncOrchestrator};

/// What a dispatch did for one document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatchReport {
    /// Document dispatched.
    pub document_id: DocumentId,
    /// One result per active integration, in provider order.
    pub results: Vec<DocumentSyncResult>,
    /// Consolidated summary written to the document, empty without integrations.
    pub summary: String,
}

/// Syncs a finished document to every active integration of its organization.
#[derive(Clone)]
pub struct WebhookDispatcher {
    orchestrator: Arc<SyncOrchestrator>,
}

impl WebhookDispatcher {
    /// Creates a dispatcher.
    #[must_use]
    pub fn new(orchestrator: Arc<SyncOrchestrator>) -> Self {
        Self { orchestrator }
    }

    /// Syncs one document to all active integrations concurrently.
    ///
    /// A failing provider never blocks the others: its failure shows up in
    /// the report and the summary.
    ///
    /// # Errors
    ///
    /// Returns `SyncError::DocumentNotFound` if the document does not belong
    /// to the organization.
    pub async fn dispatch(
        &self,
        organization_id: OrganizationId,
        document_id: DocumentId,
        options: SyncOptions,
        cancel: &CancellationToken,
    ) -> Result<DispatchReport, SyncError> {
        let documents = self.orchestrator.documents();
        documents
            .find(organization_id, document_id)
            .await?
            .ok_or(SyncError::DocumentNotFound(document_id))?;

        let integrations = self
            .orchestrator
            .credentials()
            .list_active(organization_id)
            .await?;

        if integrations.is_empty() {
            info!(org_id = %organization_id, document_id = %document_id, "No active integrations, nothing to sync");
            return Ok(DispatchReport {
                document_id,
                results: Vec::new(),
                summary: String::new(),
            });
        }

        let results = join_all(integrations.iter().map(|credential| {
            let provider = credential.provider;
            async move {
                self.orchestrator
                    .sync_one(organization_id, provider, document_id, options, cancel)
                    .await
                    .unwrap_or_else(|err| DocumentSyncResult::failed(document_id, provider, err))
            }
        }))
        .await;

        let summary =
            annotation::sync_summary(results.iter().map(|r| (r.provider, r.outcome_label())));
        if let Err(e) = documents.set_sync_summary(document_id, &summary).await {
            warn!(document_id = %document_id, error = %e, "Failed to write sync summary");
        }

        info!(
            org_id = %organization_id,
            document_id = %document_id,
            summary = %summary,
            "Document dispatched"
        );

        Ok(DispatchReport {
            document_id,
            results,
            summary,
        })
    }

    /// Re-runs the dispatch for each document, one after another.
    pub async fn bulk_reprocess(
        &self,
        organization_id: OrganizationId,
        document_ids: &[DocumentId],
        options: SyncOptions,
        cancel: &CancellationToken,
    ) -> Vec<Result<DispatchReport, SyncError>> {
        let mut reports = Vec::with_capacity(document_ids.len());
        for &document_id in document_ids {
            reports.push(
                self.dispatch(organization_id, document_id, options, cancel)
                    .await,
            );
        }
        reports
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::integration::{CredentialRepository, CredentialStore, Provider};
    use crate::ledger::SyncStatus;
    use crate::mapping::{CategoryMapper, CategoryMapping, CategoryMappingRepository};
    use crate::memory::{MemoryCredentials, MemoryDocuments, MemoryLedger, MemoryMappings};
    use crate::provider::{AdapterRegistry, ProviderError};
    use crate::sync::{RetryPolicy, SyncSettings};
    use crate::testing::{ScriptedAdapter, credential, document};

    struct Setup {
        org: OrganizationId,
        documents: Arc<MemoryDocuments>,
        credentials: Arc<MemoryCredentials>,
        quickbooks: Arc<ScriptedAdapter>,
        xero: Arc<ScriptedAdapter>,
        dispatcher: WebhookDispatcher,
    }

    async fn setup(xero: ScriptedAdapter) -> Setup {
        let org = OrganizationId::new();
        let quickbooks = Arc::new(ScriptedAdapter::new(Provider::QuickBooks));
        let xero = Arc::new(xero);
        let adapters = AdapterRegistry::new()
            .with(quickbooks.clone())
            .with(xero.clone());

        let credentials = Arc::new(MemoryCredentials::new());
        let mappings = Arc::new(MemoryMappings::new());
        for provider in Provider::ALL {
            credentials
                .save(&credential(org, provider, chrono::Duration::hours(1)))
                .await
                .unwrap();
            mappings
                .upsert(&CategoryMapping {
                    organization_id: org,
                    provider,
                    internal_category: "Travel".to_string(),
                    external_account_code: "400".to_string(),
                })
                .await
                .unwrap();
        }

        let documents = Arc::new(MemoryDocuments::new());
        let orchestrator = SyncOrchestrator::new(
            Arc::new(CredentialStore::new(credentials.clone(), adapters.clone())),
            CategoryMapper::new(mappings),
            adapters,
            Arc::new(MemoryLedger::new()),
            documents.clone(),
            SyncSettings {
                retry: RetryPolicy::new(2, Duration::from_millis(1)),
                quickbooks_concurrency: 1,
                xero_concurrency: 1,
            },
        );

        Setup {
            org,
            documents,
            credentials,
            quickbooks,
            xero,
            dispatcher: WebhookDispatcher::new(Arc::new(orchestrator)),
        }
    }

    #[tokio::test]
    async fn test_one_failing_provider_does_not_block_the_other() {
        let s = setup(
            ScriptedAdapter::new(Provider::Xero)
                .script(vec![Err(ProviderError::Permanent("invalid contact".into()))]),
        )
        .await;
        let doc = document(s.org, &["Travel"]);
        let id = doc.id;
        s.documents.insert(doc).await;

        let report = s
            .dispatcher
            .dispatch(s.org, id, SyncOptions::default(), &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(report.summary, "quickbooks: synced, xero: failed");
        assert_eq!(report.results[0].status, SyncStatus::Success);
        assert_eq!(report.results[1].status, SyncStatus::Failed);
        assert_eq!(s.quickbooks.post_calls(), 1);
        assert_eq!(s.xero.post_calls(), 1);

        let stored = s.documents.get(id).await.unwrap();
        assert_eq!(
            stored.external_sync_notes.as_deref(),
            Some("quickbooks: synced, xero: failed")
        );
        assert!(stored.notes.unwrap().contains("[ref quickbooks:ext-1]"));
    }

    #[tokio::test]
    async fn test_only_active_integrations_are_dispatched() {
        let s = setup(ScriptedAdapter::new(Provider::Xero)).await;
        s.credentials.deactivate(s.org, Provider::QuickBooks).await.unwrap();
        let doc = document(s.org, &["Travel"]);
        let id = doc.id;
        s.documents.insert(doc).await;

        let report = s
            .dispatcher
            .dispatch(s.org, id, SyncOptions::default(), &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(report.summary, "xero: synced");
        assert_eq!(s.quickbooks.post_calls(), 0);
    }

    #[tokio::test]
    async fn test_unknown_document_is_rejected() {
        let s = setup(ScriptedAdapter::new(Provider::Xero)).await;
        let missing = DocumentId::new();

        let err = s
            .dispatcher
            .dispatch(s.org, missing, SyncOptions::default(), &CancellationToken::new())
            .await
            .unwrap_err();

        assert_eq!(err, SyncError::DocumentNotFound(missing));
        assert_eq!(s.quickbooks.post_calls() + s.xero.post_calls(), 0);
    }

    #[tokio::test]
    async fn test_bulk_reprocess_forced_posts_again() {
        let s = setup(ScriptedAdapter::new(Provider::Xero)).await;
        let doc = document(s.org, &["Travel"]);
        let id = doc.id;
        s.documents.insert(doc).await;
        let cancel = CancellationToken::new();

        s.dispatcher
            .dispatch(s.org, id, SyncOptions::default(), &cancel)
            .await
            .unwrap();
        let unforced = s
            .dispatcher
            .bulk_reprocess(s.org, &[id], SyncOptions::default(), &cancel)
            .await;
        assert_eq!(unforced[0].as_ref().unwrap().summary, "quickbooks: skipped, xero: skipped");

        let forced = s
            .dispatcher
            .bulk_reprocess(s.org, &[id], SyncOptions::forced(), &cancel)
            .await;
        assert_eq!(forced[0].as_ref().unwrap().summary, "quickbooks: synced, xero: synced");
        assert_eq!(s.quickbooks.post_calls(), 2);
        assert_eq!(s.xero.post_calls(), 2);
    }
}
