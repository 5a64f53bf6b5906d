//! Batch and single-document sync.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use futures::{StreamExt, stream};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use ledgerbridge_shared::SyncConfig;
use ledgerbridge_shared::types::{DocumentId, OrganizationId};

use super::error::{SyncError, SyncErrorKind};
use super::idempotency::idempotency_key;
use super::retry::RetryPolicy;
use super::types::{BatchResult, DocumentSyncResult, SyncOptions};
use crate::document::{Document, DocumentRepository, annotation};
use crate::integration::{Credential, CredentialStore, Provider};
use crate::ledger::{SyncAttempt, SyncLedger};
use crate::locks::{KeyedGuard, KeyedLocks};
use crate::mapping::{CategoryMapper, MappedLineItem};
use crate::provider::{AdapterRegistry, ExternalRecordId, PostingRequest, ProviderAdapter};

/// Retry and concurrency tuning.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncSettings {
    /// Backoff for transient provider errors.
    pub retry: RetryPolicy,
    /// Documents in flight per QuickBooks batch.
    pub quickbooks_concurrency: usize,
    /// Documents in flight per Xero batch.
    pub xero_concurrency: usize,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self::from_config(&SyncConfig::default())
    }
}

impl SyncSettings {
    /// Builds settings from configuration.
    #[must_use]
    pub fn from_config(config: &SyncConfig) -> Self {
        Self {
            retry: RetryPolicy::new(
                config.max_attempts,
                Duration::from_millis(config.retry_base_delay_ms),
            ),
            quickbooks_concurrency: config.quickbooks_concurrency,
            xero_concurrency: config.xero_concurrency,
        }
    }

    /// Worker pool size for a provider, never below one.
    #[must_use]
    pub fn concurrency(&self, provider: Provider) -> usize {
        let configured = match provider {
            Provider::QuickBooks => self.quickbooks_concurrency,
            Provider::Xero => self.xero_concurrency,
        };
        configured.max(1)
    }
}

/// Drives documents through mapping, posting and recording.
///
/// Work on one (document, provider) pair is serialized; different pairs run
/// concurrently up to the provider's pool size.
pub struct SyncOrchestrator {
    credentials: Arc<CredentialStore>,
    mapper: CategoryMapper,
    adapters: AdapterRegistry,
    ledger: Arc<dyn SyncLedger>,
    documents: Arc<dyn DocumentRepository>,
    settings: SyncSettings,
    document_locks: KeyedLocks<(DocumentId, Provider)>,
}

impl SyncOrchestrator {
    /// Creates an orchestrator from its collaborators.
    #[must_use]
    pub fn new(
        credentials: Arc<CredentialStore>,
        mapper: CategoryMapper,
        adapters: AdapterRegistry,
        ledger: Arc<dyn SyncLedger>,
        documents: Arc<dyn DocumentRepository>,
        settings: SyncSettings,
    ) -> Self {
        Self {
            credentials,
            mapper,
            adapters,
            ledger,
            documents,
            settings,
            document_locks: KeyedLocks::new(),
        }
    }

    /// Credential store used for token freshness.
    #[must_use]
    pub fn credentials(&self) -> &Arc<CredentialStore> {
        &self.credentials
    }

    /// Document store annotations are written to.
    #[must_use]
    pub fn documents(&self) -> &Arc<dyn DocumentRepository> {
        &self.documents
    }

    /// Attempt ledger.
    #[must_use]
    pub fn ledger(&self) -> &Arc<dyn SyncLedger> {
        &self.ledger
    }

    /// Syncs a batch of documents to one provider.
    ///
    /// Results keep the order of `document_ids`. Only the organization-level
    /// preconditions fail the whole batch; everything else is reported per
    /// document.
    ///
    /// # Errors
    ///
    /// Returns `SyncError::IntegrationNotFound` without an active integration
    /// and `SyncError::AuthExpired` when its token can no longer be refreshed.
    pub async fn sync_batch(
        &self,
        organization_id: OrganizationId,
        provider: Provider,
        document_ids: &[DocumentId],
        options: SyncOptions,
        cancel: &CancellationToken,
    ) -> Result<BatchResult, SyncError> {
        let adapter = self.preconditions(organization_id, provider).await?;
        let concurrency = self.settings.concurrency(provider);

        info!(
            org_id = %organization_id,
            provider = %provider,
            documents = document_ids.len(),
            concurrency,
            force = options.force_resync,
            "Starting batch sync"
        );

        let results: Vec<DocumentSyncResult> = stream::iter(document_ids.iter().copied())
            .map(|document_id| {
                self.sync_document(
                    organization_id,
                    provider,
                    &adapter,
                    document_id,
                    options,
                    cancel,
                )
            })
            .buffered(concurrency)
            .collect()
            .await;

        let batch = BatchResult::new(provider, results);
        info!(
            org_id = %organization_id,
            provider = %provider,
            synced = batch.synced_count,
            failed = batch.failed_count,
            skipped = batch.skipped_count,
            "Batch sync finished"
        );
        Ok(batch)
    }

    /// Syncs a single document to one provider.
    ///
    /// # Errors
    ///
    /// Same organization-level errors as [`Self::sync_batch`].
    pub async fn sync_one(
        &self,
        organization_id: OrganizationId,
        provider: Provider,
        document_id: DocumentId,
        options: SyncOptions,
        cancel: &CancellationToken,
    ) -> Result<DocumentSyncResult, SyncError> {
        let adapter = self.preconditions(organization_id, provider).await?;
        Ok(self
            .sync_document(
                organization_id,
                provider,
                &adapter,
                document_id,
                options,
                cancel,
            )
            .await)
    }

    async fn preconditions(
        &self,
        organization_id: OrganizationId,
        provider: Provider,
    ) -> Result<Arc<dyn ProviderAdapter>, SyncError> {
        self.credentials.fresh(organization_id, provider).await?;
        self.adapters
            .get(provider)
            .ok_or(SyncError::IntegrationNotFound(provider))
    }

    async fn sync_document(
        &self,
        organization_id: OrganizationId,
        provider: Provider,
        adapter: &Arc<dyn ProviderAdapter>,
        document_id: DocumentId,
        options: SyncOptions,
        cancel: &CancellationToken,
    ) -> DocumentSyncResult {
        if cancel.is_cancelled() {
            return DocumentSyncResult::failed(document_id, provider, SyncError::Cancelled);
        }

        let guard = tokio::select! {
            biased;
            () = cancel.cancelled() => {
                return DocumentSyncResult::failed(document_id, provider, SyncError::Cancelled);
            }
            guard = self.document_locks.lock((document_id, provider)) => guard,
        };

        let outcome = match self
            .prepare(organization_id, provider, adapter, document_id, options)
            .await
        {
            Ok(Prepared::Done(result)) => return result,
            Ok(Prepared::Post(parts)) => Posting { _lock: guard, parts }.spawn(cancel).await,
            Err(err) => Err(err),
        };

        outcome.unwrap_or_else(|err| {
            warn!(
                org_id = %organization_id,
                provider = %provider,
                document_id = %document_id,
                error = %err,
                kind = err.kind().as_str(),
                "Document sync failed"
            );
            DocumentSyncResult::failed(document_id, provider, err)
        })
    }

    /// Everything up to the provider call: load, skip check, mapping and
    /// credential. Failures here never leave a pending attempt behind.
    async fn prepare(
        &self,
        organization_id: OrganizationId,
        provider: Provider,
        adapter: &Arc<dyn ProviderAdapter>,
        document_id: DocumentId,
        options: SyncOptions,
    ) -> Result<Prepared, SyncError> {
        let document = self
            .documents
            .find(organization_id, document_id)
            .await?
            .ok_or(SyncError::DocumentNotFound(document_id))?;

        if !options.force_resync
            && let Some(result) = self.already_synced(&document, provider).await?
        {
            return Ok(Prepared::Done(result));
        }

        let lines = match self.mapper.map_document(&document, provider).await {
            Ok(lines) => lines,
            Err(err) => {
                let err = err.into();
                return Err(record_failure(self.ledger.as_ref(), &document, provider, err, None).await);
            }
        };

        let credential = match self.credentials.fresh(organization_id, provider).await {
            Ok(credential) => credential,
            Err(err) => {
                let err = err.into();
                return Err(record_failure(self.ledger.as_ref(), &document, provider, err, None).await);
            }
        };

        let generation = self.ledger.success_count(document_id, provider).await?;
        let key = idempotency_key(document_id, provider, generation);

        Ok(Prepared::Post(PostingParts {
            ledger: Arc::clone(&self.ledger),
            documents: Arc::clone(&self.documents),
            adapter: Arc::clone(adapter),
            retry: self.settings.retry,
            provider,
            document,
            lines,
            credential,
            key,
        }))
    }

    /// Returns a skipped result if a success is on record or recoverable from
    /// the document's notes.
    async fn already_synced(
        &self,
        document: &Document,
        provider: Provider,
    ) -> Result<Option<DocumentSyncResult>, SyncError> {
        let organization_id = document.organization_id;
        let document_id = document.id;

        if let Some(prior) = self.ledger.latest_success(document_id, provider).await? {
            self.ledger
                .append(&SyncAttempt::skipped(
                    organization_id,
                    document_id,
                    provider,
                    "already synced",
                ))
                .await?;
            debug!(document_id = %document_id, provider = %provider, "Already synced, skipping");
            return Ok(Some(DocumentSyncResult::skipped(
                document_id,
                provider,
                prior.external_record_id,
            )));
        }

        let Some(external_id) = document
            .notes
            .as_deref()
            .and_then(|notes| annotation::find_reference(notes, provider))
        else {
            return Ok(None);
        };

        self.ledger
            .append(&SyncAttempt::success(
                organization_id,
                document_id,
                provider,
                external_id.clone(),
            ))
            .await?;
        info!(
            document_id = %document_id,
            provider = %provider,
            external_id = %external_id,
            "Recovered unrecorded sync from document notes"
        );
        Ok(Some(DocumentSyncResult::skipped(
            document_id,
            provider,
            Some(external_id),
        )))
    }
}

enum Prepared {
    Done(DocumentSyncResult),
    Post(PostingParts),
}

/// Owned inputs of one provider call, from the pending attempt to the
/// terminal one.
struct PostingParts {
    ledger: Arc<dyn SyncLedger>,
    documents: Arc<dyn DocumentRepository>,
    adapter: Arc<dyn ProviderAdapter>,
    retry: RetryPolicy,
    provider: Provider,
    document: Document,
    lines: Vec<MappedLineItem>,
    credential: Credential,
    key: String,
}

struct Posting {
    _lock: KeyedGuard<(DocumentId, Provider)>,
    parts: PostingParts,
}

impl Posting {
    /// Runs the posting on its own task.
    ///
    /// The task outlives the calling future: if the caller is dropped, its
    /// token is cancelled and the task still appends the terminal attempt
    /// before releasing the document lock.
    async fn spawn(self, cancel: &CancellationToken) -> Result<DocumentSyncResult, SyncError> {
        let ledger = Arc::clone(&self.parts.ledger);
        let organization_id = self.parts.document.organization_id;
        let document_id = self.parts.document.id;
        let provider = self.parts.provider;
        let key = self.parts.key.clone();

        let cancel = cancel.child_token();
        let cancel_on_drop = cancel.clone().drop_guard();
        let joined = tokio::spawn(self.run(cancel)).await;
        cancel_on_drop.disarm();

        match joined {
            Ok(outcome) => outcome,
            Err(e) => {
                error!(document_id = %document_id, provider = %provider, error = %e, "Posting task aborted");
                let attempt = SyncAttempt::failed(
                    organization_id,
                    document_id,
                    provider,
                    SyncErrorKind::PermanentProvider.as_str(),
                    format!("posting task aborted: {e}"),
                )
                .with_idempotency_key(&key);
                ledger.append(&attempt).await?;
                Err(SyncError::PermanentProvider(format!("posting task aborted: {e}")))
            }
        }
    }

    async fn run(self, cancel: CancellationToken) -> Result<DocumentSyncResult, SyncError> {
        let parts = &self.parts;
        let document = &parts.document;
        let provider = parts.provider;
        let document_id = document.id;

        parts
            .ledger
            .append(&SyncAttempt::pending(
                document.organization_id,
                document_id,
                provider,
                &parts.key,
            ))
            .await?;

        let request = PostingRequest {
            document,
            lines: &parts.lines,
            credential: &parts.credential,
            idempotency_key: &parts.key,
        };
        let request = &request;
        let adapter = parts.adapter.as_ref();

        let outcome = tokio::select! {
            biased;
            () = cancel.cancelled() => Err(SyncError::Cancelled),
            result = parts.retry.execute(move |attempt| {
                debug!(document_id = %document_id, provider = %provider, attempt, "Posting document");
                adapter.post_expense_or_bill(request)
            }) => result.map_err(SyncError::from),
        };

        match outcome {
            Ok(external_id) => Ok(record_success(parts, external_id).await),
            Err(err) => {
                let key = Some(parts.key.as_str());
                Err(record_failure(parts.ledger.as_ref(), document, provider, err, key).await)
            }
        }
    }
}

async fn record_success(parts: &PostingParts, external_id: ExternalRecordId) -> DocumentSyncResult {
    let document = &parts.document;
    let provider = parts.provider;
    let attempt = SyncAttempt::success(
        document.organization_id,
        document.id,
        provider,
        external_id.clone(),
    )
    .with_idempotency_key(&parts.key);
    let recorded = parts.ledger.append(&attempt).await;

    // Annotated regardless of the ledger outcome; notes are the reconciliation source.
    let note = annotation::sync_annotation(provider, Utc::now().date_naive(), &external_id);
    if let Err(e) = parts.documents.append_note(document.id, &note).await {
        warn!(document_id = %document.id, provider = %provider, error = %e, "Failed to annotate document");
    }

    match recorded {
        Ok(()) => {
            info!(
                org_id = %document.organization_id,
                document_id = %document.id,
                provider = %provider,
                external_id = %external_id,
                "Document synced"
            );
            DocumentSyncResult::synced(document.id, provider, external_id)
        }
        Err(e) => {
            error!(
                document_id = %document.id,
                provider = %provider,
                external_id = %external_id,
                error = %e,
                "Provider accepted the document but the ledger write failed"
            );
            DocumentSyncResult::failed(document.id, provider, e.into()).with_external_id(external_id)
        }
    }
}

async fn record_failure(
    ledger: &dyn SyncLedger,
    document: &Document,
    provider: Provider,
    err: SyncError,
    key: Option<&str>,
) -> SyncError {
    let mut attempt = SyncAttempt::failed(
        document.organization_id,
        document.id,
        provider,
        err.kind().as_str(),
        err.to_string(),
    );
    if let Some(key) = key {
        attempt = attempt.with_idempotency_key(key);
    }

    if let Err(e) = ledger.append(&attempt).await {
        error!(document_id = %document.id, provider = %provider, error = %e, "Failed to record sync failure");
    }
    err
}
