//! Sync attempt records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use ledgerbridge_shared::types::{DocumentId, OrganizationId, SyncAttemptId};

use crate::integration::Provider;
use crate::provider::ExternalRecordId;

/// Outcome of one attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncStatus {
    /// Provider call about to be made.
    Pending,
    /// Provider accepted the record.
    Success,
    /// Attempt failed; see the error kind.
    Failed,
    /// Not attempted because the document was already synced.
    Skipped,
}

impl SyncStatus {
    /// Returns the string representation of the status.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Success => "success",
            Self::Failed => "failed",
            Self::Skipped => "skipped",
        }
    }

    /// Parses a status from a string.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(Self::Pending),
            "success" => Some(Self::Success),
            "failed" => Some(Self::Failed),
            "skipped" => Some(Self::Skipped),
            _ => None,
        }
    }

    /// Returns true for statuses that close an attempt.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        !matches!(self, Self::Pending)
    }
}

/// One append-only ledger row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncAttempt {
    /// Attempt ID.
    pub id: SyncAttemptId,
    /// Document pushed.
    pub document_id: DocumentId,
    /// Target provider.
    pub provider: Provider,
    /// Owning organization.
    pub organization_id: OrganizationId,
    /// Outcome.
    pub status: SyncStatus,
    /// Provider record id on success.
    pub external_record_id: Option<ExternalRecordId>,
    /// Error wire name on failure, e.g. `TransientProviderError`.
    pub error_kind: Option<String>,
    /// Human-readable failure or skip reason.
    pub error_message: Option<String>,
    /// Idempotency key sent with the provider call.
    pub idempotency_key: Option<String>,
    /// When the attempt was recorded.
    pub attempted_at: DateTime<Utc>,
}

impl SyncAttempt {
    fn new(
        organization_id: OrganizationId,
        document_id: DocumentId,
        provider: Provider,
        status: SyncStatus,
    ) -> Self {
        Self {
            id: SyncAttemptId::new(),
            document_id,
            provider,
            organization_id,
            status,
            external_record_id: None,
            error_kind: None,
            error_message: None,
            idempotency_key: None,
            attempted_at: Utc::now(),
        }
    }

    /// Records that a provider call is starting.
    #[must_use]
    pub fn pending(
        organization_id: OrganizationId,
        document_id: DocumentId,
        provider: Provider,
        idempotency_key: &str,
    ) -> Self {
        Self {
            idempotency_key: Some(idempotency_key.to_string()),
            ..Self::new(organization_id, document_id, provider, SyncStatus::Pending)
        }
    }

    /// Records a provider-side record.
    #[must_use]
    pub fn success(
        organization_id: OrganizationId,
        document_id: DocumentId,
        provider: Provider,
        external_record_id: ExternalRecordId,
    ) -> Self {
        Self {
            external_record_id: Some(external_record_id),
            ..Self::new(organization_id, document_id, provider, SyncStatus::Success)
        }
    }

    /// Records a failure.
    #[must_use]
    pub fn failed(
        organization_id: OrganizationId,
        document_id: DocumentId,
        provider: Provider,
        error_kind: &str,
        error_message: impl Into<String>,
    ) -> Self {
        Self {
            error_kind: Some(error_kind.to_string()),
            error_message: Some(error_message.into()),
            ..Self::new(organization_id, document_id, provider, SyncStatus::Failed)
        }
    }

    /// Records that the document was not pushed because it already was.
    #[must_use]
    pub fn skipped(
        organization_id: OrganizationId,
        document_id: DocumentId,
        provider: Provider,
        reason: impl Into<String>,
    ) -> Self {
        Self {
            error_message: Some(reason.into()),
            ..Self::new(organization_id, document_id, provider, SyncStatus::Skipped)
        }
    }

    /// Attaches the idempotency key of the provider call this row closes.
    #[must_use]
    pub fn with_idempotency_key(mut self, key: &str) -> Self {
        self.idempotency_key = Some(key.to_string());
        self
    }
}
