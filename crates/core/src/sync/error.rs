//! Sync error taxonomy.

use thiserror::Error;

use ledgerbridge_shared::types::DocumentId;

use crate::error::PersistenceError;
use crate::integration::{CredentialError, Provider};
use crate::mapping::MappingError;
use crate::provider::ProviderError;

/// Wire names of sync errors, as stored in `SyncAttempt::error_kind` and
/// returned by the API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SyncErrorKind {
    /// `AuthExchangeError`
    AuthExchange,
    /// `AuthExpiredError`
    AuthExpired,
    /// `IntegrationNotFoundError`
    IntegrationNotFound,
    /// `MappingMissingError`
    MappingMissing,
    /// `TransientProviderError`
    TransientProvider,
    /// `PermanentProviderError`
    PermanentProvider,
    /// `CancelledError`
    Cancelled,
    /// `PersistenceError`
    Persistence,
    /// `DocumentNotFoundError`
    DocumentNotFound,
}

impl SyncErrorKind {
    /// Returns the wire name.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::AuthExchange => "AuthExchangeError",
            Self::AuthExpired => "AuthExpiredError",
            Self::IntegrationNotFound => "IntegrationNotFoundError",
            Self::MappingMissing => "MappingMissingError",
            Self::TransientProvider => "TransientProviderError",
            Self::PermanentProvider => "PermanentProviderError",
            Self::Cancelled => "CancelledError",
            Self::Persistence => "PersistenceError",
            Self::DocumentNotFound => "DocumentNotFoundError",
        }
    }
}

/// Errors raised while syncing.
///
/// Organization-level variants (`IntegrationNotFound`, `AuthExpired`,
/// `AuthExchange`) abort a batch; the rest are reported per document.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SyncError {
    /// The provider rejected an authorization code.
    #[error("authorization failed: {0}")]
    AuthExchange(String),

    /// The refresh token was rejected; the integration must be reconnected.
    #[error("authorization expired, reconnect the integration: {0}")]
    AuthExpired(String),

    /// No active integration for the provider.
    #[error("no active {0} integration")]
    IntegrationNotFound(Provider),

    /// Categories on the document have no account mapping.
    #[error("no account mapping for {}", categories.join(", "))]
    MappingMissing {
        /// Every unmapped category.
        categories: Vec<String>,
    },

    /// The provider failed in a way worth retrying, and retries ran out.
    #[error("provider temporarily unavailable: {0}")]
    TransientProvider(String),

    /// The provider rejected the record.
    #[error("provider rejected the record: {0}")]
    PermanentProvider(String),

    /// The run was cancelled.
    #[error("sync cancelled")]
    Cancelled,

    /// Storage failure.
    #[error("persistence failure: {0}")]
    Persistence(String),

    /// The document does not exist for the organization.
    #[error("document {0} not found")]
    DocumentNotFound(DocumentId),
}

impl SyncError {
    /// Returns the error's wire kind.
    #[must_use]
    pub const fn kind(&self) -> SyncErrorKind {
        match self {
            Self::AuthExchange(_) => SyncErrorKind::AuthExchange,
            Self::AuthExpired(_) => SyncErrorKind::AuthExpired,
            Self::IntegrationNotFound(_) => SyncErrorKind::IntegrationNotFound,
            Self::MappingMissing { .. } => SyncErrorKind::MappingMissing,
            Self::TransientProvider(_) => SyncErrorKind::TransientProvider,
            Self::PermanentProvider(_) => SyncErrorKind::PermanentProvider,
            Self::Cancelled => SyncErrorKind::Cancelled,
            Self::Persistence(_) => SyncErrorKind::Persistence,
            Self::DocumentNotFound(_) => SyncErrorKind::DocumentNotFound,
        }
    }
}

impl From<ProviderError> for SyncError {
    fn from(err: ProviderError) -> Self {
        match err {
            ProviderError::AuthExchange(message) => Self::AuthExchange(message),
            ProviderError::AuthExpired(message) => Self::AuthExpired(message),
            ProviderError::Transient(message) => Self::TransientProvider(message),
            ProviderError::Permanent(message) => Self::PermanentProvider(message),
        }
    }
}

impl From<CredentialError> for SyncError {
    fn from(err: CredentialError) -> Self {
        match err {
            CredentialError::NotFound(provider) | CredentialError::ProviderNotConfigured(provider) => {
                Self::IntegrationNotFound(provider)
            }
            CredentialError::AuthExchange { message, .. } => Self::AuthExchange(message),
            CredentialError::AuthExpired { message, .. } => Self::AuthExpired(message),
            CredentialError::Refresh(e) => e.into(),
            CredentialError::Persistence(e) => e.into(),
        }
    }
}

impl From<MappingError> for SyncError {
    fn from(err: MappingError) -> Self {
        match err {
            MappingError::Missing { categories } => Self::MappingMissing { categories },
            MappingError::Persistence(e) => e.into(),
        }
    }
}

impl From<PersistenceError> for SyncError {
    fn from(err: PersistenceError) -> Self {
        Self::Persistence(err.0)
    }
}
