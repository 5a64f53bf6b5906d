//! Credential store error types.

use thiserror::Error;

use super::types::Provider;
use crate::error::PersistenceError;
use crate::provider::ProviderError;

/// Credential lifecycle errors.
#[derive(Debug, Error)]
pub enum CredentialError {
    /// No active credential for the organization and provider.
    #[error("no active {0} integration")]
    NotFound(Provider),

    /// No adapter is configured for the provider.
    #[error("{0} is not configured on this server")]
    ProviderNotConfigured(Provider),

    /// The authorization code could not be exchanged.
    #[error("authorization with {provider} failed: {message}")]
    AuthExchange {
        /// Provider that rejected the code.
        provider: Provider,
        /// Provider's explanation.
        message: String,
    },

    /// The refresh token was rejected; the integration has been disconnected.
    #[error("{provider} authorization expired: {message}")]
    AuthExpired {
        /// Provider that rejected the refresh token.
        provider: Provider,
        /// Provider's explanation.
        message: String,
    },

    /// The refresh call failed for a reason other than a rejected token.
    #[error("token refresh failed: {0}")]
    Refresh(ProviderError),

    /// Storage failure.
    #[error(transparent)]
    Persistence(#[from] PersistenceError),
}
