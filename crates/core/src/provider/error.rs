//! Provider adapter error types.

use thiserror::Error;

/// Failures reported by an accounting provider adapter.
///
/// The transient/permanent split drives the retry policy: only
/// `Transient` is retried.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ProviderError {
    /// The authorization code was invalid, expired or already used.
    #[error("authorization code exchange failed: {0}")]
    AuthExchange(String),

    /// The refresh token itself was rejected.
    #[error("refresh token rejected: {0}")]
    AuthExpired(String),

    /// Timeout, connection failure, 5xx or 429.
    #[error("transient provider error: {0}")]
    Transient(String),

    /// Validation or other 4xx rejection; retrying will not help.
    #[error("provider rejected request: {0}")]
    Permanent(String),
}

impl ProviderError {
    /// Returns true if the call may succeed when repeated.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::Transient(_))
    }
}
