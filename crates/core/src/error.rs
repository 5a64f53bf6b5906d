//! Storage failure shared by every repository contract.

use thiserror::Error;

/// A repository could not read or write its backing store.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("persistence failure: {0}")]
pub struct PersistenceError(pub String);

impl PersistenceError {
    /// Creates a persistence error from any displayable cause.
    #[must_use]
    pub fn new(msg: impl Into<String>) -> Self {
        Self(msg.into())
    }
}
