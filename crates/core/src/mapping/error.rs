//! Category mapping errors.

use thiserror::Error;

use crate::error::PersistenceError;

/// Category resolution errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum MappingError {
    /// One or more categories have no account mapping.
    #[error("no account mapping for {}", categories.join(", "))]
    Missing {
        /// Every unmapped category, sorted and deduplicated.
        categories: Vec<String>,
    },

    /// Storage failure.
    #[error(transparent)]
    Persistence(#[from] PersistenceError),
}
