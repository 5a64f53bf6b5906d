//! Postgres implementations of the core storage contracts.

mod credential;
mod document;
mod ledger;
mod mapping;

pub use credential::PgCredentialRepository;
pub use document::PgDocumentRepository;
pub use ledger::PgSyncLedger;
pub use mapping::PgMappingRepository;

use sea_orm::DbErr;
use tracing::error;

use ledgerbridge_core::PersistenceError;
use ledgerbridge_core::integration::Provider;

pub(crate) fn db_error(err: DbErr) -> PersistenceError {
    error!(error = %err, "Database operation failed");
    PersistenceError::new(err.to_string())
}

pub(crate) fn parse_provider(value: &str) -> Result<Provider, PersistenceError> {
    Provider::parse(value)
        .ok_or_else(|| PersistenceError::new(format!("unknown provider '{value}' in database")))
}
