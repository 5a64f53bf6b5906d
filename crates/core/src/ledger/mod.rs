//! Audit ledger of sync attempts.

pub mod repository;
pub mod types;

pub use repository::SyncLedger;
pub use types::{SyncAttempt, SyncStatus};
