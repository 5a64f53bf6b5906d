//! Sync orchestration: batches, retries, idempotency and results.

pub mod error;
pub mod idempotency;
pub mod orchestrator;
pub mod retry;
pub mod types;

#[cfg(test)]
mod retry_props;

pub use error::{SyncError, SyncErrorKind};
pub use idempotency::idempotency_key;
pub use orchestrator::{SyncOrchestrator, SyncSettings};
pub use retry::RetryPolicy;
pub use types::{BatchResult, DocumentSyncResult, SyncOptions};
