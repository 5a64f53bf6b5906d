//! Documents produced by the OCR pipeline, as seen by sync.

pub mod annotation;
pub mod repository;
pub mod types;

pub use repository::{BulkUpdate, DocumentRepository};
pub use types::{Document, DocumentStatus, LineItem, UNCATEGORIZED};
