//! `SeaORM` entities, one module per table.

pub mod category_mappings;
pub mod documents;
pub mod integration_credentials;
pub mod sync_attempts;
