//! Core sync logic for Ledgerbridge.
//!
//! This crate contains the rules for pushing processed documents into
//! accounting providers with ZERO web or database dependencies. Storage and
//! provider HTTP clients plug in through the traits defined here.
//!
//! # Modules
//!
//! - `integration` - OAuth credentials and their refresh lifecycle
//! - `provider` - The adapter contract every accounting provider implements
//! - `document` - Processed documents and their sync annotations
//! - `mapping` - Category to account code resolution
//! - `ledger` - Append-only record of sync attempts
//! - `sync` - Batch and single-document orchestration
//! - `webhook` - Fan-out when a document finishes processing
//! - `memory` - In-memory stores for tests and local runs

pub mod document;
pub mod error;
pub mod integration;
pub mod ledger;
pub mod locks;
pub mod mapping;
pub mod memory;
pub mod provider;
pub mod sync;
pub mod webhook;

pub use error::PersistenceError;

#[cfg(test)]
mod testing;
