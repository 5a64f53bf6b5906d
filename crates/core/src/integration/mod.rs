//! OAuth credentials and their refresh lifecycle.

pub mod error;
pub mod store;
pub mod types;

#[cfg(test)]
mod tests;

pub use error::CredentialError;
pub use store::{CredentialRepository, CredentialStore};
pub use types::{AuthGrant, ConnectionState, Credential, Provider, TokenSet};
