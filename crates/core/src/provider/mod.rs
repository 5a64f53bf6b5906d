//! The contract every accounting provider implements.
//!
//! The orchestrator never branches on the provider beyond picking an adapter
//! from the registry; payload shaping lives entirely in the adapters.

pub mod error;

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::document::Document;
use crate::integration::{AuthGrant, Credential, Provider, TokenSet};
use crate::mapping::MappedLineItem;

pub use error::ProviderError;

/// Identifier the provider assigned to the record we created.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ExternalRecordId(pub String);

impl ExternalRecordId {
    /// Creates an external record id.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the id as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ExternalRecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Everything an adapter needs to create one expense or bill.
#[derive(Debug, Clone, Copy)]
pub struct PostingRequest<'a> {
    /// Document being pushed.
    pub document: &'a Document,
    /// Line items with resolved account codes.
    pub lines: &'a [MappedLineItem],
    /// Fresh credential for the document's organization.
    pub credential: &'a Credential,
    /// Stable key so the provider can drop duplicate creations.
    pub idempotency_key: &'a str,
}

/// Capability set of an accounting provider.
#[async_trait]
pub trait ProviderAdapter: Send + Sync {
    /// Which provider this adapter talks to.
    fn provider(&self) -> Provider;

    /// Builds the URL the user visits to authorize the app.
    fn authorization_url(&self, state: &str) -> Result<String, ProviderError>;

    /// Exchanges an authorization code for tokens.
    async fn exchange_auth_code(&self, grant: &AuthGrant) -> Result<TokenSet, ProviderError>;

    /// Obtains a new access token. Fails with `AuthExpired` if the refresh
    /// token is rejected.
    async fn refresh(&self, tokens: &TokenSet) -> Result<TokenSet, ProviderError>;

    /// Creates the provider-side expense or bill for a document.
    async fn post_expense_or_bill(
        &self,
        request: &PostingRequest<'_>,
    ) -> Result<ExternalRecordId, ProviderError>;
}

/// Adapters keyed by provider.
#[derive(Clone, Default)]
pub struct AdapterRegistry {
    adapters: BTreeMap<Provider, Arc<dyn ProviderAdapter>>,
}

impl fmt::Debug for AdapterRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AdapterRegistry")
            .field("providers", &self.adapters.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl AdapterRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds an adapter, replacing any previous one for the same provider.
    #[must_use]
    pub fn with(mut self, adapter: Arc<dyn ProviderAdapter>) -> Self {
        self.adapters.insert(adapter.provider(), adapter);
        self
    }

    /// Returns the adapter for a provider, if one is configured.
    #[must_use]
    pub fn get(&self, provider: Provider) -> Option<Arc<dyn ProviderAdapter>> {
        self.adapters.get(&provider).cloned()
    }

    /// Providers with a configured adapter.
    pub fn providers(&self) -> impl Iterator<Item = Provider> + '_ {
        self.adapters.keys().copied()
    }
}
