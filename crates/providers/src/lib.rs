//! Accounting provider adapters for Ledgerbridge.
//!
//! - `quickbooks` - QuickBooks Online `Purchase` posting
//! - `xero` - Xero `ACCPAY` bill posting
//! - `oauth` - Shared OAuth2 token endpoint client
//! - `http` - HTTP client and error classification

pub mod http;
pub mod oauth;
pub mod quickbooks;
pub mod xero;

use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tracing::info;

use ledgerbridge_core::provider::AdapterRegistry;
use ledgerbridge_shared::AppConfig;

pub use quickbooks::QuickBooksAdapter;
pub use xero::XeroAdapter;

/// Errors building the adapters.
#[derive(Debug, Error)]
pub enum ProviderSetupError {
    /// The HTTP client could not be built.
    #[error("failed to build HTTP client: {0}")]
    HttpClient(#[from] reqwest::Error),
}

/// Builds an adapter for every provider present in the configuration.
pub fn build_registry(config: &AppConfig) -> Result<AdapterRegistry, ProviderSetupError> {
    let client = http::client(Duration::from_secs(config.sync.request_timeout_secs))?;
    let mut registry = AdapterRegistry::new();

    if let Some(quickbooks) = &config.quickbooks {
        registry = registry.with(Arc::new(QuickBooksAdapter::new(client.clone(), quickbooks)));
        info!("QuickBooks adapter configured");
    }
    if let Some(xero) = &config.xero {
        registry = registry.with(Arc::new(XeroAdapter::new(client, xero)));
        info!("Xero adapter configured");
    }

    Ok(registry)
}
