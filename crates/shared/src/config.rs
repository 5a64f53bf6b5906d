//! Application configuration management.

use serde::Deserialize;

/// Application configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    /// Server configuration.
    #[serde(default)]
    pub server: ServerConfig,
    /// Database configuration.
    pub database: DatabaseConfig,
    /// Session token verification.
    pub jwt: JwtSettings,
    /// QuickBooks Online app credentials. The integration is disabled when absent.
    pub quickbooks: Option<ProviderConfig>,
    /// Xero app credentials. The integration is disabled when absent.
    pub xero: Option<ProviderConfig>,
    /// Sync engine tuning.
    #[serde(default)]
    pub sync: SyncConfig,
}

/// Server configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Host to bind to.
    #[serde(default = "default_host")]
    pub host: String,
    /// Port to listen on.
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

/// Database configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    /// Database connection URL.
    pub url: String,
    /// Maximum number of connections in the pool.
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
    /// Minimum number of connections in the pool.
    #[serde(default = "default_min_connections")]
    pub min_connections: u32,
}

fn default_max_connections() -> u32 {
    10
}

fn default_min_connections() -> u32 {
    1
}

/// Session token settings.
#[derive(Debug, Clone, Deserialize)]
pub struct JwtSettings {
    /// Secret shared with the identity service.
    pub secret: String,
    /// Tolerated clock skew in seconds.
    #[serde(default = "default_leeway")]
    pub leeway_secs: u64,
}

fn default_leeway() -> u64 {
    30
}

/// OAuth app registration for one accounting provider.
///
/// Endpoint fields default to the provider's production URLs when unset.
#[derive(Debug, Clone, Deserialize)]
pub struct ProviderConfig {
    /// OAuth client ID.
    pub client_id: String,
    /// OAuth client secret.
    pub client_secret: String,
    /// Redirect URI registered with the provider (our callback route).
    pub redirect_uri: String,
    /// Override for the authorization endpoint.
    pub authorize_url: Option<String>,
    /// Override for the token endpoint.
    pub token_url: Option<String>,
    /// Override for the accounting API base URL.
    pub api_base_url: Option<String>,
    /// Account that pays for QuickBooks purchases. Ignored by Xero.
    pub payment_account_id: Option<String>,
}

/// Sync engine tuning.
#[derive(Debug, Clone, Deserialize)]
pub struct SyncConfig {
    /// Provider call attempts per document, including the first.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    /// Base delay for exponential backoff between attempts.
    #[serde(default = "default_retry_base_delay_ms")]
    pub retry_base_delay_ms: u64,
    /// Concurrent QuickBooks postings per batch.
    #[serde(default = "default_quickbooks_concurrency")]
    pub quickbooks_concurrency: usize,
    /// Concurrent Xero postings per batch.
    #[serde(default = "default_xero_concurrency")]
    pub xero_concurrency: usize,
    /// Refresh tokens expiring within this many seconds.
    #[serde(default = "default_refresh_window_secs")]
    pub refresh_window_secs: i64,
    /// Timeout for a single provider HTTP request.
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    /// Frontend base URL the OAuth callback redirects back to.
    #[serde(default = "default_frontend_url")]
    pub frontend_url: String,
    /// Shared secret expected in `x-webhook-secret` on the document-processed webhook.
    pub webhook_secret: Option<String>,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            retry_base_delay_ms: default_retry_base_delay_ms(),
            quickbooks_concurrency: default_quickbooks_concurrency(),
            xero_concurrency: default_xero_concurrency(),
            refresh_window_secs: default_refresh_window_secs(),
            request_timeout_secs: default_request_timeout_secs(),
            frontend_url: default_frontend_url(),
            webhook_secret: None,
        }
    }
}

fn default_max_attempts() -> u32 {
    3
}

fn default_retry_base_delay_ms() -> u64 {
    500
}

fn default_quickbooks_concurrency() -> usize {
    4
}

fn default_xero_concurrency() -> usize {
    2 // Xero allows 5 concurrent calls per tenant
}

fn default_refresh_window_secs() -> i64 {
    300 // 5 minutes
}

fn default_request_timeout_secs() -> u64 {
    30
}

fn default_frontend_url() -> String {
    "http://localhost:3000".to_string()
}

impl AppConfig {
    /// Loads configuration from environment and config files.
    ///
    /// # Errors
    ///
    /// Returns an error if configuration cannot be loaded.
    pub fn load() -> Result<Self, config::ConfigError> {
        let run_mode = std::env::var("RUN_MODE").unwrap_or_else(|_| "development".to_string());

        let config = config::Config::builder()
            .add_source(config::File::with_name("config/default").required(false))
            .add_source(config::File::with_name(&format!("config/{run_mode}")).required(false))
            .add_source(config::Environment::with_prefix("LEDGERBRIDGE").separator("__"))
            .build()?;

        config.try_deserialize()
    }
}
