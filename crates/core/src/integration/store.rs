//! Credential store: persistence, refresh and revocation of OAuth credentials.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{Duration, Utc};
use tracing::{debug, info, warn};

use ledgerbridge_shared::types::OrganizationId;

use super::error::CredentialError;
use super::types::{AuthGrant, Credential, Provider};
use crate::error::PersistenceError;
use crate::locks::KeyedLocks;
use crate::provider::{AdapterRegistry, ProviderAdapter, ProviderError};

/// Storage for credentials, one row per (organization, provider).
#[async_trait]
pub trait CredentialRepository: Send + Sync {
    /// Finds the credential for a pair, active or not.
    async fn find(
        &self,
        organization_id: OrganizationId,
        provider: Provider,
    ) -> Result<Option<Credential>, PersistenceError>;

    /// Lists every credential of an organization, active or not.
    async fn list(
        &self,
        organization_id: OrganizationId,
    ) -> Result<Vec<Credential>, PersistenceError>;

    /// Inserts or replaces the credential for its (organization, provider).
    async fn save(&self, credential: &Credential) -> Result<(), PersistenceError>;

    /// Marks the credential inactive. Returns false if none was stored.
    async fn deactivate(
        &self,
        organization_id: OrganizationId,
        provider: Provider,
    ) -> Result<bool, PersistenceError>;
}

/// Owns every credential mutation.
///
/// Token fields only change inside the refresh critical section, which is
/// single-flight per (organization, provider): concurrent callers wait for
/// the first refresh and then read its result instead of refreshing again.
pub struct CredentialStore {
    repository: Arc<dyn CredentialRepository>,
    adapters: AdapterRegistry,
    refresh_window: Duration,
    refresh_locks: KeyedLocks<(OrganizationId, Provider)>,
}

impl CredentialStore {
    /// Default refresh safety window (5 minutes).
    pub const DEFAULT_REFRESH_WINDOW_SECS: i64 = 300;

    /// Creates a credential store.
    #[must_use]
    pub fn new(repository: Arc<dyn CredentialRepository>, adapters: AdapterRegistry) -> Self {
        Self {
            repository,
            adapters,
            refresh_window: Duration::seconds(Self::DEFAULT_REFRESH_WINDOW_SECS),
            refresh_locks: KeyedLocks::new(),
        }
    }

    /// Sets the refresh safety window.
    #[must_use]
    pub fn with_refresh_window(mut self, window: Duration) -> Self {
        self.refresh_window = window;
        self
    }

    /// Returns the refresh safety window.
    #[must_use]
    pub const fn refresh_window(&self) -> Duration {
        self.refresh_window
    }

    /// Providers this server has an adapter for, in provider order.
    #[must_use]
    pub fn configured_providers(&self) -> Vec<Provider> {
        self.adapters.providers().collect()
    }

    fn adapter(&self, provider: Provider) -> Result<Arc<dyn ProviderAdapter>, CredentialError> {
        self.adapters
            .get(provider)
            .ok_or(CredentialError::ProviderNotConfigured(provider))
    }

    /// Returns the active credential for a pair.
    ///
    /// # Errors
    ///
    /// Returns `CredentialError::NotFound` if none is stored or it was disconnected.
    pub async fn get(
        &self,
        organization_id: OrganizationId,
        provider: Provider,
    ) -> Result<Credential, CredentialError> {
        self.repository
            .find(organization_id, provider)
            .await?
            .filter(|credential| credential.is_active)
            .ok_or(CredentialError::NotFound(provider))
    }

    /// Returns the active credential for a pair, refreshed if it is about to expire.
    ///
    /// # Errors
    ///
    /// Returns `CredentialError::NotFound` without an active credential and the
    /// errors of [`Self::ensure_fresh`] when a refresh is due.
    pub async fn fresh(
        &self,
        organization_id: OrganizationId,
        provider: Provider,
    ) -> Result<Credential, CredentialError> {
        let credential = self.get(organization_id, provider).await?;
        self.ensure_fresh(credential).await
    }

    /// Lists every credential of an organization, including disconnected ones.
    ///
    /// # Errors
    ///
    /// Returns `CredentialError::Persistence` if the store cannot be read.
    pub async fn list(
        &self,
        organization_id: OrganizationId,
    ) -> Result<Vec<Credential>, CredentialError> {
        Ok(self.repository.list(organization_id).await?)
    }

    /// Lists the organization's active credentials for configured providers.
    ///
    /// # Errors
    ///
    /// Returns `CredentialError::Persistence` if the store cannot be read.
    pub async fn list_active(
        &self,
        organization_id: OrganizationId,
    ) -> Result<Vec<Credential>, CredentialError> {
        let credentials = self.repository.list(organization_id).await?;
        Ok(credentials
            .into_iter()
            .filter(|c| c.is_active && self.adapters.get(c.provider).is_some())
            .collect())
    }

    /// Builds the provider authorization URL, carrying the organization as state.
    ///
    /// # Errors
    ///
    /// Returns `CredentialError::ProviderNotConfigured` without an adapter for
    /// the provider and `CredentialError::AuthExchange` if it cannot build the URL.
    pub fn authorization_url(
        &self,
        provider: Provider,
        organization_id: OrganizationId,
    ) -> Result<String, CredentialError> {
        self.adapter(provider)?
            .authorization_url(&organization_id.to_string())
            .map_err(|e| CredentialError::AuthExchange {
                provider,
                message: e.to_string(),
            })
    }

    /// Exchanges an authorization code and stores the resulting active credential.
    ///
    /// Replaces whatever was stored for the pair, so reconnecting after a
    /// disconnect reuses the same row.
    ///
    /// # Errors
    ///
    /// Returns `CredentialError::AuthExchange` if the provider rejects the code.
    pub async fn upsert_from_auth_code(
        &self,
        organization_id: OrganizationId,
        provider: Provider,
        grant: &AuthGrant,
    ) -> Result<Credential, CredentialError> {
        let adapter = self.adapter(provider)?;

        let tokens = adapter
            .exchange_auth_code(grant)
            .await
            .map_err(|e| CredentialError::AuthExchange {
                provider,
                message: e.to_string(),
            })?;

        let credential = Credential::connect(organization_id, provider, tokens);

        // Hold the refresh lock so a concurrent refresh cannot overwrite the new tokens.
        let _guard = self.refresh_locks.lock((organization_id, provider)).await;
        self.repository.save(&credential).await?;

        info!(
            org_id = %organization_id,
            provider = %provider,
            tenant = ?credential.external_tenant_id,
            "Integration connected"
        );

        Ok(credential)
    }

    /// Returns the credential unchanged unless it expires within the refresh
    /// window, in which case it is refreshed and persisted first.
    ///
    /// # Errors
    ///
    /// Returns `CredentialError::AuthExpired` after disconnecting the
    /// integration if the provider rejects the refresh token.
    pub async fn ensure_fresh(&self, credential: Credential) -> Result<Credential, CredentialError> {
        if !credential.needs_refresh(Utc::now(), self.refresh_window) {
            return Ok(credential);
        }

        let organization_id = credential.organization_id;
        let provider = credential.provider;
        let _guard = self.refresh_locks.lock((organization_id, provider)).await;

        // Whoever held the lock before us may already have refreshed.
        let current = self.get(organization_id, provider).await?;
        if !current.needs_refresh(Utc::now(), self.refresh_window) {
            debug!(org_id = %organization_id, provider = %provider, "Credential refreshed by another caller");
            return Ok(current);
        }

        let adapter = self.adapter(provider)?;
        match adapter.refresh(&current.tokens()).await {
            Ok(tokens) => {
                let refreshed = current.with_tokens(tokens);
                self.repository.save(&refreshed).await?;
                info!(
                    org_id = %organization_id,
                    provider = %provider,
                    expires_at = %refreshed.expires_at,
                    "Access token refreshed"
                );
                Ok(refreshed)
            }
            Err(ProviderError::AuthExpired(message)) => {
                self.repository.deactivate(organization_id, provider).await?;
                warn!(
                    org_id = %organization_id,
                    provider = %provider,
                    reason = %message,
                    "Refresh token rejected, integration disconnected"
                );
                Err(CredentialError::AuthExpired { provider, message })
            }
            Err(e) => {
                warn!(org_id = %organization_id, provider = %provider, error = %e, "Token refresh failed");
                Err(CredentialError::Refresh(e))
            }
        }
    }

    /// Disconnects an integration. The stored row is kept.
    ///
    /// # Errors
    ///
    /// Returns `CredentialError::NotFound` if nothing was stored for the pair.
    pub async fn revoke(
        &self,
        organization_id: OrganizationId,
        provider: Provider,
    ) -> Result<(), CredentialError> {
        let _guard = self.refresh_locks.lock((organization_id, provider)).await;

        if self.repository.deactivate(organization_id, provider).await? {
            info!(org_id = %organization_id, provider = %provider, "Integration disconnected");
            Ok(())
        } else {
            Err(CredentialError::NotFound(provider))
        }
    }
}
