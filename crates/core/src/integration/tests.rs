use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use futures::future::join_all;

use ledgerbridge_shared::types::OrganizationId;

use super::*;
use crate::memory::MemoryCredentials;
use crate::provider::{AdapterRegistry, ProviderError};
use crate::testing::{ScriptedAdapter, credential};

fn store_with(adapter: Arc<ScriptedAdapter>) -> (CredentialStore, Arc<MemoryCredentials>) {
    let repo = Arc::new(MemoryCredentials::new());
    let store = CredentialStore::new(repo.clone(), AdapterRegistry::new().with(adapter));
    (store, repo)
}

#[tokio::test]
async fn test_fresh_credential_is_not_refreshed() {
    let adapter = Arc::new(ScriptedAdapter::new(Provider::QuickBooks));
    let (store, repo) = store_with(adapter.clone());
    let org = OrganizationId::new();
    let stored = credential(org, Provider::QuickBooks, chrono::Duration::hours(1));
    repo.save(&stored).await.unwrap();

    let fresh = store.fresh(org, Provider::QuickBooks).await.unwrap();

    assert_eq!(fresh.access_token, "access-initial");
    assert_eq!(adapter.refresh_calls(), 0);
}

#[tokio::test]
async fn test_expiring_credential_is_refreshed_and_persisted() {
    let adapter = Arc::new(ScriptedAdapter::new(Provider::QuickBooks));
    let (store, repo) = store_with(adapter.clone());
    let org = OrganizationId::new();
    repo.save(&credential(org, Provider::QuickBooks, chrono::Duration::minutes(2)))
        .await
        .unwrap();

    let fresh = store.fresh(org, Provider::QuickBooks).await.unwrap();

    assert_eq!(fresh.access_token, "access-refreshed-1");
    assert_eq!(fresh.external_tenant_id.as_deref(), Some("tenant-1"));
    let persisted = repo.find(org, Provider::QuickBooks).await.unwrap().unwrap();
    assert_eq!(persisted.access_token, "access-refreshed-1");
    assert!(persisted.expires_at > Utc::now() + chrono::Duration::minutes(30));
}

#[tokio::test]
async fn test_concurrent_refreshes_are_single_flight() {
    let adapter = Arc::new(
        ScriptedAdapter::new(Provider::Xero).with_refresh_delay(Duration::from_millis(50)),
    );
    let (store, repo) = store_with(adapter.clone());
    let store = Arc::new(store);
    let org = OrganizationId::new();
    let expiring = credential(org, Provider::Xero, chrono::Duration::seconds(10));
    repo.save(&expiring).await.unwrap();

    let results = join_all((0..10).map(|_| {
        let store = store.clone();
        let expiring = expiring.clone();
        tokio::spawn(async move { store.ensure_fresh(expiring).await })
    }))
    .await;

    assert_eq!(adapter.refresh_calls(), 1);
    for result in results {
        let credential = result.unwrap().unwrap();
        assert_eq!(credential.access_token, "access-refreshed-1");
    }
}

#[tokio::test]
async fn test_rejected_refresh_token_disconnects() {
    let adapter = Arc::new(
        ScriptedAdapter::new(Provider::QuickBooks)
            .fail_refresh(ProviderError::AuthExpired("invalid_grant".to_string())),
    );
    let (store, repo) = store_with(adapter);
    let org = OrganizationId::new();
    repo.save(&credential(org, Provider::QuickBooks, chrono::Duration::seconds(-5)))
        .await
        .unwrap();

    let err = store.fresh(org, Provider::QuickBooks).await.unwrap_err();
    assert!(matches!(err, CredentialError::AuthExpired { provider: Provider::QuickBooks, .. }));

    let stored = repo.find(org, Provider::QuickBooks).await.unwrap().unwrap();
    assert!(!stored.is_active);
    assert!(matches!(
        store.get(org, Provider::QuickBooks).await,
        Err(CredentialError::NotFound(Provider::QuickBooks))
    ));
}

#[tokio::test]
async fn test_transient_refresh_failure_keeps_integration_active() {
    let adapter = Arc::new(
        ScriptedAdapter::new(Provider::QuickBooks)
            .fail_refresh(ProviderError::Transient("503".to_string())),
    );
    let (store, repo) = store_with(adapter);
    let org = OrganizationId::new();
    repo.save(&credential(org, Provider::QuickBooks, chrono::Duration::seconds(30)))
        .await
        .unwrap();

    let err = store.fresh(org, Provider::QuickBooks).await.unwrap_err();
    assert!(matches!(err, CredentialError::Refresh(ProviderError::Transient(_))));
    assert!(repo.find(org, Provider::QuickBooks).await.unwrap().unwrap().is_active);
}

#[tokio::test]
async fn test_upsert_from_auth_code_reconnects_same_pair() {
    let adapter = Arc::new(ScriptedAdapter::new(Provider::QuickBooks));
    let (store, repo) = store_with(adapter);
    let org = OrganizationId::new();

    store
        .upsert_from_auth_code(org, Provider::QuickBooks, &AuthGrant::new("first").with_realm("r1"))
        .await
        .unwrap();
    store.revoke(org, Provider::QuickBooks).await.unwrap();
    let second = store
        .upsert_from_auth_code(org, Provider::QuickBooks, &AuthGrant::new("second").with_realm("r1"))
        .await
        .unwrap();

    assert!(second.is_active);
    assert_eq!(second.external_tenant_id.as_deref(), Some("r1"));
    let all = repo.list(org).await.unwrap();
    assert_eq!(all.len(), 1);
    assert_eq!(all[0].access_token, "access-second");
}

#[tokio::test]
async fn test_invalid_auth_code_is_auth_exchange_error() {
    let (store, repo) = store_with(Arc::new(ScriptedAdapter::new(Provider::Xero)));
    let org = OrganizationId::new();

    let err = store
        .upsert_from_auth_code(org, Provider::Xero, &AuthGrant::new("bad-code"))
        .await
        .unwrap_err();

    assert!(matches!(err, CredentialError::AuthExchange { provider: Provider::Xero, .. }));
    assert!(repo.find(org, Provider::Xero).await.unwrap().is_none());
}

#[tokio::test]
async fn test_unconfigured_provider() {
    let (store, _) = store_with(Arc::new(ScriptedAdapter::new(Provider::Xero)));

    let err = store
        .upsert_from_auth_code(OrganizationId::new(), Provider::QuickBooks, &AuthGrant::new("c"))
        .await
        .unwrap_err();
    assert!(matches!(err, CredentialError::ProviderNotConfigured(Provider::QuickBooks)));
}

#[tokio::test]
async fn test_revoke_keeps_row_and_unknown_pair_is_not_found() {
    let (store, repo) = store_with(Arc::new(ScriptedAdapter::new(Provider::Xero)));
    let org = OrganizationId::new();
    repo.save(&credential(org, Provider::Xero, chrono::Duration::hours(1)))
        .await
        .unwrap();

    store.revoke(org, Provider::Xero).await.unwrap();
    assert!(repo.find(org, Provider::Xero).await.unwrap().is_some());
    assert!(store.list_active(org).await.unwrap().is_empty());
    assert_eq!(store.list(org).await.unwrap().len(), 1);

    assert!(matches!(
        store.revoke(OrganizationId::new(), Provider::Xero).await,
        Err(CredentialError::NotFound(Provider::Xero))
    ));
}

#[tokio::test]
async fn test_list_active_skips_unconfigured_providers() {
    let (store, repo) = store_with(Arc::new(ScriptedAdapter::new(Provider::Xero)));
    let org = OrganizationId::new();
    repo.save(&credential(org, Provider::Xero, chrono::Duration::hours(1))).await.unwrap();
    repo.save(&credential(org, Provider::QuickBooks, chrono::Duration::hours(1))).await.unwrap();

    let active = store.list_active(org).await.unwrap();
    assert_eq!(active.len(), 1);
    assert_eq!(active[0].provider, Provider::Xero);
}

#[test]
fn test_authorization_url_carries_org_state() {
    let (store, _) = store_with(Arc::new(ScriptedAdapter::new(Provider::Xero)));
    let org = OrganizationId::new();

    let url = store.authorization_url(Provider::Xero, org).unwrap();
    assert!(url.ends_with(&format!("state={org}")));
}

#[test]
fn test_configured_providers_follow_registry() {
    let (store, _) = store_with(Arc::new(ScriptedAdapter::new(Provider::Xero)));

    assert_eq!(store.configured_providers(), vec![Provider::Xero]);
}
