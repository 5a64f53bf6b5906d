//! Test doubles shared by the core unit tests.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use rust_decimal::Decimal;

use ledgerbridge_shared::types::{DocumentId, OrganizationId};

use crate::document::{Document, DocumentStatus, LineItem};
use crate::integration::{AuthGrant, Credential, Provider, TokenSet};
use crate::provider::{ExternalRecordId, PostingRequest, ProviderAdapter, ProviderError};

/// Adapter whose outcomes are scripted per call.
pub struct ScriptedAdapter {
    provider: Provider,
    posts: Mutex<VecDeque<Result<ExternalRecordId, ProviderError>>>,
    refresh_error: Mutex<Option<ProviderError>>,
    post_delay: Duration,
    refresh_delay: Duration,
    post_calls: AtomicUsize,
    refresh_calls: AtomicUsize,
    keys: Mutex<Vec<String>>,
}

impl ScriptedAdapter {
    pub fn new(provider: Provider) -> Self {
        Self {
            provider,
            posts: Mutex::new(VecDeque::new()),
            refresh_error: Mutex::new(None),
            post_delay: Duration::ZERO,
            refresh_delay: Duration::ZERO,
            post_calls: AtomicUsize::new(0),
            refresh_calls: AtomicUsize::new(0),
            keys: Mutex::new(Vec::new()),
        }
    }

    /// Queues outcomes for the next posts; once drained, posts succeed.
    pub fn script(self, outcomes: Vec<Result<ExternalRecordId, ProviderError>>) -> Self {
        *self.posts.lock().unwrap() = outcomes.into();
        self
    }

    pub fn with_post_delay(mut self, delay: Duration) -> Self {
        self.post_delay = delay;
        self
    }

    pub fn with_refresh_delay(mut self, delay: Duration) -> Self {
        self.refresh_delay = delay;
        self
    }

    pub fn fail_refresh(self, error: ProviderError) -> Self {
        *self.refresh_error.lock().unwrap() = Some(error);
        self
    }

    pub fn post_calls(&self) -> usize {
        self.post_calls.load(Ordering::SeqCst)
    }

    pub fn refresh_calls(&self) -> usize {
        self.refresh_calls.load(Ordering::SeqCst)
    }

    /// Idempotency keys seen, in call order.
    pub fn keys(&self) -> Vec<String> {
        self.keys.lock().unwrap().clone()
    }
}

#[async_trait]
impl ProviderAdapter for ScriptedAdapter {
    fn provider(&self) -> Provider {
        self.provider
    }

    fn authorization_url(&self, state: &str) -> Result<String, ProviderError> {
        Ok(format!("https://auth.example.test/{}?state={state}", self.provider))
    }

    async fn exchange_auth_code(&self, grant: &AuthGrant) -> Result<TokenSet, ProviderError> {
        if grant.code == "bad-code" {
            return Err(ProviderError::AuthExchange("invalid_grant".to_string()));
        }
        Ok(TokenSet {
            access_token: format!("access-{}", grant.code),
            refresh_token: format!("refresh-{}", grant.code),
            token_type: "Bearer".to_string(),
            expires_at: Utc::now() + chrono::Duration::hours(1),
            external_tenant_id: grant.realm_id.clone(),
        })
    }

    async fn refresh(&self, tokens: &TokenSet) -> Result<TokenSet, ProviderError> {
        let call = self.refresh_calls.fetch_add(1, Ordering::SeqCst) + 1;
        tokio::time::sleep(self.refresh_delay).await;

        if let Some(error) = self.refresh_error.lock().unwrap().clone() {
            return Err(error);
        }
        Ok(TokenSet {
            access_token: format!("access-refreshed-{call}"),
            refresh_token: format!("refresh-refreshed-{call}"),
            token_type: tokens.token_type.clone(),
            expires_at: Utc::now() + chrono::Duration::hours(1),
            external_tenant_id: None,
        })
    }

    async fn post_expense_or_bill(
        &self,
        request: &PostingRequest<'_>,
    ) -> Result<ExternalRecordId, ProviderError> {
        let call = self.post_calls.fetch_add(1, Ordering::SeqCst) + 1;
        self.keys.lock().unwrap().push(request.idempotency_key.to_string());
        tokio::time::sleep(self.post_delay).await;

        let scripted = self.posts.lock().unwrap().pop_front();
        scripted.unwrap_or_else(|| Ok(ExternalRecordId::new(format!("ext-{call}"))))
    }
}

/// Active credential expiring `expires_in` from now.
pub fn credential(
    organization_id: OrganizationId,
    provider: Provider,
    expires_in: chrono::Duration,
) -> Credential {
    Credential::connect(
        organization_id,
        provider,
        TokenSet {
            access_token: "access-initial".to_string(),
            refresh_token: "refresh-initial".to_string(),
            token_type: "Bearer".to_string(),
            expires_at: Utc::now() + expires_in,
            external_tenant_id: Some("tenant-1".to_string()),
        },
    )
}

/// Completed document with one line per category.
pub fn document(organization_id: OrganizationId, categories: &[&str]) -> Document {
    let line_items: Vec<LineItem> = categories
        .iter()
        .map(|category| LineItem {
            amount: Decimal::new(2500, 2),
            category_name: Some((*category).to_string()),
            project_id: None,
            description: None,
        })
        .collect();

    Document {
        id: DocumentId::new(),
        organization_id,
        vendor_name: Some("Acme Supplies".to_string()),
        document_date: None,
        total_amount: line_items.iter().map(|l| l.amount).sum(),
        tax_amount: None,
        line_items,
        notes: None,
        external_sync_notes: None,
        status: DocumentStatus::Completed,
    }
}
