//! QuickBooks Online adapter.
//!
//! Documents are created as `Purchase` transactions paid in cash from the
//! configured payment account, one `AccountBasedExpenseLineDetail` line per
//! document line.

use async_trait::async_trait;
use reqwest::Client;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use ledgerbridge_core::integration::{AuthGrant, Provider, TokenSet};
use ledgerbridge_core::provider::{ExternalRecordId, PostingRequest, ProviderAdapter, ProviderError};
use ledgerbridge_shared::ProviderConfig;

use crate::http;
use crate::oauth::{OAuthClient, OAuthEndpoints};

/// Intuit authorization page.
pub const AUTHORIZE_URL: &str = "https://appcenter.intuit.com/connect/oauth2";
/// Intuit token endpoint.
pub const TOKEN_URL: &str = "https://oauth.platform.intuit.com/oauth2/v1/tokens/bearer";
/// Production accounting API.
pub const API_BASE_URL: &str = "https://quickbooks.api.intuit.com";
/// Accounting scope.
pub const SCOPES: &str = "com.intuit.quickbooks.accounting";
/// API minor version pinned for payload compatibility.
pub const MINOR_VERSION: u32 = 65;

const PRIVATE_NOTE_LIMIT: usize = 4000;

#[derive(Debug, Serialize, PartialEq)]
struct Ref<'a> {
    value: &'a str,
}

#[derive(Debug, Serialize, PartialEq)]
#[serde(rename_all = "PascalCase")]
struct ExpenseLineDetail<'a> {
    account_ref: Ref<'a>,
    #[serde(skip_serializing_if = "Option::is_none")]
    customer_ref: Option<Ref<'a>>,
}

#[derive(Debug, Serialize, PartialEq)]
#[serde(rename_all = "PascalCase")]
struct PurchaseLine<'a> {
    #[serde(with = "rust_decimal::serde::float")]
    amount: Decimal,
    detail_type: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    description: Option<&'a str>,
    account_based_expense_line_detail: ExpenseLineDetail<'a>,
}

/// `Purchase` request body.
#[derive(Debug, Serialize, PartialEq)]
#[serde(rename_all = "PascalCase")]
pub struct Purchase<'a> {
    payment_type: &'static str,
    account_ref: Ref<'a>,
    #[serde(skip_serializing_if = "Option::is_none")]
    txn_date: Option<String>,
    private_note: String,
    line: Vec<PurchaseLine<'a>>,
}

#[derive(Debug, Deserialize)]
struct PurchaseResponse {
    #[serde(rename = "Purchase")]
    purchase: CreatedPurchase,
}

#[derive(Debug, Deserialize)]
struct CreatedPurchase {
    #[serde(rename = "Id")]
    id: String,
}

/// Shapes a `Purchase` for a document.
///
/// # Errors
///
/// Returns `ProviderError::Permanent` if no payment account is configured.
pub fn build_purchase<'a>(
    request: &PostingRequest<'a>,
    payment_account_id: Option<&'a str>,
) -> Result<Purchase<'a>, ProviderError> {
    let payment_account = payment_account_id.ok_or_else(|| {
        ProviderError::Permanent("QuickBooks payment account is not configured".to_string())
    })?;
    let document = request.document;

    let line = request
        .lines
        .iter()
        .map(|line| PurchaseLine {
            amount: line.amount,
            detail_type: "AccountBasedExpenseLineDetail",
            description: line.description.as_deref(),
            account_based_expense_line_detail: ExpenseLineDetail {
                account_ref: Ref {
                    value: &line.account_code,
                },
                customer_ref: line.project_id.as_deref().map(|value| Ref { value }),
            },
        })
        .collect();

    let mut private_note = format!("{} (document {})", document.vendor_or_default(), document.id);
    if private_note.len() > PRIVATE_NOTE_LIMIT {
        let cut = (0..=PRIVATE_NOTE_LIMIT)
            .rev()
            .find(|&i| private_note.is_char_boundary(i))
            .unwrap_or(0);
        private_note.truncate(cut);
    }

    Ok(Purchase {
        payment_type: "Cash",
        account_ref: Ref {
            value: payment_account,
        },
        txn_date: document
            .document_date
            .map(|date| date.format("%Y-%m-%d").to_string()),
        private_note,
        line,
    })
}

/// Adapter for the QuickBooks Online accounting API.
#[derive(Debug, Clone)]
pub struct QuickBooksAdapter {
    oauth: OAuthClient,
    http: Client,
    api_base_url: String,
    payment_account_id: Option<String>,
}

impl QuickBooksAdapter {
    /// Creates the adapter; URLs set in `config` override the production endpoints.
    #[must_use]
    pub fn new(http: Client, config: &ProviderConfig) -> Self {
        let oauth = OAuthClient::new(
            http.clone(),
            config,
            OAuthEndpoints {
                authorize_url: AUTHORIZE_URL.to_string(),
                token_url: TOKEN_URL.to_string(),
                scopes: SCOPES.to_string(),
            },
        );

        Self {
            oauth,
            http,
            api_base_url: config
                .api_base_url
                .clone()
                .unwrap_or_else(|| API_BASE_URL.to_string())
                .trim_end_matches('/')
                .to_string(),
            payment_account_id: config.payment_account_id.clone(),
        }
    }
}

#[async_trait]
impl ProviderAdapter for QuickBooksAdapter {
    fn provider(&self) -> Provider {
        Provider::QuickBooks
    }

    fn authorization_url(&self, state: &str) -> Result<String, ProviderError> {
        self.oauth.authorization_url(state)
    }

    async fn exchange_auth_code(&self, grant: &AuthGrant) -> Result<TokenSet, ProviderError> {
        let realm_id = grant.realm_id.clone().ok_or_else(|| {
            ProviderError::AuthExchange("callback is missing the realmId parameter".to_string())
        })?;

        let response = self.oauth.exchange_code(&grant.code).await?;
        info!(realm_id = %realm_id, "QuickBooks company authorized");
        Ok(response.into_token_set(None, Some(realm_id)))
    }

    async fn refresh(&self, tokens: &TokenSet) -> Result<TokenSet, ProviderError> {
        let response = self.oauth.refresh(&tokens.refresh_token).await?;
        Ok(response.into_token_set(
            Some(&tokens.refresh_token),
            tokens.external_tenant_id.clone(),
        ))
    }

    async fn post_expense_or_bill(
        &self,
        request: &PostingRequest<'_>,
    ) -> Result<ExternalRecordId, ProviderError> {
        let realm_id = request.credential.external_tenant_id.as_deref().ok_or_else(|| {
            ProviderError::Permanent("QuickBooks credential has no realm id".to_string())
        })?;
        let purchase = build_purchase(request, self.payment_account_id.as_deref())?;

        let url = format!("{}/v3/company/{realm_id}/purchase", self.api_base_url);
        let minor_version = MINOR_VERSION.to_string();
        let response = self
            .http
            .post(&url)
            .query(&[
                ("minorversion", minor_version.as_str()),
                ("requestid", request.idempotency_key),
            ])
            .bearer_auth(&request.credential.access_token)
            .header(reqwest::header::ACCEPT, "application/json")
            .json(&purchase)
            .send()
            .await
            .map_err(|e| http::send_error(&e))?;

        if !response.status().is_success() {
            return Err(http::response_error(response).await);
        }

        let created: PurchaseResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::Permanent(format!("unexpected Purchase response: {e}")))?;

        debug!(
            document_id = %request.document.id,
            purchase_id = %created.purchase.id,
            "QuickBooks purchase created"
        );
        Ok(ExternalRecordId::new(created.purchase.id))
    }
}
