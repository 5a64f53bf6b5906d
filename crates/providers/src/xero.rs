//! Xero adapter.
//!
//! Documents are created as draft `ACCPAY` invoices (bills) with
//! tax-inclusive line amounts. The tenant is discovered from the connections
//! endpoint right after the code exchange.

use async_trait::async_trait;
use reqwest::Client;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use ledgerbridge_core::integration::{AuthGrant, Provider, TokenSet};
use ledgerbridge_core::provider::{ExternalRecordId, PostingRequest, ProviderAdapter, ProviderError};
use ledgerbridge_shared::ProviderConfig;

use crate::http;
use crate::oauth::{OAuthClient, OAuthEndpoints};

/// Xero authorization page.
pub const AUTHORIZE_URL: &str = "https://login.xero.com/identity/connect/authorize";
/// Xero token endpoint.
pub const TOKEN_URL: &str = "https://identity.xero.com/connect/token";
/// API host; also serves `/connections`.
pub const API_BASE_URL: &str = "https://api.xero.com";
/// Scopes needed to create bills.
pub const SCOPES: &str = "offline_access accounting.transactions accounting.settings";

#[derive(Debug, Serialize, PartialEq)]
#[serde(rename_all = "PascalCase")]
struct Contact<'a> {
    name: &'a str,
}

#[derive(Debug, Serialize, PartialEq)]
#[serde(rename_all = "PascalCase")]
struct InvoiceLine<'a> {
    description: &'a str,
    #[serde(with = "rust_decimal::serde::float")]
    quantity: Decimal,
    #[serde(with = "rust_decimal::serde::float")]
    unit_amount: Decimal,
    account_code: &'a str,
}

/// Bill request body.
#[derive(Debug, Serialize, PartialEq)]
#[serde(rename_all = "PascalCase")]
pub struct Invoice<'a> {
    #[serde(rename = "Type")]
    kind: &'static str,
    contact: Contact<'a>,
    #[serde(skip_serializing_if = "Option::is_none")]
    date: Option<String>,
    line_items: Vec<InvoiceLine<'a>>,
    reference: String,
    status: &'static str,
    line_amount_types: &'static str,
}

#[derive(Debug, Serialize)]
struct InvoiceEnvelope<'a> {
    #[serde(rename = "Invoices")]
    invoices: [Invoice<'a>; 1],
}

#[derive(Debug, Deserialize)]
struct InvoicesResponse {
    #[serde(rename = "Invoices")]
    invoices: Vec<CreatedInvoice>,
}

#[derive(Debug, Deserialize)]
struct CreatedInvoice {
    #[serde(rename = "InvoiceID")]
    invoice_id: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Connection {
    tenant_id: String,
    #[serde(default)]
    tenant_type: Option<String>,
}

/// Shapes a draft bill for a document.
#[must_use]
pub fn build_invoice<'a>(request: &PostingRequest<'a>) -> Invoice<'a> {
    let document = request.document;
    let vendor = document.vendor_or_default();

    Invoice {
        kind: "ACCPAY",
        contact: Contact { name: vendor },
        date: document
            .document_date
            .map(|date| date.format("%Y-%m-%d").to_string()),
        line_items: request
            .lines
            .iter()
            .map(|line| InvoiceLine {
                description: line.description.as_deref().unwrap_or(&line.category),
                quantity: Decimal::ONE,
                unit_amount: line.amount,
                account_code: &line.account_code,
            })
            .collect(),
        reference: document.id.to_string(),
        status: "DRAFT",
        line_amount_types: "Inclusive",
    }
}

/// Adapter for the Xero accounting API.
#[derive(Debug, Clone)]
pub struct XeroAdapter {
    oauth: OAuthClient,
    http: Client,
    api_base_url: String,
}

impl XeroAdapter {
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
        }
    }

    /// Finds the organisation tenant the user just authorized.
    async fn tenant_id(&self, access_token: &str) -> Result<String, ProviderError> {
        let response = self
            .http
            .get(format!("{}/connections", self.api_base_url))
            .bearer_auth(access_token)
            .header(reqwest::header::ACCEPT, "application/json")
            .send()
            .await
            .map_err(|e| http::send_error(&e))?;

        if !response.status().is_success() {
            let err = http::response_error(response).await;
            return Err(ProviderError::AuthExchange(format!(
                "could not list Xero connections: {err}"
            )));
        }

        let connections: Vec<Connection> = response
            .json()
            .await
            .map_err(|e| ProviderError::AuthExchange(format!("unexpected connections response: {e}")))?;

        if connections.len() > 1 {
            warn!(count = connections.len(), "Several Xero tenants authorized, using the first organisation");
        }

        connections
            .into_iter()
            .find(|c| c.tenant_type.as_deref().is_none_or(|t| t == "ORGANISATION"))
            .map(|c| c.tenant_id)
            .ok_or_else(|| ProviderError::AuthExchange("no Xero organisation was authorized".to_string()))
    }
}

#[async_trait]
impl ProviderAdapter for XeroAdapter {
    fn provider(&self) -> Provider {
        Provider::Xero
    }

    fn authorization_url(&self, state: &str) -> Result<String, ProviderError> {
        self.oauth.authorization_url(state)
    }

    async fn exchange_auth_code(&self, grant: &AuthGrant) -> Result<TokenSet, ProviderError> {
        let response = self.oauth.exchange_code(&grant.code).await?;
        let tenant_id = self.tenant_id(&response.access_token).await?;
        info!(tenant_id = %tenant_id, "Xero organisation authorized");
        Ok(response.into_token_set(None, Some(tenant_id)))
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
        let tenant_id = request.credential.external_tenant_id.as_deref().ok_or_else(|| {
            ProviderError::Permanent("Xero credential has no tenant id".to_string())
        })?;
        let envelope = InvoiceEnvelope {
            invoices: [build_invoice(request)],
        };

        let response = self
            .http
            .post(format!("{}/api.xro/2.0/Invoices", self.api_base_url))
            .bearer_auth(&request.credential.access_token)
            .header("xero-tenant-id", tenant_id)
            .header("Idempotency-Key", request.idempotency_key)
            .header(reqwest::header::ACCEPT, "application/json")
            .json(&envelope)
            .send()
            .await
            .map_err(|e| http::send_error(&e))?;

        if !response.status().is_success() {
            return Err(http::response_error(response).await);
        }

        let created: InvoicesResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::Permanent(format!("unexpected Invoices response: {e}")))?;
        let invoice = created
            .invoices
            .into_iter()
            .next()
            .ok_or_else(|| ProviderError::Permanent("Xero returned no invoice".to_string()))?;

        debug!(
            document_id = %request.document.id,
            invoice_id = %invoice.invoice_id,
            "Xero bill created"
        );
        Ok(ExternalRecordId::new(invoice.invoice_id))
    }
}
