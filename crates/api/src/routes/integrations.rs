//! Integration routes: OAuth connect flow, sync, mappings and history.

use axum::{
    Json, Router,
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Redirect},
    routing::{delete, get, post},
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::{ApiError, AppState, middleware::AuthUser, routes::parse_provider};
use ledgerbridge_core::integration::{AuthGrant, ConnectionState, Provider};
use ledgerbridge_core::ledger::{SyncAttempt, SyncStatus};
use ledgerbridge_core::mapping::CategoryMapping;
use ledgerbridge_core::sync::{BatchResult, DocumentSyncResult, SyncError, SyncOptions};
use ledgerbridge_shared::AppError;
use ledgerbridge_shared::types::{DocumentId, OrganizationId};

/// Creates the integration routes (requires auth middleware to be applied externally).
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/integrations", get(list_integrations))
        .route("/integrations/{provider}", delete(revoke_integration))
        .route("/integrations/{provider}/auth", get(authorization_url))
        .route("/integrations/{provider}/sync", post(sync_documents))
        .route(
            "/integrations/{provider}/mappings",
            get(list_mappings).put(upsert_mappings),
        )
        .route(
            "/integrations/{provider}/documents/{document_id}/attempts",
            get(list_attempts),
        )
}

/// Routes the provider redirects the browser to; they carry no session token.
pub fn public_routes() -> Router<AppState> {
    Router::new().route("/integrations/{provider}/callback", get(oauth_callback))
}

/// Connection status of one provider.
#[derive(Debug, Serialize)]
pub struct IntegrationResponse {
    /// Provider name.
    pub provider: Provider,
    /// True while the integration can be used for syncing.
    pub is_active: bool,
    /// Whether the stored token is connected, expiring or disconnected.
    pub state: ConnectionState,
    /// False when the server has no app credentials for the provider.
    pub configured: bool,
    /// When a document was last synced to the provider.
    pub last_sync_at: Option<DateTime<Utc>>,
}

/// Authorization URL response.
#[derive(Debug, Serialize)]
pub struct AuthorizationUrlResponse {
    /// Provider consent page to send the browser to.
    pub authorization_url: String,
}

/// Query parameters the provider appends to the callback.
#[derive(Debug, Deserialize)]
pub struct CallbackQuery {
    /// Authorization code.
    pub code: Option<String>,
    /// Organization ID we put in the authorization URL.
    pub state: Option<String>,
    /// QuickBooks company ID.
    #[serde(rename = "realmId")]
    pub realm_id: Option<String>,
    /// Set when the user declined consent.
    pub error: Option<String>,
}

/// Request body for a batch sync.
#[derive(Debug, Deserialize)]
pub struct SyncRequest {
    /// Documents to push, in order.
    pub document_ids: Vec<DocumentId>,
    /// Post again even if already synced.
    #[serde(default)]
    pub force_resync: bool,
}

/// Outcome for one document.
#[derive(Debug, Serialize)]
pub struct DocumentResultResponse {
    /// Document ID.
    pub document_id: DocumentId,
    /// Target provider.
    pub provider: Provider,
    /// False only for failures; skipped documents were synced earlier.
    pub success: bool,
    /// `synced`, `skipped` or `failed`.
    pub status: &'static str,
    /// Provider record ID.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub external_id: Option<String>,
    /// Error kind, e.g. `MappingMissingError`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<&'static str>,
    /// Human-readable error.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl From<&DocumentSyncResult> for DocumentResultResponse {
    fn from(result: &DocumentSyncResult) -> Self {
        Self {
            document_id: result.document_id,
            provider: result.provider,
            success: result.status != SyncStatus::Failed,
            status: result.outcome_label(),
            external_id: result.external_id.as_ref().map(|id| id.as_str().to_string()),
            error: result.error.as_ref().map(|e| e.kind().as_str()),
            message: result.error.as_ref().map(SyncError::to_string),
        }
    }
}

/// Batch sync response.
#[derive(Debug, Serialize)]
pub struct SyncResponse {
    /// True when no document failed.
    pub success: bool,
    /// One entry per requested document, in request order.
    pub results: Vec<DocumentResultResponse>,
    /// Documents posted by this call.
    pub synced_count: usize,
    /// Documents that failed.
    pub failed_count: usize,
    /// Documents already synced.
    pub skipped_count: usize,
}

impl From<&BatchResult> for SyncResponse {
    fn from(batch: &BatchResult) -> Self {
        Self {
            success: batch.failed_count == 0,
            results: batch.results.iter().map(Into::into).collect(),
            synced_count: batch.synced_count,
            failed_count: batch.failed_count,
            skipped_count: batch.skipped_count,
        }
    }
}

/// One category mapping.
#[derive(Debug, Serialize, Deserialize)]
pub struct MappingEntry {
    /// Internal category name.
    pub internal_category: String,
    /// Provider account code.
    pub external_account_code: String,
}

/// Request body for replacing mappings.
#[derive(Debug, Deserialize)]
pub struct UpsertMappingsRequest {
    /// Mappings to create or update.
    pub mappings: Vec<MappingEntry>,
}

/// GET `/integrations` - Connection status for every provider.
async fn list_integrations(
    State(state): State<AppState>,
    auth: AuthUser,
) -> Result<Json<Vec<IntegrationResponse>>, ApiError> {
    let org_id = auth.organization_id();
    let credentials = state.orchestrator.credentials();
    let stored = credentials.list(org_id).await?;
    let configured = credentials.configured_providers();
    let now = Utc::now();

    let mut response = Vec::with_capacity(Provider::ALL.len());
    for provider in Provider::ALL {
        let credential = stored.iter().find(|c| c.provider == provider);
        let is_configured = configured.contains(&provider);
        let last_sync_at = state
            .orchestrator
            .ledger()
            .last_success_at(org_id, provider)
            .await?;

        response.push(IntegrationResponse {
            provider,
            is_active: is_configured && credential.is_some_and(|c| c.is_active),
            state: credential.map_or(ConnectionState::Disconnected, |c| {
                c.state(now, credentials.refresh_window())
            }),
            configured: is_configured,
            last_sync_at,
        });
    }

    Ok(Json(response))
}

/// GET `/integrations/{provider}/auth` - URL of the provider consent page.
async fn authorization_url(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(provider): Path<String>,
) -> Result<Json<AuthorizationUrlResponse>, ApiError> {
    let provider = parse_provider(&provider)?;
    let authorization_url = state
        .orchestrator
        .credentials()
        .authorization_url(provider, auth.organization_id())?;

    Ok(Json(AuthorizationUrlResponse { authorization_url }))
}

/// GET `/integrations/{provider}/callback` - Finish the OAuth flow and
/// redirect back to the frontend.
async fn oauth_callback(
    State(state): State<AppState>,
    Path(provider): Path<String>,
    Query(query): Query<CallbackQuery>,
) -> Result<Redirect, ApiError> {
    let provider = parse_provider(&provider)?;
    let frontend = state.sync_config.frontend_url.trim_end_matches('/');
    let redirect = |status: &str| {
        Redirect::to(&format!(
            "{frontend}/integrations?provider={provider}&status={status}"
        ))
    };

    if let Some(error) = &query.error {
        warn!(provider = %provider, error = %error, "Authorization declined");
        return Ok(redirect("error"));
    }

    let org_id = query
        .state
        .as_deref()
        .and_then(|s| s.parse::<OrganizationId>().ok());
    let (Some(org_id), Some(code)) = (org_id, query.code) else {
        warn!(provider = %provider, "Callback without code or valid state");
        return Ok(redirect("error"));
    };

    let mut grant = AuthGrant::new(code);
    if let Some(realm_id) = query.realm_id {
        grant = grant.with_realm(realm_id);
    }

    match state
        .orchestrator
        .credentials()
        .upsert_from_auth_code(org_id, provider, &grant)
        .await
    {
        Ok(_) => Ok(redirect("success")),
        Err(e) => {
            warn!(org_id = %org_id, provider = %provider, error = %e, "Authorization code exchange failed");
            Ok(redirect("error"))
        }
    }
}

/// POST `/integrations/{provider}/sync` - Push documents to the provider.
async fn sync_documents(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(provider): Path<String>,
    Json(payload): Json<SyncRequest>,
) -> Result<Json<SyncResponse>, ApiError> {
    let provider = parse_provider(&provider)?;
    if payload.document_ids.is_empty() {
        return Err(AppError::Validation("document_ids must not be empty".to_string()).into());
    }

    let options = SyncOptions {
        force_resync: payload.force_resync,
    };
    let batch = state
        .orchestrator
        .sync_batch(
            auth.organization_id(),
            provider,
            &payload.document_ids,
            options,
            &state.shutdown.child_token(),
        )
        .await?;

    Ok(Json(SyncResponse::from(&batch)))
}

/// DELETE `/integrations/{provider}` - Disconnect the integration.
async fn revoke_integration(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(provider): Path<String>,
) -> Result<StatusCode, ApiError> {
    let provider = parse_provider(&provider)?;
    state
        .orchestrator
        .credentials()
        .revoke(auth.organization_id(), provider)
        .await?;

    Ok(StatusCode::NO_CONTENT)
}

/// GET `/integrations/{provider}/mappings` - Category mappings for the provider.
async fn list_mappings(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(provider): Path<String>,
) -> Result<Json<Vec<MappingEntry>>, ApiError> {
    let provider = parse_provider(&provider)?;
    let mappings = state.mapper.list(auth.organization_id(), provider).await?;

    Ok(Json(
        mappings
            .into_iter()
            .map(|m| MappingEntry {
                internal_category: m.internal_category,
                external_account_code: m.external_account_code,
            })
            .collect(),
    ))
}

/// PUT `/integrations/{provider}/mappings` - Create or update mappings.
async fn upsert_mappings(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(provider): Path<String>,
    Json(payload): Json<UpsertMappingsRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let provider = parse_provider(&provider)?;
    let org_id = auth.organization_id();

    if let Some(blank) = payload.mappings.iter().find(|m| {
        m.internal_category.trim().is_empty() || m.external_account_code.trim().is_empty()
    }) {
        return Err(AppError::Validation(format!(
            "category and account code are required (got '{}' -> '{}')",
            blank.internal_category, blank.external_account_code
        ))
        .into());
    }

    for entry in &payload.mappings {
        state
            .mapper
            .upsert(&CategoryMapping {
                organization_id: org_id,
                provider,
                internal_category: entry.internal_category.trim().to_string(),
                external_account_code: entry.external_account_code.trim().to_string(),
            })
            .await?;
    }

    info!(org_id = %org_id, provider = %provider, count = payload.mappings.len(), "Category mappings updated");
    list_mappings(State(state), auth, Path(provider.as_str().to_string())).await
}

/// GET `/integrations/{provider}/documents/{document_id}/attempts` - Ledger
/// history for one document, oldest first.
async fn list_attempts(
    State(state): State<AppState>,
    auth: AuthUser,
    Path((provider, document_id)): Path<(String, DocumentId)>,
) -> Result<Json<Vec<SyncAttempt>>, ApiError> {
    let provider = parse_provider(&provider)?;
    state
        .orchestrator
        .documents()
        .find(auth.organization_id(), document_id)
        .await?
        .ok_or(SyncError::DocumentNotFound(document_id))?;

    let history = state.orchestrator.ledger().history(document_id, provider).await?;
    Ok(Json(history))
}
