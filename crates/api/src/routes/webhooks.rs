//! Inbound webhook from the document processing pipeline.

use axum::{
    Json, Router,
    extract::State,
    http::HeaderMap,
    routing::post,
};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::{ApiError, AppState, routes::integrations::DocumentResultResponse};
use ledgerbridge_core::sync::SyncOptions;
use ledgerbridge_shared::AppError;
use ledgerbridge_shared::types::{DocumentId, OrganizationId};

/// Header carrying the shared webhook secret.
pub const SECRET_HEADER: &str = "x-webhook-secret";

/// Creates the webhook routes.
pub fn routes() -> Router<AppState> {
    Router::new().route("/webhooks/document-processed", post(document_processed))
}

/// Webhook payload.
#[derive(Debug, Deserialize)]
pub struct DocumentProcessedEvent {
    /// Finished document.
    pub document_id: DocumentId,
    /// Its organization.
    pub organization_id: OrganizationId,
}

/// Webhook response.
#[derive(Debug, Serialize)]
pub struct DocumentProcessedResponse {
    /// Document dispatched.
    pub document_id: DocumentId,
    /// Consolidated sync summary, empty without active integrations.
    pub summary: String,
    /// Per-provider outcomes.
    pub results: Vec<DocumentResultResponse>,
}

fn verify_secret(expected: Option<&str>, headers: &HeaderMap) -> Result<(), ApiError> {
    let Some(expected) = expected else {
        return Ok(());
    };

    let provided = headers.get(SECRET_HEADER).and_then(|v| v.to_str().ok());
    if provided == Some(expected) {
        Ok(())
    } else {
        warn!("Rejected webhook with missing or wrong secret");
        Err(AppError::Unauthorized("invalid webhook secret".to_string()).into())
    }
}

/// POST `/webhooks/document-processed` - Sync a finished document to every
/// active integration.
async fn document_processed(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(event): Json<DocumentProcessedEvent>,
) -> Result<Json<DocumentProcessedResponse>, ApiError> {
    verify_secret(state.sync_config.webhook_secret.as_deref(), &headers)?;

    let report = state
        .dispatcher
        .dispatch(
            event.organization_id,
            event.document_id,
            SyncOptions::default(),
            &state.shutdown.child_token(),
        )
        .await?;

    info!(
        org_id = %event.organization_id,
        document_id = %event.document_id,
        summary = %report.summary,
        "Document processed webhook handled"
    );

    Ok(Json(DocumentProcessedResponse {
        document_id: report.document_id,
        results: report.results.iter().map(Into::into).collect(),
        summary: report.summary,
    }))
}
