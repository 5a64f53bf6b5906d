//! Document bulk actions.

use axum::{Json, Router, extract::State, routing::post};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::{ApiError, AppState, middleware::AuthUser, routes::integrations::DocumentResultResponse};
use ledgerbridge_core::document::BulkUpdate;
use ledgerbridge_core::sync::SyncOptions;
use ledgerbridge_shared::AppError;
use ledgerbridge_shared::types::DocumentId;

/// Creates the document routes (requires auth middleware to be applied externally).
pub fn routes() -> Router<AppState> {
    Router::new().route("/documents/bulk-actions", post(bulk_action))
}

/// Supported bulk actions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BulkAction {
    /// Set the category of every line.
    Categorize,
    /// Set or clear the project of every line.
    AssignProject,
    /// Mark as verified.
    MarkVerified,
    /// Soft-delete.
    Delete,
    /// Re-run the sync fan-out.
    Reprocess,
}

/// Action parameters; which ones apply depends on the action.
#[derive(Debug, Default, Deserialize)]
pub struct BulkParameters {
    /// Category for `categorize`.
    pub category: Option<String>,
    /// Project for `assign_project`; absent clears it.
    pub project_id: Option<String>,
    /// Post again for `reprocess` even if already synced.
    #[serde(default)]
    pub force_resync: bool,
}

/// Request body for a bulk action.
#[derive(Debug, Deserialize)]
pub struct BulkActionRequest {
    /// Action to apply.
    pub action: BulkAction,
    /// Target documents.
    pub document_ids: Vec<DocumentId>,
    /// Action parameters.
    #[serde(default)]
    pub parameters: BulkParameters,
}

/// Reprocessing outcome for one document.
#[derive(Debug, Serialize)]
pub struct ReprocessResult {
    /// Document ID.
    pub document_id: DocumentId,
    /// False if the document could not be dispatched at all.
    pub success: bool,
    /// Consolidated sync summary.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    /// Per-provider outcomes.
    pub results: Vec<DocumentResultResponse>,
    /// Why dispatching failed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Bulk action response.
#[derive(Debug, Serialize)]
pub struct BulkActionResponse {
    /// Action applied.
    pub action: BulkAction,
    /// Documents changed (or dispatched, for `reprocess`).
    pub updated_count: u64,
    /// Per-document outcomes, only for `reprocess`.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub results: Vec<ReprocessResult>,
}

/// POST `/documents/bulk-actions` - Apply one action to many documents.
async fn bulk_action(
    State(state): State<AppState>,
    auth: AuthUser,
    Json(payload): Json<BulkActionRequest>,
) -> Result<Json<BulkActionResponse>, ApiError> {
    if payload.document_ids.is_empty() {
        return Err(AppError::Validation("document_ids must not be empty".to_string()).into());
    }

    let org_id = auth.organization_id();
    let update = match payload.action {
        BulkAction::Categorize => {
            let category = payload
                .parameters
                .category
                .as_deref()
                .map(str::trim)
                .filter(|c| !c.is_empty())
                .ok_or_else(|| {
                    ApiError::from(AppError::Validation(
                        "parameters.category is required".to_string(),
                    ))
                })?;
            BulkUpdate::Categorize {
                category: category.to_string(),
            }
        }
        BulkAction::AssignProject => BulkUpdate::AssignProject {
            project_id: payload.parameters.project_id.clone(),
        },
        BulkAction::MarkVerified => BulkUpdate::MarkVerified,
        BulkAction::Delete => BulkUpdate::Delete,
        BulkAction::Reprocess => {
            return reprocess(&state, &auth, &payload).await.map(Json);
        }
    };

    let updated_count = state
        .orchestrator
        .documents()
        .apply_bulk(org_id, &payload.document_ids, &update)
        .await?;

    info!(
        org_id = %org_id,
        action = ?payload.action,
        requested = payload.document_ids.len(),
        updated = updated_count,
        "Bulk action applied"
    );

    Ok(Json(BulkActionResponse {
        action: payload.action,
        updated_count,
        results: Vec::new(),
    }))
}

async fn reprocess(
    state: &AppState,
    auth: &AuthUser,
    payload: &BulkActionRequest,
) -> Result<BulkActionResponse, ApiError> {
    let options = SyncOptions {
        force_resync: payload.parameters.force_resync,
    };
    let reports = state
        .dispatcher
        .bulk_reprocess(
            auth.organization_id(),
            &payload.document_ids,
            options,
            &state.shutdown.child_token(),
        )
        .await;

    let results: Vec<ReprocessResult> = payload
        .document_ids
        .iter()
        .zip(reports)
        .map(|(&document_id, report)| match report {
            Ok(report) => ReprocessResult {
                document_id,
                success: true,
                summary: Some(report.summary),
                results: report.results.iter().map(Into::into).collect(),
                error: None,
            },
            Err(e) => ReprocessResult {
                document_id,
                success: false,
                summary: None,
                results: Vec::new(),
                error: Some(e.to_string()),
            },
        })
        .collect();

    Ok(BulkActionResponse {
        action: BulkAction::Reprocess,
        updated_count: results.iter().filter(|r| r.success).count() as u64,
        results,
    })
}
