//! Mapping of domain errors onto JSON error responses.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use tracing::error;

use ledgerbridge_core::PersistenceError;
use ledgerbridge_core::integration::CredentialError;
use ledgerbridge_core::mapping::MappingError;
use ledgerbridge_core::sync::SyncError;
use ledgerbridge_shared::AppError;

/// Handler error rendered as `{error, message}`.
#[derive(Debug)]
pub struct ApiError(pub AppError);

impl From<AppError> for ApiError {
    fn from(err: AppError) -> Self {
        Self(err)
    }
}

impl From<SyncError> for ApiError {
    fn from(err: SyncError) -> Self {
        let message = err.to_string();
        Self(match err {
            SyncError::AuthExchange(_) | SyncError::AuthExpired(_) => {
                AppError::Unauthorized(message)
            }
            SyncError::IntegrationNotFound(_) | SyncError::DocumentNotFound(_) => {
                AppError::NotFound(message)
            }
            SyncError::MappingMissing { .. } => AppError::Validation(message),
            SyncError::TransientProvider(_) | SyncError::PermanentProvider(_) => {
                AppError::ExternalService(message)
            }
            SyncError::Cancelled => AppError::Unavailable(message),
            SyncError::Persistence(_) => AppError::Database(message),
        })
    }
}

impl From<CredentialError> for ApiError {
    fn from(err: CredentialError) -> Self {
        SyncError::from(err).into()
    }
}

impl From<MappingError> for ApiError {
    fn from(err: MappingError) -> Self {
        SyncError::from(err).into()
    }
}

impl From<PersistenceError> for ApiError {
    fn from(err: PersistenceError) -> Self {
        SyncError::from(err).into()
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status =
            StatusCode::from_u16(self.0.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);

        let message = if self.0.is_client_visible() {
            self.0.to_string()
        } else {
            error!(error = %self.0, "Request failed");
            "An error occurred".to_string()
        };

        (
            status,
            Json(json!({
                "error": self.0.error_code(),
                "message": message
            })),
        )
            .into_response()
    }
}
