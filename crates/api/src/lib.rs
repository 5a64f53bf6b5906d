//! HTTP API layer with Axum routes and middleware.
//!
//! This crate provides:
//! - REST API routes for integrations, documents and webhooks
//! - Authentication middleware
//! - Error to response mapping

pub mod error;
pub mod middleware;
pub mod routes;

use std::sync::Arc;

use axum::Router;
use tokio_util::sync::CancellationToken;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use ledgerbridge_core::mapping::CategoryMapper;
use ledgerbridge_core::sync::SyncOrchestrator;
use ledgerbridge_core::webhook::WebhookDispatcher;
use ledgerbridge_shared::{JwtService, SyncConfig};

pub use error::ApiError;

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    /// Sync engine; also owns the credential store, ledger and documents.
    pub orchestrator: Arc<SyncOrchestrator>,
    /// Fan-out used by the webhook and bulk reprocessing.
    pub dispatcher: WebhookDispatcher,
    /// Category mappings, sharing its cache with the orchestrator.
    pub mapper: CategoryMapper,
    /// JWT service for session verification.
    pub jwt_service: Arc<JwtService>,
    /// Frontend URL, webhook secret and sync tuning.
    pub sync_config: Arc<SyncConfig>,
    /// Cancelled when the server shuts down; requests use child tokens.
    pub shutdown: CancellationToken,
}

impl AppState {
    /// Builds the state around an orchestrator.
    #[must_use]
    pub fn new(
        orchestrator: Arc<SyncOrchestrator>,
        mapper: CategoryMapper,
        jwt_service: Arc<JwtService>,
        sync_config: SyncConfig,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            dispatcher: WebhookDispatcher::new(orchestrator.clone()),
            orchestrator,
            mapper,
            jwt_service,
            sync_config: Arc::new(sync_config),
            shutdown,
        }
    }
}

/// Creates the main application router.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .nest("/api/v1", routes::api_routes_with_state(state.clone()))
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(state)
}
