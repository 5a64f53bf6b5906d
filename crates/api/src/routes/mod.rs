//! API route definitions.

use axum::{Router, middleware};

use crate::{AppState, middleware::auth_middleware};
use ledgerbridge_core::integration::Provider;
use ledgerbridge_shared::AppError;

use crate::ApiError;

pub mod documents;
pub mod health;
pub mod integrations;
pub mod webhooks;

/// Creates the API router; everything except health, the OAuth callback and
/// the webhook requires a session token.
#[allow(clippy::needless_pass_by_value)]
pub fn api_routes_with_state(state: AppState) -> Router<AppState> {
    let protected_routes = Router::new()
        .merge(integrations::routes())
        .merge(documents::routes())
        .layer(middleware::from_fn_with_state(
            state.clone(),
            auth_middleware,
        ));

    Router::new()
        .merge(health::routes())
        .merge(integrations::public_routes())
        .merge(webhooks::routes())
        .merge(protected_routes)
}

/// Parses the `{provider}` path segment.
pub(crate) fn parse_provider(value: &str) -> Result<Provider, ApiError> {
    Provider::parse(value)
        .ok_or_else(|| AppError::NotFound(format!("unknown provider '{value}'")).into())
}
