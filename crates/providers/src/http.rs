//! HTTP client construction and response classification.

use std::time::Duration;

use reqwest::{Client, Response, StatusCode};

use ledgerbridge_core::provider::ProviderError;

/// Longest response body excerpt kept in error messages.
const MAX_BODY_EXCERPT: usize = 500;

/// Builds the shared HTTP client used by every adapter.
pub fn client(timeout: Duration) -> Result<Client, reqwest::Error> {
    Client::builder()
        .timeout(timeout)
        .user_agent(concat!("ledgerbridge/", env!("CARGO_PKG_VERSION")))
        .build()
}

/// Classifies a request that never produced a response.
pub(crate) fn send_error(err: &reqwest::Error) -> ProviderError {
    if err.is_timeout() || err.is_connect() || err.is_request() {
        ProviderError::Transient(err.to_string())
    } else {
        ProviderError::Permanent(err.to_string())
    }
}

/// Classifies a non-success API response.
///
/// 429 and 5xx are transient, 401 means the access token was rejected, any
/// other status is permanent.
pub(crate) fn status_error(status: StatusCode, body: &str) -> ProviderError {
    let message = format!("{status}: {}", excerpt(body));

    if status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
        ProviderError::Transient(message)
    } else if status == StatusCode::UNAUTHORIZED {
        ProviderError::AuthExpired(message)
    } else {
        ProviderError::Permanent(message)
    }
}

/// Reads the body of a failed response and classifies it.
pub(crate) async fn response_error(response: Response) -> ProviderError {
    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    status_error(status, &body)
}

pub(crate) fn excerpt(body: &str) -> &str {
    match body.char_indices().nth(MAX_BODY_EXCERPT) {
        Some((end, _)) => &body[..end],
        None => body,
    }
}
