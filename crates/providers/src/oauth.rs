//! OAuth2 authorization-code flow against a provider's identity service.

use std::fmt;

use chrono::{Duration, Utc};
use reqwest::{Client, StatusCode, Url};
use serde::Deserialize;
use tracing::debug;

use ledgerbridge_core::integration::TokenSet;
use ledgerbridge_core::provider::ProviderError;
use ledgerbridge_shared::ProviderConfig;

use crate::http;

/// Identity endpoints and scopes of a provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OAuthEndpoints {
    /// Page the user is sent to.
    pub authorize_url: String,
    /// Token endpoint for code exchange and refresh.
    pub token_url: String,
    /// Space-separated scopes.
    pub scopes: String,
}

/// Token endpoint response.
#[derive(Debug, Clone, Deserialize)]
pub struct TokenResponse {
    /// Bearer token.
    pub access_token: String,
    /// Next refresh token; providers may omit it on refresh.
    pub refresh_token: Option<String>,
    /// Token type.
    pub token_type: Option<String>,
    /// Access token lifetime in seconds.
    pub expires_in: i64,
}

impl TokenResponse {
    /// Converts into a `TokenSet`, keeping `previous_refresh` when no new
    /// refresh token was issued.
    #[must_use]
    pub fn into_token_set(self, previous_refresh: Option<&str>, tenant: Option<String>) -> TokenSet {
        TokenSet {
            refresh_token: self
                .refresh_token
                .or_else(|| previous_refresh.map(str::to_string))
                .unwrap_or_default(),
            access_token: self.access_token,
            token_type: self.token_type.unwrap_or_else(|| "Bearer".to_string()),
            expires_at: Utc::now() + Duration::seconds(self.expires_in),
            external_tenant_id: tenant,
        }
    }
}

#[derive(Debug, Deserialize)]
struct TokenErrorBody {
    error: String,
    #[serde(default)]
    error_description: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Grant {
    AuthorizationCode,
    RefreshToken,
}

/// OAuth2 client using HTTP Basic client authentication and form-encoded grants.
#[derive(Clone)]
pub struct OAuthClient {
    http: Client,
    client_id: String,
    client_secret: String,
    redirect_uri: String,
    endpoints: OAuthEndpoints,
}

impl fmt::Debug for OAuthClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OAuthClient")
            .field("client_id", &self.client_id)
            .field("client_secret", &"[hidden]")
            .field("redirect_uri", &self.redirect_uri)
            .field("endpoints", &self.endpoints)
            .finish_non_exhaustive()
    }
}

impl OAuthClient {
    /// Creates a client; URLs set in `config` override `defaults`.
    #[must_use]
    pub fn new(http: Client, config: &ProviderConfig, defaults: OAuthEndpoints) -> Self {
        let endpoints = OAuthEndpoints {
            authorize_url: config
                .authorize_url
                .clone()
                .unwrap_or(defaults.authorize_url),
            token_url: config.token_url.clone().unwrap_or(defaults.token_url),
            scopes: defaults.scopes,
        };

        Self {
            http,
            client_id: config.client_id.clone(),
            client_secret: config.client_secret.clone(),
            redirect_uri: config.redirect_uri.clone(),
            endpoints,
        }
    }

    /// Builds the authorization URL carrying `state`.
    pub fn authorization_url(&self, state: &str) -> Result<String, ProviderError> {
        Url::parse_with_params(
            &self.endpoints.authorize_url,
            &[
                ("client_id", self.client_id.as_str()),
                ("response_type", "code"),
                ("scope", self.endpoints.scopes.as_str()),
                ("redirect_uri", self.redirect_uri.as_str()),
                ("state", state),
            ],
        )
        .map(String::from)
        .map_err(|e| ProviderError::Permanent(format!("invalid authorize url: {e}")))
    }

    /// Exchanges an authorization code.
    ///
    /// # Errors
    ///
    /// Any rejection by the token endpoint is `ProviderError::AuthExchange`,
    /// except 5xx and 429 which are transient.
    pub async fn exchange_code(&self, code: &str) -> Result<TokenResponse, ProviderError> {
        self.token_request(
            &[
                ("grant_type", "authorization_code"),
                ("code", code),
                ("redirect_uri", self.redirect_uri.as_str()),
            ],
            Grant::AuthorizationCode,
        )
        .await
    }

    /// Redeems a refresh token.
    ///
    /// # Errors
    ///
    /// Returns `ProviderError::AuthExpired` on 401 or an `invalid_grant` error.
    pub async fn refresh(&self, refresh_token: &str) -> Result<TokenResponse, ProviderError> {
        self.token_request(
            &[
                ("grant_type", "refresh_token"),
                ("refresh_token", refresh_token),
            ],
            Grant::RefreshToken,
        )
        .await
    }

    async fn token_request(
        &self,
        form: &[(&str, &str)],
        grant: Grant,
    ) -> Result<TokenResponse, ProviderError> {
        let response = self
            .http
            .post(&self.endpoints.token_url)
            .basic_auth(&self.client_id, Some(&self.client_secret))
            .header(reqwest::header::ACCEPT, "application/json")
            .form(form)
            .send()
            .await
            .map_err(|e| http::send_error(&e))?;

        let status = response.status();
        if status.is_success() {
            debug!(grant = ?grant, "Token endpoint succeeded");
            return response
                .json::<TokenResponse>()
                .await
                .map_err(|e| ProviderError::Permanent(format!("invalid token response: {e}")));
        }

        let body = response.text().await.unwrap_or_default();
        Err(token_error(status, &body, grant))
    }
}

fn token_error(status: StatusCode, body: &str, grant: Grant) -> ProviderError {
    if status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
        return http::status_error(status, body);
    }

    let parsed = serde_json::from_str::<TokenErrorBody>(body).ok();
    let message = match &parsed {
        Some(TokenErrorBody {
            error,
            error_description: Some(description),
        }) => format!("{error}: {description}"),
        Some(TokenErrorBody { error, .. }) => error.clone(),
        None => format!("{status}: {}", http::excerpt(body)),
    };
    let invalid_grant = parsed.is_some_and(|p| p.error == "invalid_grant");

    match grant {
        Grant::AuthorizationCode => ProviderError::AuthExchange(message),
        Grant::RefreshToken if status == StatusCode::UNAUTHORIZED || invalid_grant => {
            ProviderError::AuthExpired(message)
        }
        Grant::RefreshToken => ProviderError::Permanent(message),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> ProviderConfig {
        ProviderConfig {
            client_id: "client-1".to_string(),
            client_secret: "secret".to_string(),
            redirect_uri: "http://localhost:8080/api/v1/integrations/quickbooks/callback".to_string(),
            authorize_url: None,
            token_url: None,
            api_base_url: None,
            payment_account_id: None,
        }
    }

    fn defaults() -> OAuthEndpoints {
        OAuthEndpoints {
            authorize_url: "https://auth.example.test/authorize".to_string(),
            token_url: "https://auth.example.test/token".to_string(),
            scopes: "accounting offline_access".to_string(),
        }
    }

    #[test]
    fn test_authorization_url_is_encoded() {
        let client = OAuthClient::new(Client::new(), &config(), defaults());
        let url = client.authorization_url("org-42").unwrap();

        assert!(url.starts_with("https://auth.example.test/authorize?"));
        assert!(url.contains("client_id=client-1"));
        assert!(url.contains("response_type=code"));
        assert!(url.contains("scope=accounting+offline_access"));
        assert!(url.contains("state=org-42"));
        assert!(url.contains("redirect_uri=http%3A%2F%2Flocalhost%3A8080"));
    }

    #[test]
    fn test_configured_urls_override_defaults() {
        let mut config = config();
        config.authorize_url = Some("http://127.0.0.1:9/authorize".to_string());
        let client = OAuthClient::new(Client::new(), &config, defaults());

        assert!(client.authorization_url("s").unwrap().starts_with("http://127.0.0.1:9/authorize?"));
    }

    #[test]
    fn test_refresh_classification() {
        let invalid_grant = r#"{"error":"invalid_grant","error_description":"Token expired"}"#;
        assert_eq!(
            token_error(StatusCode::BAD_REQUEST, invalid_grant, Grant::RefreshToken),
            ProviderError::AuthExpired("invalid_grant: Token expired".to_string())
        );
        assert!(matches!(
            token_error(StatusCode::UNAUTHORIZED, "", Grant::RefreshToken),
            ProviderError::AuthExpired(_)
        ));
        assert!(matches!(
            token_error(StatusCode::BAD_REQUEST, r#"{"error":"invalid_client"}"#, Grant::RefreshToken),
            ProviderError::Permanent(_)
        ));
        assert!(matches!(
            token_error(StatusCode::SERVICE_UNAVAILABLE, "", Grant::RefreshToken),
            ProviderError::Transient(_)
        ));
    }

    #[test]
    fn test_code_rejection_is_auth_exchange() {
        assert!(matches!(
            token_error(StatusCode::BAD_REQUEST, r#"{"error":"invalid_grant"}"#, Grant::AuthorizationCode),
            ProviderError::AuthExchange(_)
        ));
    }

    #[test]
    fn test_refresh_keeps_previous_refresh_token() {
        let response = TokenResponse {
            access_token: "a2".to_string(),
            refresh_token: None,
            token_type: None,
            expires_in: 3600,
        };
        let tokens = response.into_token_set(Some("r1"), None);

        assert_eq!(tokens.refresh_token, "r1");
        assert_eq!(tokens.token_type, "Bearer");
        assert!(tokens.expires_at > Utc::now() + Duration::minutes(59));
    }
}
