//! Integration credential types.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use ledgerbridge_shared::types::OrganizationId;

/// An external accounting platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    /// QuickBooks Online.
    QuickBooks,
    /// Xero.
    Xero,
}

impl Provider {
    /// Every supported provider, in display order.
    pub const ALL: [Self; 2] = [Self::QuickBooks, Self::Xero];

    /// Returns the identifier used in URLs, storage and annotations.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::QuickBooks => "quickbooks",
            Self::Xero => "xero",
        }
    }

    /// Returns the product name shown to people.
    #[must_use]
    pub const fn display_name(&self) -> &'static str {
        match self {
            Self::QuickBooks => "QuickBooks",
            Self::Xero => "Xero",
        }
    }

    /// Parses a provider identifier.
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "quickbooks" => Some(Self::QuickBooks),
            "xero" => Some(Self::Xero),
            _ => None,
        }
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Provider {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s).ok_or_else(|| format!("unknown provider '{s}'"))
    }
}

/// OAuth2 tokens returned by a provider's token endpoint.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenSet {
    /// Bearer token for API calls.
    pub access_token: String,
    /// Token used to obtain the next access token.
    pub refresh_token: String,
    /// Token type, normally `Bearer`.
    pub token_type: String,
    /// When the access token stops being accepted.
    pub expires_at: DateTime<Utc>,
    /// QuickBooks realm ID or Xero tenant ID.
    pub external_tenant_id: Option<String>,
}

impl fmt::Debug for TokenSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenSet")
            .field("access_token", &"[hidden]")
            .field("refresh_token", &"[hidden]")
            .field("token_type", &self.token_type)
            .field("expires_at", &self.expires_at)
            .field("external_tenant_id", &self.external_tenant_id)
            .finish()
    }
}

/// What the provider redirected back with after the user authorized the app.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthGrant {
    /// Authorization code to exchange.
    pub code: String,
    /// QuickBooks company (`realmId` query parameter). Xero sends none.
    pub realm_id: Option<String>,
}

impl AuthGrant {
    /// Creates a grant without a realm.
    #[must_use]
    pub fn new(code: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            realm_id: None,
        }
    }

    /// Attaches the QuickBooks realm.
    #[must_use]
    pub fn with_realm(mut self, realm_id: impl Into<String>) -> Self {
        self.realm_id = Some(realm_id.into());
        self
    }
}

/// Connection state derived from a stored credential.
///
/// The full lifecycle is
/// `Disconnected → Connecting → Connected → Expiring → Refreshing → Connected`,
/// with a failed refresh falling back to `Disconnected`. `Connecting` and
/// `Refreshing` only exist while a request is in flight, so a stored
/// credential is always in one of the three states below.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionState {
    /// Revoked or refresh failed; a new authorization flow is required.
    Disconnected,
    /// Access token valid beyond the refresh window.
    Connected,
    /// Access token expires within the refresh window.
    Expiring,
}

/// OAuth2 credential for one (organization, provider) pair.
///
/// Persisted as an opaque JSON blob; the fields below are exactly what is stored.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credential {
    /// Owning organization.
    pub organization_id: OrganizationId,
    /// Accounting provider.
    pub provider: Provider,
    /// Bearer token for API calls.
    pub access_token: String,
    /// Token used to obtain the next access token.
    pub refresh_token: String,
    /// Token type, normally `Bearer`.
    pub token_type: String,
    /// When the access token stops being accepted.
    pub expires_at: DateTime<Utc>,
    /// QuickBooks realm ID or Xero tenant ID.
    pub external_tenant_id: Option<String>,
    /// False once revoked or after an unrecoverable refresh failure.
    pub is_active: bool,
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("organization_id", &self.organization_id)
            .field("provider", &self.provider)
            .field("access_token", &"[hidden]")
            .field("refresh_token", &"[hidden]")
            .field("token_type", &self.token_type)
            .field("expires_at", &self.expires_at)
            .field("external_tenant_id", &self.external_tenant_id)
            .field("is_active", &self.is_active)
            .finish()
    }
}

impl Credential {
    /// Creates an active credential from freshly exchanged tokens.
    #[must_use]
    pub fn connect(organization_id: OrganizationId, provider: Provider, tokens: TokenSet) -> Self {
        Self {
            organization_id,
            provider,
            access_token: tokens.access_token,
            refresh_token: tokens.refresh_token,
            token_type: tokens.token_type,
            expires_at: tokens.expires_at,
            external_tenant_id: tokens.external_tenant_id,
            is_active: true,
        }
    }

    /// Returns the token fields as a `TokenSet`.
    #[must_use]
    pub fn tokens(&self) -> TokenSet {
        TokenSet {
            access_token: self.access_token.clone(),
            refresh_token: self.refresh_token.clone(),
            token_type: self.token_type.clone(),
            expires_at: self.expires_at,
            external_tenant_id: self.external_tenant_id.clone(),
        }
    }

    /// Returns a copy carrying refreshed tokens.
    ///
    /// Providers do not repeat the tenant on refresh, so the stored one is kept
    /// unless the response names a new one.
    #[must_use]
    pub fn with_tokens(&self, tokens: TokenSet) -> Self {
        Self {
            access_token: tokens.access_token,
            refresh_token: tokens.refresh_token,
            token_type: tokens.token_type,
            expires_at: tokens.expires_at,
            external_tenant_id: tokens
                .external_tenant_id
                .or_else(|| self.external_tenant_id.clone()),
            ..self.clone()
        }
    }

    /// Returns true if the access token expires within `window` of `now`.
    #[must_use]
    pub fn needs_refresh(&self, now: DateTime<Utc>, window: Duration) -> bool {
        self.expires_at <= now + window
    }

    /// Derives the connection state at `now`.
    #[must_use]
    pub fn state(&self, now: DateTime<Utc>, window: Duration) -> ConnectionState {
        if !self.is_active {
            ConnectionState::Disconnected
        } else if self.needs_refresh(now, window) {
            ConnectionState::Expiring
        } else {
            ConnectionState::Connected
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn tokens(expires_in: Duration) -> TokenSet {
        TokenSet {
            access_token: "access".to_string(),
            refresh_token: "refresh".to_string(),
            token_type: "Bearer".to_string(),
            expires_at: Utc::now() + expires_in,
            external_tenant_id: Some("realm-1".to_string()),
        }
    }

    #[rstest]
    #[case("quickbooks", Some(Provider::QuickBooks))]
    #[case("QuickBooks", Some(Provider::QuickBooks))]
    #[case("xero", Some(Provider::Xero))]
    #[case("sage", None)]
    fn test_provider_parse(#[case] input: &str, #[case] expected: Option<Provider>) {
        assert_eq!(Provider::parse(input), expected);
    }

    #[test]
    fn test_provider_serde_matches_as_str() {
        for provider in Provider::ALL {
            assert_eq!(
                serde_json::to_value(provider).unwrap(),
                serde_json::json!(provider.as_str())
            );
        }
    }

    #[test]
    fn test_state_transitions_with_time() {
        let window = Duration::minutes(5);
        let credential = Credential::connect(
            OrganizationId::new(),
            Provider::QuickBooks,
            tokens(Duration::minutes(60)),
        );
        assert_eq!(credential.state(Utc::now(), window), ConnectionState::Connected);

        let later = Utc::now() + Duration::minutes(57);
        assert_eq!(credential.state(later, window), ConnectionState::Expiring);

        let revoked = Credential {
            is_active: false,
            ..credential
        };
        assert_eq!(revoked.state(Utc::now(), window), ConnectionState::Disconnected);
    }

    #[test]
    fn test_refresh_keeps_tenant_when_response_omits_it() {
        let credential =
            Credential::connect(OrganizationId::new(), Provider::Xero, tokens(Duration::zero()));
        let refreshed = credential.with_tokens(TokenSet {
            access_token: "new-access".to_string(),
            external_tenant_id: None,
            ..tokens(Duration::hours(1))
        });

        assert_eq!(refreshed.access_token, "new-access");
        assert_eq!(refreshed.external_tenant_id.as_deref(), Some("realm-1"));
        assert!(refreshed.is_active);
    }

    #[test]
    fn test_debug_hides_tokens() {
        let credential = Credential::connect(
            OrganizationId::new(),
            Provider::Xero,
            tokens(Duration::hours(1)),
        );
        let debug = format!("{credential:?}");
        assert!(!debug.contains("access\""));
        assert!(debug.contains("[hidden]"));
    }
}
