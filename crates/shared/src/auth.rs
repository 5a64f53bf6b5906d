//! Session claims issued by the identity service.
//!
//! Ledgerbridge never logs users in; it only verifies the bearer token the
//! identity service hands out and reads the organization context from it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::types::{OrganizationId, UserId};

/// JWT claims for session tokens.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// Subject (user ID).
    pub sub: Uuid,
    /// Organization ID (current context).
    pub org: Uuid,
    /// Issued at timestamp.
    pub iat: i64,
    /// Expiration timestamp.
    pub exp: i64,
}

impl Claims {
    /// Creates new claims for a user acting within an organization.
    #[must_use]
    pub fn new(user_id: UserId, org_id: OrganizationId, expires_at: DateTime<Utc>) -> Self {
        Self {
            sub: user_id.into_inner(),
            org: org_id.into_inner(),
            iat: Utc::now().timestamp(),
            exp: expires_at.timestamp(),
        }
    }

    /// Returns the user ID from claims.
    #[must_use]
    pub const fn user_id(&self) -> UserId {
        UserId::from_uuid(self.sub)
    }

    /// Returns the organization ID from claims.
    #[must_use]
    pub const fn organization_id(&self) -> OrganizationId {
        OrganizationId::from_uuid(self.org)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_claims_new_sets_correct_fields() {
        let user_id = UserId::new();
        let org_id = OrganizationId::new();
        let expires_at = Utc::now() + Duration::hours(1);

        let claims = Claims::new(user_id, org_id, expires_at);

        assert_eq!(claims.user_id(), user_id);
        assert_eq!(claims.organization_id(), org_id);
        assert!(claims.iat <= Utc::now().timestamp());
        assert_eq!(claims.exp, expires_at.timestamp());
    }
}
