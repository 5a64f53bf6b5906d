//! Category mapping types.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use ledgerbridge_shared::types::OrganizationId;

use crate::integration::Provider;

/// Maps an internal expense category to a provider account code.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryMapping {
    /// Owning organization.
    pub organization_id: OrganizationId,
    /// Accounting provider.
    pub provider: Provider,
    /// Category name used on documents.
    pub internal_category: String,
    /// Account code (QuickBooks account ID or Xero account code).
    pub external_account_code: String,
}

/// A document line ready to post.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MappedLineItem {
    /// Line amount, tax inclusive.
    pub amount: Decimal,
    /// Internal category the account was resolved from.
    pub category: String,
    /// Resolved provider account code.
    pub account_code: String,
    /// Project the expense is billed to.
    pub project_id: Option<String>,
    /// Line description.
    pub description: Option<String>,
}
