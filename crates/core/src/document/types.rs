//! Processed document types.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use ledgerbridge_shared::types::{DocumentId, OrganizationId};

/// Category used when a line item (or a document without lines) has none.
pub const UNCATEGORIZED: &str = "Uncategorized";

/// Where a document is in the processing pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DocumentStatus {
    /// OCR and field extraction still running.
    Processing,
    /// Fields extracted; ready to sync.
    Completed,
    /// A person confirmed the extracted fields.
    Verified,
}

impl DocumentStatus {
    /// Returns the string representation of the status.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Processing => "processing",
            Self::Completed => "completed",
            Self::Verified => "verified",
        }
    }

    /// Parses a status from a string.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "processing" => Some(Self::Processing),
            "completed" => Some(Self::Completed),
            "verified" => Some(Self::Verified),
            _ => None,
        }
    }
}

/// One extracted line of a document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineItem {
    /// Line amount, tax inclusive.
    pub amount: Decimal,
    /// Internal expense category.
    #[serde(default)]
    pub category_name: Option<String>,
    /// Project the expense is billed to.
    #[serde(default)]
    pub project_id: Option<String>,
    /// Free-text description from the document.
    #[serde(default)]
    pub description: Option<String>,
}

impl LineItem {
    /// Returns the line's category, falling back to `Uncategorized`.
    #[must_use]
    pub fn category(&self) -> &str {
        self.category_name
            .as_deref()
            .map(str::trim)
            .filter(|c| !c.is_empty())
            .unwrap_or(UNCATEGORIZED)
    }
}

/// A finished document produced by the OCR pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Document {
    /// Document ID.
    pub id: DocumentId,
    /// Owning organization.
    pub organization_id: OrganizationId,
    /// Supplier name.
    pub vendor_name: Option<String>,
    /// Invoice or receipt date.
    pub document_date: Option<NaiveDate>,
    /// Total including tax.
    pub total_amount: Decimal,
    /// Tax portion of the total.
    pub tax_amount: Option<Decimal>,
    /// Extracted lines.
    pub line_items: Vec<LineItem>,
    /// Free-text notes; sync annotations are appended here.
    pub notes: Option<String>,
    /// Latest consolidated multi-provider sync summary.
    pub external_sync_notes: Option<String>,
    /// Pipeline status.
    pub status: DocumentStatus,
}

impl Document {
    /// Lines to post. A document without extracted lines posts its total as
    /// a single uncategorized line.
    #[must_use]
    pub fn postable_lines(&self) -> Vec<LineItem> {
        if self.line_items.is_empty() {
            vec![LineItem {
                amount: self.total_amount,
                category_name: None,
                project_id: None,
                description: self.vendor_name.clone(),
            }]
        } else {
            self.line_items.clone()
        }
    }

    /// Supplier name, or a placeholder when extraction found none.
    #[must_use]
    pub fn vendor_or_default(&self) -> &str {
        self.vendor_name
            .as_deref()
            .filter(|v| !v.trim().is_empty())
            .unwrap_or("Unknown vendor")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn document(lines: Vec<LineItem>) -> Document {
        Document {
            id: DocumentId::new(),
            organization_id: OrganizationId::new(),
            vendor_name: Some("Acme Supplies".to_string()),
            document_date: None,
            total_amount: dec!(120.00),
            tax_amount: Some(dec!(20.00)),
            line_items: lines,
            notes: None,
            external_sync_notes: None,
            status: DocumentStatus::Completed,
        }
    }

    #[test]
    fn test_blank_category_is_uncategorized() {
        let line = LineItem {
            amount: dec!(10),
            category_name: Some("  ".to_string()),
            project_id: None,
            description: None,
        };
        assert_eq!(line.category(), UNCATEGORIZED);
    }

    #[test]
    fn test_document_without_lines_posts_total() {
        let lines = document(vec![]).postable_lines();
        assert_eq!(lines.len(), 1);
        assert_eq!(lines[0].amount, dec!(120.00));
        assert_eq!(lines[0].category(), UNCATEGORIZED);
    }

    #[test]
    fn test_line_items_deserialize_with_missing_fields() {
        let line: LineItem = serde_json::from_value(serde_json::json!({ "amount": "12.50" })).unwrap();
        assert_eq!(line.amount, dec!(12.50));
        assert!(line.category_name.is_none());
    }
}
