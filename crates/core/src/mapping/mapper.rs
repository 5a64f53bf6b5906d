//! Category mapper with a short-lived lookup cache.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use moka::future::Cache;
use tracing::{debug, info};

use ledgerbridge_shared::types::OrganizationId;

use super::error::MappingError;
use super::types::{CategoryMapping, MappedLineItem};
use crate::document::Document;
use crate::error::PersistenceError;
use crate::integration::Provider;

/// Default cache capacity (number of entries).
const DEFAULT_CACHE_CAPACITY: u64 = 10_000;

/// Default time-to-live for cache entries (60 seconds).
const DEFAULT_TTL_SECS: u64 = 60;

type CacheKey = (OrganizationId, Provider, String);

/// Storage for category mappings, unique per (organization, provider, category).
#[async_trait]
pub trait CategoryMappingRepository: Send + Sync {
    /// Finds the account code for a category.
    async fn find(
        &self,
        organization_id: OrganizationId,
        provider: Provider,
        internal_category: &str,
    ) -> Result<Option<String>, PersistenceError>;

    /// Lists an organization's mappings for a provider, ordered by category.
    async fn list(
        &self,
        organization_id: OrganizationId,
        provider: Provider,
    ) -> Result<Vec<CategoryMapping>, PersistenceError>;

    /// Inserts or replaces a mapping.
    async fn upsert(&self, mapping: &CategoryMapping) -> Result<(), PersistenceError>;
}

/// Resolves internal categories to provider account codes.
///
/// Only hits are cached, so a mapping created after a miss is picked up on
/// the next lookup.
#[derive(Clone)]
pub struct CategoryMapper {
    repository: Arc<dyn CategoryMappingRepository>,
    cache: Cache<CacheKey, String>,
}

impl CategoryMapper {
    /// Creates a mapper with the default cache settings.
    #[must_use]
    pub fn new(repository: Arc<dyn CategoryMappingRepository>) -> Self {
        Self::with_cache(repository, DEFAULT_CACHE_CAPACITY, Duration::from_secs(DEFAULT_TTL_SECS))
    }

    /// Creates a mapper with a custom cache capacity and TTL.
    #[must_use]
    pub fn with_cache(
        repository: Arc<dyn CategoryMappingRepository>,
        max_capacity: u64,
        ttl: Duration,
    ) -> Self {
        let cache = Cache::builder()
            .max_capacity(max_capacity)
            .time_to_live(ttl)
            .build();

        Self { repository, cache }
    }

    /// Resolves one category.
    ///
    /// # Errors
    ///
    /// Returns `MappingError::Missing` naming the category if no mapping exists.
    pub async fn resolve(
        &self,
        organization_id: OrganizationId,
        provider: Provider,
        internal_category: &str,
    ) -> Result<String, MappingError> {
        let key = (organization_id, provider, internal_category.to_string());
        if let Some(code) = self.cache.get(&key).await {
            return Ok(code);
        }

        let code = self
            .repository
            .find(organization_id, provider, internal_category)
            .await?
            .ok_or_else(|| MappingError::Missing {
                categories: vec![internal_category.to_string()],
            })?;

        self.cache.insert(key, code.clone()).await;
        Ok(code)
    }

    /// Resolves every postable line of a document.
    ///
    /// # Errors
    ///
    /// Returns a single `MappingError::Missing` listing every unmapped category.
    pub async fn map_document(
        &self,
        document: &Document,
        provider: Provider,
    ) -> Result<Vec<MappedLineItem>, MappingError> {
        let mut mapped = Vec::new();
        let mut missing = BTreeSet::new();

        for line in document.postable_lines() {
            let category = line.category().to_string();
            match self.resolve(document.organization_id, provider, &category).await {
                Ok(account_code) => mapped.push(MappedLineItem {
                    amount: line.amount,
                    category,
                    account_code,
                    project_id: line.project_id,
                    description: line.description,
                }),
                Err(MappingError::Missing { .. }) => {
                    missing.insert(category);
                }
                Err(e) => return Err(e),
            }
        }

        if missing.is_empty() {
            Ok(mapped)
        } else {
            debug!(
                document_id = %document.id,
                provider = %provider,
                missing = ?missing,
                "Unmapped categories"
            );
            Err(MappingError::Missing {
                categories: missing.into_iter().collect(),
            })
        }
    }

    /// Lists an organization's mappings for a provider.
    pub async fn list(
        &self,
        organization_id: OrganizationId,
        provider: Provider,
    ) -> Result<Vec<CategoryMapping>, MappingError> {
        Ok(self.repository.list(organization_id, provider).await?)
    }

    /// Stores a mapping and drops its cached value.
    pub async fn upsert(&self, mapping: &CategoryMapping) -> Result<(), MappingError> {
        self.repository.upsert(mapping).await?;
        self.cache
            .invalidate(&(
                mapping.organization_id,
                mapping.provider,
                mapping.internal_category.clone(),
            ))
            .await;

        info!(
            org_id = %mapping.organization_id,
            provider = %mapping.provider,
            category = %mapping.internal_category,
            account = %mapping.external_account_code,
            "Category mapping saved"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use rust_decimal_macros::dec;

    use super::*;
    use crate::document::{DocumentStatus, LineItem};
    use crate::memory::MemoryMappings;
    use ledgerbridge_shared::types::DocumentId;

    /// Counts lookups that reach storage.
    struct CountingMappings {
        inner: MemoryMappings,
        finds: AtomicUsize,
    }

    #[async_trait]
    impl CategoryMappingRepository for CountingMappings {
        async fn find(
            &self,
            organization_id: OrganizationId,
            provider: Provider,
            internal_category: &str,
        ) -> Result<Option<String>, PersistenceError> {
            self.finds.fetch_add(1, Ordering::SeqCst);
            self.inner.find(organization_id, provider, internal_category).await
        }

        async fn list(
            &self,
            organization_id: OrganizationId,
            provider: Provider,
        ) -> Result<Vec<CategoryMapping>, PersistenceError> {
            self.inner.list(organization_id, provider).await
        }

        async fn upsert(&self, mapping: &CategoryMapping) -> Result<(), PersistenceError> {
            self.inner.upsert(mapping).await
        }
    }

    fn mapping(org: OrganizationId, category: &str, code: &str) -> CategoryMapping {
        CategoryMapping {
            organization_id: org,
            provider: Provider::QuickBooks,
            internal_category: category.to_string(),
            external_account_code: code.to_string(),
        }
    }

    fn line(amount: rust_decimal::Decimal, category: Option<&str>) -> LineItem {
        LineItem {
            amount,
            category_name: category.map(str::to_string),
            project_id: None,
            description: None,
        }
    }

    fn document(org: OrganizationId, lines: Vec<LineItem>) -> Document {
        Document {
            id: DocumentId::new(),
            organization_id: org,
            vendor_name: Some("Acme".to_string()),
            document_date: None,
            total_amount: dec!(50.00),
            tax_amount: None,
            line_items: lines,
            notes: None,
            external_sync_notes: None,
            status: DocumentStatus::Completed,
        }
    }

    #[tokio::test]
    async fn test_resolve_caches_hits() {
        let org = OrganizationId::new();
        let repo = Arc::new(CountingMappings {
            inner: MemoryMappings::new(),
            finds: AtomicUsize::new(0),
        });
        repo.upsert(&mapping(org, "Travel", "60")).await.unwrap();
        let mapper = CategoryMapper::new(repo.clone());

        assert_eq!(mapper.resolve(org, Provider::QuickBooks, "Travel").await.unwrap(), "60");
        assert_eq!(mapper.resolve(org, Provider::QuickBooks, "Travel").await.unwrap(), "60");
        assert_eq!(repo.finds.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_misses_are_not_cached() {
        let org = OrganizationId::new();
        let mapper = CategoryMapper::new(Arc::new(MemoryMappings::new()));

        let err = mapper.resolve(org, Provider::QuickBooks, "Meals").await.unwrap_err();
        assert_eq!(err, MappingError::Missing { categories: vec!["Meals".to_string()] });

        mapper.upsert(&mapping(org, "Meals", "62")).await.unwrap();
        assert_eq!(mapper.resolve(org, Provider::QuickBooks, "Meals").await.unwrap(), "62");
    }

    #[tokio::test]
    async fn test_upsert_invalidates_cached_code() {
        let org = OrganizationId::new();
        let mapper = CategoryMapper::new(Arc::new(MemoryMappings::new()));

        mapper.upsert(&mapping(org, "Travel", "60")).await.unwrap();
        assert_eq!(mapper.resolve(org, Provider::QuickBooks, "Travel").await.unwrap(), "60");

        mapper.upsert(&mapping(org, "Travel", "61")).await.unwrap();
        assert_eq!(mapper.resolve(org, Provider::QuickBooks, "Travel").await.unwrap(), "61");
    }

    #[tokio::test]
    async fn test_mappings_are_scoped_per_provider() {
        let org = OrganizationId::new();
        let mapper = CategoryMapper::new(Arc::new(MemoryMappings::new()));
        mapper.upsert(&mapping(org, "Travel", "60")).await.unwrap();

        assert!(mapper.resolve(org, Provider::Xero, "Travel").await.is_err());
        assert!(mapper.resolve(OrganizationId::new(), Provider::QuickBooks, "Travel").await.is_err());
    }

    #[tokio::test]
    async fn test_map_document_reports_every_missing_category() {
        let org = OrganizationId::new();
        let mapper = CategoryMapper::new(Arc::new(MemoryMappings::new()));
        mapper.upsert(&mapping(org, "Travel", "60")).await.unwrap();

        let doc = document(
            org,
            vec![
                line(dec!(10), Some("Travel")),
                line(dec!(20), Some("Software")),
                line(dec!(5), Some("Meals")),
                line(dec!(7), Some("Software")),
            ],
        );

        let err = mapper.map_document(&doc, Provider::QuickBooks).await.unwrap_err();
        assert_eq!(
            err,
            MappingError::Missing {
                categories: vec!["Meals".to_string(), "Software".to_string()]
            }
        );
    }

    #[tokio::test]
    async fn test_map_document_without_lines_uses_uncategorized_total() {
        let org = OrganizationId::new();
        let mapper = CategoryMapper::new(Arc::new(MemoryMappings::new()));
        mapper.upsert(&mapping(org, "Uncategorized", "99")).await.unwrap();

        let lines = mapper
            .map_document(&document(org, vec![]), Provider::QuickBooks)
            .await
            .unwrap();

        assert_eq!(lines.len(), 1);
        assert_eq!(lines[0].amount, dec!(50.00));
        assert_eq!(lines[0].account_code, "99");
    }
}
