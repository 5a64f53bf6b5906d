//! Category mapping repository backed by `category_mappings`.

use async_trait::async_trait;
use chrono::Utc;
use sea_orm::{
    ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder, QuerySelect, Set,
    sea_query::OnConflict,
};
use uuid::Uuid;

use ledgerbridge_core::PersistenceError;
use ledgerbridge_core::integration::Provider;
use ledgerbridge_core::mapping::{CategoryMapping, CategoryMappingRepository};
use ledgerbridge_shared::types::OrganizationId;

use super::db_error;
use crate::entities::category_mappings;

/// Repository for category to account code mappings.
#[derive(Debug, Clone)]
pub struct PgMappingRepository {
    db: DatabaseConnection,
}

impl PgMappingRepository {
    /// Creates a new mapping repository.
    #[must_use]
    pub const fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }
}

#[async_trait]
impl CategoryMappingRepository for PgMappingRepository {
    async fn find(
        &self,
        organization_id: OrganizationId,
        provider: Provider,
        internal_category: &str,
    ) -> Result<Option<String>, PersistenceError> {
        category_mappings::Entity::find()
            .select_only()
            .column(category_mappings::Column::ExternalAccountCode)
            .filter(category_mappings::Column::OrganizationId.eq(organization_id.into_inner()))
            .filter(category_mappings::Column::Provider.eq(provider.as_str()))
            .filter(category_mappings::Column::InternalCategory.eq(internal_category))
            .into_tuple::<String>()
            .one(&self.db)
            .await
            .map_err(db_error)
    }

    async fn list(
        &self,
        organization_id: OrganizationId,
        provider: Provider,
    ) -> Result<Vec<CategoryMapping>, PersistenceError> {
        let rows = category_mappings::Entity::find()
            .filter(category_mappings::Column::OrganizationId.eq(organization_id.into_inner()))
            .filter(category_mappings::Column::Provider.eq(provider.as_str()))
            .order_by_asc(category_mappings::Column::InternalCategory)
            .all(&self.db)
            .await
            .map_err(db_error)?;

        Ok(rows
            .into_iter()
            .map(|row| CategoryMapping {
                organization_id,
                provider,
                internal_category: row.internal_category,
                external_account_code: row.external_account_code,
            })
            .collect())
    }

    async fn upsert(&self, mapping: &CategoryMapping) -> Result<(), PersistenceError> {
        let now = Utc::now().fixed_offset();
        let row = category_mappings::ActiveModel {
            id: Set(Uuid::now_v7()),
            organization_id: Set(mapping.organization_id.into_inner()),
            provider: Set(mapping.provider.as_str().to_string()),
            internal_category: Set(mapping.internal_category.clone()),
            external_account_code: Set(mapping.external_account_code.clone()),
            created_at: Set(now),
            updated_at: Set(now),
        };

        category_mappings::Entity::insert(row)
            .on_conflict(
                OnConflict::columns([
                    category_mappings::Column::OrganizationId,
                    category_mappings::Column::Provider,
                    category_mappings::Column::InternalCategory,
                ])
                .update_columns([
                    category_mappings::Column::ExternalAccountCode,
                    category_mappings::Column::UpdatedAt,
                ])
                .to_owned(),
            )
            .exec(&self.db)
            .await
            .map_err(db_error)?;

        Ok(())
    }
}
