//! Credential repository backed by `integration_credentials`.

use async_trait::async_trait;
use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder, Set,
    sea_query::Expr,
};
use uuid::Uuid;

use ledgerbridge_core::PersistenceError;
use ledgerbridge_core::integration::{Credential, CredentialRepository, Provider};
use ledgerbridge_shared::types::OrganizationId;

use super::{db_error, parse_provider};
use crate::entities::integration_credentials;

/// Repository for OAuth credentials.
///
/// One row per (organization, provider) is reused across reconnects; the
/// token blob is replaced in place.
#[derive(Debug, Clone)]
pub struct PgCredentialRepository {
    db: DatabaseConnection,
}

impl PgCredentialRepository {
    /// Creates a new credential repository.
    #[must_use]
    pub const fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    async fn find_row(
        &self,
        organization_id: OrganizationId,
        provider: Provider,
    ) -> Result<Option<integration_credentials::Model>, PersistenceError> {
        integration_credentials::Entity::find()
            .filter(integration_credentials::Column::OrganizationId.eq(organization_id.into_inner()))
            .filter(integration_credentials::Column::Provider.eq(provider.as_str()))
            .order_by_desc(integration_credentials::Column::IsActive)
            .order_by_desc(integration_credentials::Column::UpdatedAt)
            .one(&self.db)
            .await
            .map_err(db_error)
    }
}

fn to_credential(row: integration_credentials::Model) -> Result<Credential, PersistenceError> {
    let provider = parse_provider(&row.provider)?;
    let mut credential: Credential = serde_json::from_value(row.credentials).map_err(|e| {
        PersistenceError::new(format!("unreadable {provider} credential {}: {e}", row.id))
    })?;

    // Row columns win over the blob for the lookup fields.
    credential.organization_id = OrganizationId::from_uuid(row.organization_id);
    credential.provider = provider;
    credential.is_active = row.is_active;
    Ok(credential)
}

#[async_trait]
impl CredentialRepository for PgCredentialRepository {
    async fn find(
        &self,
        organization_id: OrganizationId,
        provider: Provider,
    ) -> Result<Option<Credential>, PersistenceError> {
        self.find_row(organization_id, provider)
            .await?
            .map(to_credential)
            .transpose()
    }

    async fn list(
        &self,
        organization_id: OrganizationId,
    ) -> Result<Vec<Credential>, PersistenceError> {
        let rows = integration_credentials::Entity::find()
            .filter(integration_credentials::Column::OrganizationId.eq(organization_id.into_inner()))
            .order_by_asc(integration_credentials::Column::Provider)
            .order_by_desc(integration_credentials::Column::IsActive)
            .order_by_desc(integration_credentials::Column::UpdatedAt)
            .all(&self.db)
            .await
            .map_err(db_error)?;

        let mut credentials: Vec<Credential> = Vec::with_capacity(rows.len());
        for row in rows {
            let credential = to_credential(row)?;
            if credentials.iter().all(|c| c.provider != credential.provider) {
                credentials.push(credential);
            }
        }
        credentials.sort_by_key(|c| c.provider);
        Ok(credentials)
    }

    async fn save(&self, credential: &Credential) -> Result<(), PersistenceError> {
        let blob = serde_json::to_value(credential)
            .map_err(|e| PersistenceError::new(format!("could not encode credential: {e}")))?;
        let now = Utc::now().fixed_offset();

        match self
            .find_row(credential.organization_id, credential.provider)
            .await?
        {
            Some(row) => {
                let mut active: integration_credentials::ActiveModel = row.into();
                active.credentials = Set(blob);
                active.is_active = Set(credential.is_active);
                active.updated_at = Set(now);
                active.update(&self.db).await.map_err(db_error)?;
            }
            None => {
                integration_credentials::ActiveModel {
                    id: Set(Uuid::now_v7()),
                    organization_id: Set(credential.organization_id.into_inner()),
                    provider: Set(credential.provider.as_str().to_string()),
                    credentials: Set(blob),
                    is_active: Set(credential.is_active),
                    created_at: Set(now),
                    updated_at: Set(now),
                }
                .insert(&self.db)
                .await
                .map_err(db_error)?;
            }
        }

        Ok(())
    }

    async fn deactivate(
        &self,
        organization_id: OrganizationId,
        provider: Provider,
    ) -> Result<bool, PersistenceError> {
        let result = integration_credentials::Entity::update_many()
            .col_expr(integration_credentials::Column::IsActive, Expr::value(false))
            .col_expr(
                integration_credentials::Column::UpdatedAt,
                Expr::value(Utc::now().fixed_offset()),
            )
            .filter(integration_credentials::Column::OrganizationId.eq(organization_id.into_inner()))
            .filter(integration_credentials::Column::Provider.eq(provider.as_str()))
            .exec(&self.db)
            .await
            .map_err(db_error)?;

        Ok(result.rows_affected > 0)
    }
}
