//! Sync ledger backed by the append-only `sync_attempts` table.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, PaginatorTrait, QueryFilter,
    QueryOrder, QuerySelect, Set,
};

use ledgerbridge_core::PersistenceError;
use ledgerbridge_core::integration::Provider;
use ledgerbridge_core::ledger::{SyncAttempt, SyncLedger, SyncStatus};
use ledgerbridge_core::provider::ExternalRecordId;
use ledgerbridge_shared::types::{DocumentId, OrganizationId, SyncAttemptId};

use super::{db_error, parse_provider};
use crate::entities::sync_attempts;

/// Postgres sync ledger. Only ever inserts.
#[derive(Debug, Clone)]
pub struct PgSyncLedger {
    db: DatabaseConnection,
}

impl PgSyncLedger {
    /// Creates a new ledger.
    #[must_use]
    pub const fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    fn pair(
        document_id: DocumentId,
        provider: Provider,
    ) -> sea_orm::Select<sync_attempts::Entity> {
        sync_attempts::Entity::find()
            .filter(sync_attempts::Column::DocumentId.eq(document_id.into_inner()))
            .filter(sync_attempts::Column::Provider.eq(provider.as_str()))
    }
}

fn to_attempt(row: sync_attempts::Model) -> Result<SyncAttempt, PersistenceError> {
    let status = SyncStatus::parse(&row.status).ok_or_else(|| {
        PersistenceError::new(format!("unknown sync status '{}' on {}", row.status, row.id))
    })?;

    Ok(SyncAttempt {
        id: SyncAttemptId::from_uuid(row.id),
        document_id: DocumentId::from_uuid(row.document_id),
        provider: parse_provider(&row.provider)?,
        organization_id: OrganizationId::from_uuid(row.organization_id),
        status,
        external_record_id: row.external_record_id.map(ExternalRecordId::new),
        error_kind: row.error_kind,
        error_message: row.error_message,
        idempotency_key: row.idempotency_key,
        attempted_at: row.attempted_at.with_timezone(&Utc),
    })
}

#[async_trait]
impl SyncLedger for PgSyncLedger {
    async fn append(&self, attempt: &SyncAttempt) -> Result<(), PersistenceError> {
        sync_attempts::ActiveModel {
            id: Set(attempt.id.into_inner()),
            document_id: Set(attempt.document_id.into_inner()),
            organization_id: Set(attempt.organization_id.into_inner()),
            provider: Set(attempt.provider.as_str().to_string()),
            status: Set(attempt.status.as_str().to_string()),
            external_record_id: Set(attempt
                .external_record_id
                .as_ref()
                .map(|id| id.as_str().to_string())),
            error_kind: Set(attempt.error_kind.clone()),
            error_message: Set(attempt.error_message.clone()),
            idempotency_key: Set(attempt.idempotency_key.clone()),
            attempted_at: Set(attempt.attempted_at.fixed_offset()),
        }
        .insert(&self.db)
        .await
        .map_err(db_error)?;

        Ok(())
    }

    async fn latest_success(
        &self,
        document_id: DocumentId,
        provider: Provider,
    ) -> Result<Option<SyncAttempt>, PersistenceError> {
        Self::pair(document_id, provider)
            .filter(sync_attempts::Column::Status.eq(SyncStatus::Success.as_str()))
            .order_by_desc(sync_attempts::Column::AttemptedAt)
            .order_by_desc(sync_attempts::Column::Id)
            .one(&self.db)
            .await
            .map_err(db_error)?
            .map(to_attempt)
            .transpose()
    }

    async fn success_count(
        &self,
        document_id: DocumentId,
        provider: Provider,
    ) -> Result<u64, PersistenceError> {
        Self::pair(document_id, provider)
            .filter(sync_attempts::Column::Status.eq(SyncStatus::Success.as_str()))
            .count(&self.db)
            .await
            .map_err(db_error)
    }

    async fn history(
        &self,
        document_id: DocumentId,
        provider: Provider,
    ) -> Result<Vec<SyncAttempt>, PersistenceError> {
        Self::pair(document_id, provider)
            .order_by_asc(sync_attempts::Column::AttemptedAt)
            .order_by_asc(sync_attempts::Column::Id)
            .all(&self.db)
            .await
            .map_err(db_error)?
            .into_iter()
            .map(to_attempt)
            .collect()
    }

    async fn last_success_at(
        &self,
        organization_id: OrganizationId,
        provider: Provider,
    ) -> Result<Option<DateTime<Utc>>, PersistenceError> {
        let latest = sync_attempts::Entity::find()
            .select_only()
            .column(sync_attempts::Column::AttemptedAt)
            .filter(sync_attempts::Column::OrganizationId.eq(organization_id.into_inner()))
            .filter(sync_attempts::Column::Provider.eq(provider.as_str()))
            .filter(sync_attempts::Column::Status.eq(SyncStatus::Success.as_str()))
            .order_by_desc(sync_attempts::Column::AttemptedAt)
            .into_tuple::<sea_orm::prelude::DateTimeWithTimeZone>()
            .one(&self.db)
            .await
            .map_err(db_error)?;

        Ok(latest.map(|at| at.with_timezone(&Utc)))
    }
}
