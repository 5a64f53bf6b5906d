//! Document repository backed by `documents`.
//!
//! The OCR pipeline owns document rows. Sync appends notes and replaces the
//! summary; the documents API applies bulk changes.

use async_trait::async_trait;
use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, DatabaseTransaction, EntityTrait,
    QueryFilter, QuerySelect, Set, TransactionTrait, sea_query::Expr,
};
use tracing::debug;

use ledgerbridge_core::PersistenceError;
use ledgerbridge_core::document::{
    BulkUpdate, Document, DocumentRepository, DocumentStatus, LineItem, annotation,
};
use ledgerbridge_shared::types::{DocumentId, OrganizationId};

use super::db_error;
use crate::entities::documents;

/// Repository for processed documents.
#[derive(Debug, Clone)]
pub struct PgDocumentRepository {
    db: DatabaseConnection,
}

impl PgDocumentRepository {
    /// Creates a new document repository.
    #[must_use]
    pub const fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    async fn lock_row(
        txn: &DatabaseTransaction,
        document_id: DocumentId,
    ) -> Result<documents::Model, PersistenceError> {
        documents::Entity::find_by_id(document_id.into_inner())
            .lock_exclusive()
            .one(txn)
            .await
            .map_err(db_error)?
            .ok_or_else(|| PersistenceError::new(format!("document {document_id} not found")))
    }

    async fn rewrite_lines<F>(
        &self,
        organization_id: OrganizationId,
        document_ids: &[DocumentId],
        mut change: F,
    ) -> Result<u64, PersistenceError>
    where
        F: FnMut(&mut LineItem) + Send,
    {
        let txn = self.db.begin().await.map_err(db_error)?;
        let rows = documents::Entity::find()
            .filter(documents::Column::Id.is_in(document_ids.iter().map(|id| id.into_inner())))
            .filter(documents::Column::OrganizationId.eq(organization_id.into_inner()))
            .filter(documents::Column::DeletedAt.is_null())
            .lock_exclusive()
            .all(&txn)
            .await
            .map_err(db_error)?;

        let mut changed = 0;
        for row in rows {
            let mut lines = decode_lines(&row)?;
            lines.iter_mut().for_each(&mut change);
            let encoded = encode_lines(&lines)?;

            let mut active: documents::ActiveModel = row.into();
            active.line_items = Set(encoded);
            active.updated_at = Set(Utc::now().fixed_offset());
            active.update(&txn).await.map_err(db_error)?;
            changed += 1;
        }

        txn.commit().await.map_err(db_error)?;
        Ok(changed)
    }
}

fn decode_lines(row: &documents::Model) -> Result<Vec<LineItem>, PersistenceError> {
    serde_json::from_value(row.line_items.clone())
        .map_err(|e| PersistenceError::new(format!("unreadable line items on {}: {e}", row.id)))
}

fn encode_lines(lines: &[LineItem]) -> Result<serde_json::Value, PersistenceError> {
    serde_json::to_value(lines)
        .map_err(|e| PersistenceError::new(format!("could not encode line items: {e}")))
}

fn to_document(row: documents::Model) -> Result<Document, PersistenceError> {
    let status = DocumentStatus::parse(&row.status).ok_or_else(|| {
        PersistenceError::new(format!("unknown document status '{}' on {}", row.status, row.id))
    })?;
    let line_items = decode_lines(&row)?;

    Ok(Document {
        id: DocumentId::from_uuid(row.id),
        organization_id: OrganizationId::from_uuid(row.organization_id),
        vendor_name: row.vendor_name,
        document_date: row.document_date,
        total_amount: row.total_amount,
        tax_amount: row.tax_amount,
        line_items,
        notes: row.notes,
        external_sync_notes: row.external_sync_notes,
        status,
    })
}

#[async_trait]
impl DocumentRepository for PgDocumentRepository {
    async fn find(
        &self,
        organization_id: OrganizationId,
        document_id: DocumentId,
    ) -> Result<Option<Document>, PersistenceError> {
        documents::Entity::find_by_id(document_id.into_inner())
            .filter(documents::Column::OrganizationId.eq(organization_id.into_inner()))
            .filter(documents::Column::DeletedAt.is_null())
            .one(&self.db)
            .await
            .map_err(db_error)?
            .map(to_document)
            .transpose()
    }

    async fn append_note(
        &self,
        document_id: DocumentId,
        note: &str,
    ) -> Result<(), PersistenceError> {
        let txn = self.db.begin().await.map_err(db_error)?;
        let row = Self::lock_row(&txn, document_id).await?;
        let notes = annotation::append_line(row.notes.as_deref(), note);

        let mut active: documents::ActiveModel = row.into();
        active.notes = Set(Some(notes));
        active.updated_at = Set(Utc::now().fixed_offset());
        active.update(&txn).await.map_err(db_error)?;

        txn.commit().await.map_err(db_error)?;
        debug!(document_id = %document_id, "Appended document note");
        Ok(())
    }

    async fn set_sync_summary(
        &self,
        document_id: DocumentId,
        summary: &str,
    ) -> Result<(), PersistenceError> {
        let result = documents::Entity::update_many()
            .col_expr(documents::Column::ExternalSyncNotes, Expr::value(summary))
            .col_expr(documents::Column::UpdatedAt, Expr::value(Utc::now().fixed_offset()))
            .filter(documents::Column::Id.eq(document_id.into_inner()))
            .exec(&self.db)
            .await
            .map_err(db_error)?;

        if result.rows_affected == 0 {
            return Err(PersistenceError::new(format!("document {document_id} not found")));
        }
        Ok(())
    }

    async fn apply_bulk(
        &self,
        organization_id: OrganizationId,
        document_ids: &[DocumentId],
        update: &BulkUpdate,
    ) -> Result<u64, PersistenceError> {
        if document_ids.is_empty() {
            return Ok(0);
        }

        let now = Utc::now().fixed_offset();
        let column_update = match update {
            BulkUpdate::Categorize { category } => {
                return self
                    .rewrite_lines(organization_id, document_ids, |line| {
                        line.category_name = Some(category.clone());
                    })
                    .await;
            }
            BulkUpdate::AssignProject { project_id } => {
                return self
                    .rewrite_lines(organization_id, document_ids, |line| {
                        line.project_id.clone_from(project_id);
                    })
                    .await;
            }
            BulkUpdate::MarkVerified => documents::Entity::update_many().col_expr(
                documents::Column::Status,
                Expr::value(DocumentStatus::Verified.as_str()),
            ),
            BulkUpdate::Delete => documents::Entity::update_many()
                .col_expr(documents::Column::DeletedAt, Expr::value(now)),
        };

        let result = column_update
            .col_expr(documents::Column::UpdatedAt, Expr::value(now))
            .filter(documents::Column::Id.is_in(document_ids.iter().map(|id| id.into_inner())))
            .filter(documents::Column::OrganizationId.eq(organization_id.into_inner()))
            .filter(documents::Column::DeletedAt.is_null())
            .exec(&self.db)
            .await
            .map_err(db_error)?;

        Ok(result.rows_affected)
    }
}
