//! `SeaORM` Entity for documents table.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Eq, Serialize, Deserialize)]
#[sea_orm(table_name = "documents")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub organization_id: Uuid,
    pub vendor_name: Option<String>,
    pub document_date: Option<Date>,
    #[sea_orm(column_type = "Decimal(Some((19, 4)))")]
    pub total_amount: Decimal,
    #[sea_orm(column_type = "Decimal(Some((19, 4)))", nullable)]
    pub tax_amount: Option<Decimal>,
    #[sea_orm(column_type = "JsonBinary")]
    pub line_items: Json,
    pub notes: Option<String>,
    pub external_sync_notes: Option<String>,
    pub status: String,
    pub deleted_at: Option<DateTimeWithTimeZone>,
    pub created_at: DateTimeWithTimeZone,
    pub updated_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::sync_attempts::Entity")]
    SyncAttempts,
}

impl Related<super::sync_attempts::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::SyncAttempts.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
