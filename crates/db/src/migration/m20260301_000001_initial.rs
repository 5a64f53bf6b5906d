//! Initial schema: documents, credentials, category mappings and the sync ledger.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        let db = manager.get_connection();
        db.execute_unprepared(INITIAL_SQL).await?;
        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        let db = manager.get_connection();
        db.execute_unprepared(
            "DROP TABLE IF EXISTS sync_attempts, category_mappings, integration_credentials, documents CASCADE;",
        )
        .await?;
        db.execute_unprepared("DROP FUNCTION IF EXISTS reject_sync_attempt_changes();")
            .await?;
        Ok(())
    }
}

const INITIAL_SQL: &str = r"
-- Documents produced by the OCR pipeline. Sync reads them and appends notes.
CREATE TABLE IF NOT EXISTS documents (
    id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
    organization_id UUID NOT NULL,
    vendor_name TEXT,
    document_date DATE,
    total_amount NUMERIC(19, 4) NOT NULL,
    tax_amount NUMERIC(19, 4),
    line_items JSONB NOT NULL DEFAULT '[]'::jsonb,
    notes TEXT,
    external_sync_notes TEXT,
    status TEXT NOT NULL DEFAULT 'processing',
    deleted_at TIMESTAMPTZ,
    created_at TIMESTAMPTZ NOT NULL DEFAULT now(),
    updated_at TIMESTAMPTZ NOT NULL DEFAULT now(),
    CONSTRAINT chk_document_status CHECK (status IN ('processing', 'completed', 'verified'))
);

CREATE INDEX IF NOT EXISTS idx_documents_org ON documents(organization_id) WHERE deleted_at IS NULL;

-- OAuth credentials, stored as an opaque JSON blob per (organization, provider)
CREATE TABLE integration_credentials (
    id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
    organization_id UUID NOT NULL,
    provider TEXT NOT NULL,
    credentials JSONB NOT NULL,
    is_active BOOLEAN NOT NULL DEFAULT true,
    created_at TIMESTAMPTZ NOT NULL DEFAULT now(),
    updated_at TIMESTAMPTZ NOT NULL DEFAULT now(),
    CONSTRAINT chk_credential_provider CHECK (provider IN ('quickbooks', 'xero'))
);

-- At most one active integration per organization and provider
CREATE UNIQUE INDEX uq_integration_credentials_active
    ON integration_credentials(organization_id, provider)
    WHERE is_active;

CREATE INDEX idx_integration_credentials_org ON integration_credentials(organization_id, provider);

-- Internal category to provider account code
CREATE TABLE category_mappings (
    id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
    organization_id UUID NOT NULL,
    provider TEXT NOT NULL,
    internal_category TEXT NOT NULL,
    external_account_code TEXT NOT NULL,
    created_at TIMESTAMPTZ NOT NULL DEFAULT now(),
    updated_at TIMESTAMPTZ NOT NULL DEFAULT now(),
    CONSTRAINT uq_category_mappings UNIQUE (organization_id, provider, internal_category),
    CONSTRAINT chk_mapping_provider CHECK (provider IN ('quickbooks', 'xero'))
);

-- Append-only sync ledger
CREATE TABLE sync_attempts (
    id UUID PRIMARY KEY,
    document_id UUID NOT NULL REFERENCES documents(id),
    organization_id UUID NOT NULL,
    provider TEXT NOT NULL,
    status TEXT NOT NULL,
    external_record_id TEXT,
    error_kind TEXT,
    error_message TEXT,
    idempotency_key TEXT,
    attempted_at TIMESTAMPTZ NOT NULL DEFAULT now(),
    CONSTRAINT chk_attempt_status CHECK (status IN ('pending', 'success', 'failed', 'skipped')),
    CONSTRAINT chk_attempt_success_has_record CHECK (status <> 'success' OR external_record_id IS NOT NULL)
);

CREATE INDEX idx_sync_attempts_document ON sync_attempts(document_id, provider, attempted_at);
CREATE INDEX idx_sync_attempts_org_success
    ON sync_attempts(organization_id, provider, attempted_at DESC)
    WHERE status = 'success';

CREATE OR REPLACE FUNCTION reject_sync_attempt_changes() RETURNS trigger AS $$
BEGIN
    RAISE EXCEPTION 'sync_attempts is append-only';
END;
$$ LANGUAGE plpgsql;

CREATE TRIGGER trg_sync_attempts_append_only
    BEFORE UPDATE OR DELETE ON sync_attempts
    FOR EACH ROW EXECUTE FUNCTION reject_sync_attempt_changes();
";
