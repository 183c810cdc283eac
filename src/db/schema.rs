//! Database schema initialization

use sqlx::SqlitePool;

use crate::error::Result;

/// Initialize the database schema
pub async fn initialize_schema(pool: &SqlitePool) -> Result<()> {
    sqlx::query(SCHEMA_SQL)
        .execute(pool)
        .await?;

    Ok(())
}

const SCHEMA_SQL: &str = r#"
-- Catalog entities (products and categories) with sync bookkeeping
CREATE TABLE IF NOT EXISTS catalog_entities (
    kind TEXT NOT NULL,
    id TEXT NOT NULL,
    rev INTEGER NOT NULL,
    -- 'local' or 'cloud'
    updated_by TEXT NOT NULL,
    checksum TEXT NOT NULL DEFAULT '',
    updated_at TEXT NOT NULL,
    -- Tombstone marker, NULL while live
    deleted_at TEXT,
    -- Domain payload (JSON)
    payload TEXT NOT NULL,

    PRIMARY KEY (kind, id)
);

CREATE INDEX IF NOT EXISTS idx_catalog_rev ON catalog_entities(rev);
CREATE INDEX IF NOT EXISTS idx_catalog_export ON catalog_entities(kind, updated_by, rev);
CREATE INDEX IF NOT EXISTS idx_catalog_deleted ON catalog_entities(deleted_at);
"#;
