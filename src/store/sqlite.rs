//! SQLite-backed local store
//!
//! Both entity kinds share one table keyed by `(kind, id)`. Bookkeeping lives in
//! columns; the domain payload is stored as JSON.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{de::DeserializeOwned, Serialize};
use sqlx::SqlitePool;

use super::{LocalStore, StoreResult};
use crate::catalog::{CategoryRecord, EntityKind, ProductRecord, SyncRecord};
use crate::error::StorageError;

/// Local store persisting catalog records in SQLite
#[derive(Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Create a store on a pool whose schema is already initialized
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    async fn list_kind<T: DeserializeOwned>(&self, kind: EntityKind) -> StoreResult<Vec<SyncRecord<T>>> {
        let rows = sqlx::query_as::<_, EntityRow>(
            r#"
            SELECT id, rev, updated_by, checksum, updated_at, deleted_at, payload
            FROM catalog_entities
            WHERE kind = ?
            ORDER BY rev ASC, id ASC
            "#,
        )
        .bind(kind.as_str())
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(|r| r.into_record(kind)).collect()
    }

    async fn get_kind<T: DeserializeOwned>(
        &self,
        kind: EntityKind,
        id: &str,
    ) -> StoreResult<Option<SyncRecord<T>>> {
        let row = sqlx::query_as::<_, EntityRow>(
            r#"
            SELECT id, rev, updated_by, checksum, updated_at, deleted_at, payload
            FROM catalog_entities
            WHERE kind = ? AND id = ?
            "#,
        )
        .bind(kind.as_str())
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(|r| r.into_record(kind)).transpose()
    }

    async fn save_kind<T: Serialize>(&self, kind: EntityKind, record: &SyncRecord<T>) -> StoreResult<()> {
        let rev = i64::try_from(record.rev)
            .map_err(|_| StorageError::RevisionOutOfRange(record.rev))?;
        let payload = serde_json::to_string(&record.data)?;

        sqlx::query(
            r#"
            INSERT INTO catalog_entities (
                kind, id, rev, updated_by, checksum, updated_at, deleted_at, payload
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(kind, id) DO UPDATE SET
                rev = excluded.rev,
                updated_by = excluded.updated_by,
                checksum = excluded.checksum,
                updated_at = excluded.updated_at,
                deleted_at = excluded.deleted_at,
                payload = excluded.payload
            "#,
        )
        .bind(kind.as_str())
        .bind(&record.id)
        .bind(rev)
        .bind(record.updated_by.as_str())
        .bind(&record.checksum)
        .bind(record.updated_at.to_rfc3339())
        .bind(record.deleted_at.map(|d| d.to_rfc3339()))
        .bind(&payload)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn delete_kind(&self, kind: EntityKind, id: &str) -> StoreResult<()> {
        sqlx::query("DELETE FROM catalog_entities WHERE kind = ? AND id = ?")
            .bind(kind.as_str())
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(())
    }
}

#[async_trait]
impl LocalStore for SqliteStore {
    async fn list_products(&self) -> StoreResult<Vec<ProductRecord>> {
        self.list_kind(EntityKind::Product).await
    }

    async fn list_categories(&self) -> StoreResult<Vec<CategoryRecord>> {
        self.list_kind(EntityKind::Category).await
    }

    async fn get_product(&self, id: &str) -> StoreResult<Option<ProductRecord>> {
        self.get_kind(EntityKind::Product, id).await
    }

    async fn get_category(&self, id: &str) -> StoreResult<Option<CategoryRecord>> {
        self.get_kind(EntityKind::Category, id).await
    }

    async fn save_product(&self, record: &ProductRecord) -> StoreResult<()> {
        self.save_kind(EntityKind::Product, record).await
    }

    async fn save_category(&self, record: &CategoryRecord) -> StoreResult<()> {
        self.save_kind(EntityKind::Category, record).await
    }

    async fn delete_product(&self, id: &str) -> StoreResult<()> {
        self.delete_kind(EntityKind::Product, id).await
    }

    async fn delete_category(&self, id: &str) -> StoreResult<()> {
        self.delete_kind(EntityKind::Category, id).await
    }

    async fn max_rev(&self) -> StoreResult<u64> {
        let max: i64 = sqlx::query_scalar("SELECT COALESCE(MAX(rev), 0) FROM catalog_entities")
            .fetch_one(&self.pool)
            .await?;

        Ok(u64::try_from(max).unwrap_or(0))
    }
}

#[derive(sqlx::FromRow)]
struct EntityRow {
    id: String,
    rev: i64,
    updated_by: String,
    checksum: String,
    updated_at: String,
    deleted_at: Option<String>,
    payload: String,
}

impl EntityRow {
    fn into_record<T: DeserializeOwned>(self, kind: EntityKind) -> StoreResult<SyncRecord<T>> {
        let corrupt = |reason: String| StorageError::CorruptRecord {
            kind,
            id: self.id.clone(),
            reason,
        };

        let rev = u64::try_from(self.rev)
            .map_err(|_| corrupt(format!("negative rev {}", self.rev)))?;
        let updated_by = self.updated_by.parse().map_err(corrupt)?;
        let updated_at = parse_timestamp(&self.updated_at).map_err(corrupt)?;
        let deleted_at = self
            .deleted_at
            .as_deref()
            .map(parse_timestamp)
            .transpose()
            .map_err(corrupt)?;
        let data = serde_json::from_str(&self.payload)?;

        Ok(SyncRecord {
            id: self.id,
            rev,
            updated_by,
            checksum: self.checksum,
            updated_at,
            deleted_at,
            data,
        })
    }
}

fn parse_timestamp(s: &str) -> Result<DateTime<Utc>, String> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| format!("bad timestamp '{}': {}", s, e))
}
