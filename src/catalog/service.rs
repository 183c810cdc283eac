//! Local catalog edits
//!
//! Edge-side tooling mutates the catalog through this service so every write
//! carries local provenance, a fresh revision and checksum, and is picked up
//! by the next pull.

use std::sync::Arc;

use chrono::Utc;
use uuid::Uuid;

use super::{next_rev, CatalogEntity, Origin, SyncRecord};
use crate::error::{AppError, Result};
use crate::store::LocalStore;

const BOOKKEEPING_KEYS: [&str; 6] = [
    "id",
    "rev",
    "updatedBy",
    "checksum",
    "updatedAt",
    "deletedAt",
];

/// Local edit path over a store
#[derive(Clone)]
pub struct CatalogService {
    store: Arc<dyn LocalStore>,
}

impl CatalogService {
    pub fn new(store: Arc<dyn LocalStore>) -> Self {
        Self { store }
    }

    /// List records, tombstones only when asked for
    pub async fn list<T: CatalogEntity>(&self, include_deleted: bool) -> Result<Vec<SyncRecord<T>>> {
        let mut records: Vec<SyncRecord<T>> = T::list(self.store.as_ref())
            .await?
            .into_iter()
            .filter(|r| include_deleted || !r.is_deleted())
            .collect();
        records.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(records)
    }

    /// Get a live record
    pub async fn get<T: CatalogEntity>(&self, id: &str) -> Result<SyncRecord<T>> {
        T::load(self.store.as_ref(), id)
            .await?
            .filter(|r| !r.is_deleted())
            .ok_or_else(|| AppError::NotFound(format!("{} not found: {}", T::KIND, id)))
    }

    /// Create a record under a generated id
    pub async fn create<T: CatalogEntity>(&self, data: T) -> Result<SyncRecord<T>> {
        let id = Uuid::new_v4().to_string();
        self.upsert(&id, data).await
    }

    /// Create or replace a record. Editing a tombstone revives it.
    ///
    /// Bookkeeping keys in the payload are dropped; the service stamps its own.
    pub async fn upsert<T: CatalogEntity>(&self, id: &str, mut data: T) -> Result<SyncRecord<T>> {
        if id.trim().is_empty() {
            return Err(AppError::BadRequest("id must not be empty".to_string()));
        }

        let extra = data.extra_mut();
        for key in BOOKKEEPING_KEYS {
            extra.remove(key);
        }

        let store = self.store.as_ref();
        let previous = T::load(store, id).await?;
        let previous_rev = previous.as_ref().map(|p| p.rev);
        let high_water = store.max_rev().await?;
        if next_rev(previous_rev.unwrap_or(0).max(high_water)).is_none() {
            return Err(revision_space_exhausted());
        }

        let record = SyncRecord::local_edit(id, data, previous.as_ref(), high_water)
            .map_err(|e| AppError::Internal(e.to_string()))?;
        T::save(store, &record).await?;

        tracing::info!(
            entity = %T::KIND,
            id = %id,
            previous_rev = ?previous_rev,
            rev = record.rev,
            "Recorded local edit"
        );

        Ok(record)
    }

    /// Tombstone a record so the deletion propagates on the next pull
    pub async fn delete<T: CatalogEntity>(&self, id: &str) -> Result<SyncRecord<T>> {
        let store = self.store.as_ref();
        let current = T::load(store, id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("{} not found: {}", T::KIND, id)))?;

        if current.is_deleted() {
            return Ok(current);
        }

        let previous_rev = current.rev;
        let rev = next_rev(previous_rev.max(store.max_rev().await?))
            .ok_or_else(revision_space_exhausted)?;
        let tombstone = current
            .tombstone(Origin::Local, rev, Utc::now())
            .map_err(|e| AppError::Internal(e.to_string()))?;
        T::save(store, &tombstone).await?;

        tracing::info!(entity = %T::KIND, id = %id, previous_rev, rev, "Recorded local delete");

        Ok(tombstone)
    }
}

fn revision_space_exhausted() -> AppError {
    AppError::Internal("revision space exhausted".to_string())
}
