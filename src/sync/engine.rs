//! Sync engine
//!
//! One explicitly constructed instance per local store. Wires the change
//! reader and applier together, remembers how far the cloud has pulled, and
//! garbage-collects tombstones the cloud has already observed.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};

use super::applier::CloudChangeApplier;
use super::conflict::ConflictResolver;
use super::error::SyncError;
use super::reader::LocalChangeReader;
use super::types::{ChangeBatch, PushBatch, PushResult, SyncStatus};
use crate::catalog::{CatalogEntity, Category, Origin, Product, SyncRecord};
use crate::store::{LocalStore, StoreResult};

/// Default cap on changes per pull
pub const DEFAULT_MAX_BATCH: usize = 500;

pub struct SyncEngine {
    store: Arc<dyn LocalStore>,
    reader: LocalChangeReader,
    applier: CloudChangeApplier,
    max_batch: usize,
    /// Highest `sinceRev` the cloud has pulled from
    acknowledged_rev: AtomicU64,
}

impl SyncEngine {
    pub fn new(store: Arc<dyn LocalStore>, resolver: ConflictResolver) -> Self {
        Self {
            reader: LocalChangeReader::new(store.clone()),
            applier: CloudChangeApplier::new(store.clone(), resolver),
            store,
            max_batch: DEFAULT_MAX_BATCH,
            acknowledged_rev: AtomicU64::new(0),
        }
    }

    /// Cap the number of changes a single pull may return
    pub fn with_max_batch(mut self, max_batch: usize) -> Self {
        self.max_batch = max_batch.max(1);
        self
    }

    pub fn acknowledged_rev(&self) -> u64 {
        self.acknowledged_rev.load(Ordering::SeqCst)
    }

    /// Harvest local changes above `since_rev`.
    ///
    /// A pull from `since_rev` means the caller holds everything up to it, so
    /// the watermark is recorded as acknowledged.
    pub async fn pull(&self, since_rev: u64, limit: usize) -> Result<ChangeBatch, SyncError> {
        if limit == 0 {
            return Err(SyncError::InvalidLimit(limit));
        }

        let batch = self.reader.read(since_rev, limit.min(self.max_batch)).await?;
        self.acknowledged_rev.fetch_max(since_rev, Ordering::SeqCst);

        tracing::info!(
            since_rev,
            latest_rev = batch.latest_rev,
            changes = batch.changes.len(),
            has_more = batch.has_more,
            "Served pull"
        );

        Ok(batch)
    }

    /// Apply cloud changes
    pub async fn push(&self, batch: PushBatch) -> PushResult {
        self.applier.apply(batch).await
    }

    pub async fn status(&self) -> Result<SyncStatus, SyncError> {
        let products = Product::list(self.store.as_ref()).await?;
        let categories = Category::list(self.store.as_ref()).await?;
        let acknowledged_rev = self.acknowledged_rev();

        let mut status = SyncStatus {
            acknowledged_rev,
            ..Default::default()
        };
        tally(&mut status, &products, acknowledged_rev);
        tally(&mut status, &categories, acknowledged_rev);
        status.products = products.len();
        status.categories = categories.len();
        status.latest_rev = status.latest_rev.max(acknowledged_rev);

        Ok(status)
    }

    /// Physically remove tombstones deleted before `older_than` that the cloud
    /// has observed: cloud-originated ones, and local ones at or below the
    /// acknowledged watermark.
    pub async fn purge_tombstones(&self, older_than: DateTime<Utc>) -> Result<usize, SyncError> {
        let acknowledged_rev = self.acknowledged_rev();
        let purged = self.purge_kind::<Product>(older_than, acknowledged_rev).await?
            + self.purge_kind::<Category>(older_than, acknowledged_rev).await?;

        if purged > 0 {
            tracing::info!(purged, acknowledged_rev, %older_than, "Purged observed tombstones");
        }

        Ok(purged)
    }

    async fn purge_kind<T: CatalogEntity>(
        &self,
        older_than: DateTime<Utc>,
        acknowledged_rev: u64,
    ) -> StoreResult<usize> {
        let store = self.store.as_ref();
        let mut purged = 0;

        for record in T::list(store).await? {
            if is_purgeable(&record, older_than, acknowledged_rev) {
                T::purge(store, &record.id).await?;
                tracing::debug!(entity = %T::KIND, id = %record.id, rev = record.rev, "Purged tombstone");
                purged += 1;
            }
        }

        Ok(purged)
    }
}

fn is_purgeable<T>(record: &SyncRecord<T>, older_than: DateTime<Utc>, acknowledged_rev: u64) -> bool {
    let Some(deleted_at) = record.deleted_at else {
        return false;
    };
    if deleted_at >= older_than {
        return false;
    }
    match record.updated_by {
        Origin::Cloud => true,
        Origin::Local => record.rev <= acknowledged_rev,
    }
}

fn tally<T>(status: &mut SyncStatus, records: &[SyncRecord<T>], acknowledged_rev: u64) {
    for record in records {
        status.latest_rev = status.latest_rev.max(record.rev);
        if record.is_deleted() {
            status.tombstones += 1;
        }
        if record.updated_by == Origin::Local && record.rev > acknowledged_rev {
            status.pending_local += 1;
        }
    }
}
