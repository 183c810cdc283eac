//! Local change reader
//!
//! Harvests locally-originated changes above a revision watermark for the
//! cloud to pull. Read-only: repeating a pull against unchanged state yields
//! the same batch.

use std::sync::Arc;

use super::error::SyncError;
use super::types::{ChangeBatch, ChangeOp, ChangeRecord};
use crate::catalog::{CatalogEntity, Category, Origin, Product, SyncRecord};
use crate::store::LocalStore;

/// Packages local changes into bounded batches
pub struct LocalChangeReader {
    store: Arc<dyn LocalStore>,
}

impl LocalChangeReader {
    pub fn new(store: Arc<dyn LocalStore>) -> Self {
        Self { store }
    }

    /// Read up to `limit` local changes with `rev > since_rev`.
    ///
    /// Products are drained before categories. `latest_rev` covers every
    /// stored entity, including ones left out of this batch.
    pub async fn read(&self, since_rev: u64, limit: usize) -> Result<ChangeBatch, SyncError> {
        if limit == 0 {
            return Err(SyncError::InvalidLimit(limit));
        }

        let products = Product::list(self.store.as_ref()).await?;
        let categories = Category::list(self.store.as_ref()).await?;

        let latest_rev = products
            .iter()
            .map(|p| p.rev)
            .chain(categories.iter().map(|c| c.rev))
            .fold(since_rev, u64::max);

        let mut changes = collect_local(products, since_rev, limit);
        let remaining = limit - changes.len();
        changes.extend(collect_local(categories, since_rev, remaining));

        let has_more = changes.len() == limit;

        tracing::debug!(
            since_rev,
            latest_rev,
            limit,
            returned = changes.len(),
            has_more,
            "Prepared pull batch"
        );

        Ok(ChangeBatch {
            since_rev,
            latest_rev,
            changes,
            has_more,
        })
    }
}

/// Local-origin records above the watermark, oldest first, capped at `budget`
fn collect_local<T: CatalogEntity>(
    records: Vec<SyncRecord<T>>,
    since_rev: u64,
    budget: usize,
) -> Vec<ChangeRecord> {
    let mut pending: Vec<SyncRecord<T>> = records
        .into_iter()
        .filter(|r| r.rev > since_rev && r.updated_by == Origin::Local)
        .collect();
    pending.sort_by(|a, b| a.rev.cmp(&b.rev).then_with(|| a.id.cmp(&b.id)));

    pending
        .into_iter()
        .take(budget)
        .map(|record| {
            let op = if record.is_deleted() {
                ChangeOp::Delete
            } else {
                ChangeOp::Upsert
            };
            T::into_change(op, record)
        })
        .collect()
}
