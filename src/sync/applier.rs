//! Cloud change applier
//!
//! Applies a pushed batch record by record. Each record is independent: a
//! conflict rejects only that record, and a storage failure is logged and
//! skipped without aborting the batch.
//!
//! Decisions depend only on the stored state, so replaying a batch after a
//! partial failure reaches the same outcomes.

use std::sync::Arc;

use chrono::Utc;

use super::content_hash::checksum;
use super::conflict::ConflictResolver;
use super::error::{ApplyFailure, RecordApplyError};
use super::types::{
    ChangeOp, ChangeRecord, ConflictRecord, PushBatch, PushResult, RecordFailure, Winner,
};
use crate::catalog::{next_rev, CatalogEntity, Origin, SyncRecord};
use crate::error::StorageError;
use crate::store::LocalStore;

/// Outcome of a single record
#[derive(Debug, Clone, PartialEq)]
enum Outcome {
    /// Written at `rev` over the stored revision, if any
    Applied { rev: u64, current_rev: Option<u64> },
    /// Already in the store; nothing written
    Replayed { rev: u64 },
    /// Delete for an entity that does not exist locally
    Absent { rev: u64 },
    /// Local version kept
    Conflicted(ConflictRecord),
}

/// Commits cloud-originated changes to the local store
pub struct CloudChangeApplier {
    store: Arc<dyn LocalStore>,
    resolver: ConflictResolver,
}

impl CloudChangeApplier {
    pub fn new(store: Arc<dyn LocalStore>, resolver: ConflictResolver) -> Self {
        Self { store, resolver }
    }

    /// Apply every change in the batch, in order
    pub async fn apply(&self, batch: PushBatch) -> PushResult {
        let client_rev = batch.client_rev;
        let total = batch.changes.len();
        let mut result = PushResult::default();
        let mut conflicts = Vec::new();

        for change in batch.changes {
            let entity = change.kind();
            let op = change.op();
            let id = change.id().to_string();
            let incoming_rev = change.rev();

            let outcome = match change {
                ChangeRecord::Product { op, data } => self.apply_one(op, data, client_rev).await,
                ChangeRecord::Category { op, data } => self.apply_one(op, data, client_rev).await,
            };

            match outcome {
                Ok(Outcome::Applied { rev, current_rev }) => {
                    tracing::info!(
                        outcome = "applied",
                        entity = %entity,
                        id = %id,
                        ?op,
                        current_rev = ?current_rev,
                        incoming_rev,
                        assigned_rev = rev,
                        "Applied cloud change"
                    );
                    result.applied_count += 1;
                    result.latest_rev = result.latest_rev.max(rev);
                }
                Ok(Outcome::Replayed { rev }) | Ok(Outcome::Absent { rev }) => {
                    tracing::debug!(
                        outcome = "replayed",
                        entity = %entity,
                        id = %id,
                        ?op,
                        incoming_rev,
                        assigned_rev = rev,
                        "Cloud change already reflected locally"
                    );
                    result.applied_count += 1;
                    result.latest_rev = result.latest_rev.max(rev);
                }
                Ok(Outcome::Conflicted(conflict)) => {
                    tracing::info!(
                        outcome = "conflicted",
                        entity = %entity,
                        id = %id,
                        current_rev = conflict.current_rev,
                        incoming_rev = conflict.incoming_rev,
                        decided = ?conflict.decided,
                        strategy = ?self.resolver.strategy(),
                        "Rejected cloud change"
                    );
                    conflicts.push(conflict);
                }
                Err(e) => {
                    tracing::warn!(
                        outcome = "errored",
                        entity = %entity,
                        id = %id,
                        current_rev = ?e.current_rev,
                        incoming_rev,
                        client_rev,
                        error = %e.source,
                        "Failed to apply cloud change"
                    );
                    result.errors.push(RecordFailure {
                        entity,
                        id,
                        incoming_rev,
                        message: e.to_string(),
                    });
                }
            }
        }

        if !conflicts.is_empty() {
            result.conflicts = Some(conflicts);
        }

        tracing::info!(
            client_rev,
            total,
            applied = result.applied_count,
            conflicts = result.conflicts.as_ref().map_or(0, Vec::len),
            errors = result.errors.len(),
            latest_rev = result.latest_rev,
            "Push batch processed"
        );

        result
    }

    async fn apply_one<T: CatalogEntity>(
        &self,
        op: ChangeOp,
        incoming: SyncRecord<T>,
        client_rev: u64,
    ) -> Result<Outcome, RecordApplyError> {
        let current = T::load(self.store.as_ref(), &incoming.id)
            .await
            .map_err(|e| apply_error::<T>(&incoming, None, e))?;

        match op {
            ChangeOp::Delete => self.apply_delete(incoming, current, client_rev).await,
            ChangeOp::Upsert => self.apply_upsert(incoming, current, client_rev).await,
        }
    }

    async fn apply_delete<T: CatalogEntity>(
        &self,
        incoming: SyncRecord<T>,
        current: Option<SyncRecord<T>>,
        client_rev: u64,
    ) -> Result<Outcome, RecordApplyError> {
        let Some(current) = current else {
            let rev = next_rev(client_rev)
                .ok_or_else(|| overflow::<T>(&incoming, None, client_rev))?;
            return Ok(Outcome::Absent { rev });
        };

        if current.is_deleted() && current.updated_by == Origin::Cloud {
            return Ok(Outcome::Replayed { rev: current.rev });
        }

        let current_rev = current.rev;
        let base = current_rev.max(client_rev);
        let new_rev =
            next_rev(base).ok_or_else(|| overflow::<T>(&incoming, Some(current_rev), base))?;
        let deleted_at = incoming.deleted_at.unwrap_or_else(Utc::now);

        let tombstone = current
            .tombstone(Origin::Cloud, new_rev, deleted_at)
            .map_err(|e| {
                apply_error::<T>(&incoming, Some(current_rev), StorageError::from(e))
            })?;

        T::save(self.store.as_ref(), &tombstone)
            .await
            .map_err(|e| apply_error::<T>(&incoming, Some(current_rev), e))?;

        Ok(Outcome::Applied {
            rev: new_rev,
            current_rev: Some(current_rev),
        })
    }

    async fn apply_upsert<T: CatalogEntity>(
        &self,
        incoming: SyncRecord<T>,
        current: Option<SyncRecord<T>>,
        client_rev: u64,
    ) -> Result<Outcome, RecordApplyError> {
        let current_rev = current.as_ref().map(|c| c.rev);
        let incoming_sum = checksum(&incoming)
            .map_err(|e| apply_error::<T>(&incoming, current_rev, StorageError::from(e)))?;

        if let Some(current) = &current {
            if current.updated_by == Origin::Cloud && current.checksum == incoming_sum {
                return Ok(Outcome::Replayed { rev: current.rev });
            }

            if current.rev != incoming.rev {
                let resolution = self.resolver.resolve(current, &incoming);
                if resolution.winner == Winner::Current {
                    return Ok(Outcome::Conflicted(ConflictRecord {
                        entity: T::KIND,
                        id: incoming.id.clone(),
                        current_rev: current.rev,
                        incoming_rev: incoming.rev,
                        decided: Winner::Current,
                    }));
                }
            }
        }

        let base = current_rev.unwrap_or(0).max(client_rev);
        let new_rev = next_rev(base).ok_or_else(|| overflow::<T>(&incoming, current_rev, base))?;
        let record = SyncRecord {
            id: incoming.id.clone(),
            rev: new_rev,
            updated_by: Origin::Cloud,
            checksum: incoming_sum,
            updated_at: Utc::now(),
            deleted_at: incoming.deleted_at,
            data: incoming.data.clone(),
        };

        T::save(self.store.as_ref(), &record)
            .await
            .map_err(|e| apply_error::<T>(&incoming, current_rev, e))?;

        Ok(Outcome::Applied {
            rev: new_rev,
            current_rev,
        })
    }
}

fn apply_error<T: CatalogEntity>(
    incoming: &SyncRecord<T>,
    current_rev: Option<u64>,
    source: impl Into<ApplyFailure>,
) -> RecordApplyError {
    RecordApplyError {
        entity: T::KIND,
        id: incoming.id.clone(),
        incoming_rev: incoming.rev,
        current_rev,
        source: source.into(),
    }
}

fn overflow<T: CatalogEntity>(
    incoming: &SyncRecord<T>,
    current_rev: Option<u64>,
    base: u64,
) -> RecordApplyError {
    apply_error::<T>(incoming, current_rev, ApplyFailure::RevisionOverflow { base })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{CategoryRecord, EntityKind, Product, ProductRecord, MAX_REV};
    use crate::store::{MemoryStore, StoreResult};
    use async_trait::async_trait;
    use chrono::{DateTime, Duration};

    fn product(id: &str, rev: u64, name: &str, origin: Origin, at: DateTime<Utc>) -> ProductRecord {
        let mut record = SyncRecord {
            id: id.to_string(),
            rev,
            updated_by: origin,
            checksum: String::new(),
            updated_at: at,
            deleted_at: None,
            data: Product {
                name: name.to_string(),
                ..Default::default()
            },
        };
        record.refresh_checksum().unwrap();
        record
    }

    fn upsert(record: ProductRecord) -> ChangeRecord {
        ChangeRecord::Product {
            op: ChangeOp::Upsert,
            data: record,
        }
    }

    fn delete(id: &str, rev: u64) -> ChangeRecord {
        ChangeRecord::Product {
            op: ChangeOp::Delete,
            data: serde_json::from_value(serde_json::json!({ "id": id, "rev": rev })).unwrap(),
        }
    }

    fn applier(store: Arc<dyn LocalStore>) -> CloudChangeApplier {
        CloudChangeApplier::new(store, ConflictResolver::default())
    }

    #[tokio::test]
    async fn test_upsert_new_entity() {
        let store = Arc::new(MemoryStore::new());
        let incoming = product("p-1", 3, "Lamp", Origin::Cloud, Utc::now());

        let result = applier(store.clone())
            .apply(PushBatch {
                client_rev: 5,
                changes: vec![upsert(incoming.clone())],
            })
            .await;

        assert_eq!(result.applied_count, 1);
        assert_eq!(result.latest_rev, 6);
        assert!(result.conflicts.is_none());

        let stored = store.get_product("p-1").await.unwrap().unwrap();
        assert_eq!(stored.rev, 6);
        assert_eq!(stored.updated_by, Origin::Cloud);
        assert_eq!(stored.checksum, checksum(&stored).unwrap());
        assert_eq!(stored.data.name, "Lamp");
    }

    #[tokio::test]
    async fn test_newer_local_version_wins_conflict() {
        let store = Arc::new(MemoryStore::new());
        let now = Utc::now();
        store
            .save_product(&product("P", 7, "local edit", Origin::Local, now))
            .await
            .unwrap();

        let incoming = product("P", 5, "cloud edit", Origin::Cloud, now - Duration::minutes(5));
        let result = applier(store.clone())
            .apply(PushBatch {
                client_rev: 5,
                changes: vec![upsert(incoming)],
            })
            .await;

        assert_eq!(result.applied_count, 0);
        assert_eq!(result.latest_rev, 0);
        assert_eq!(
            result.conflicts,
            Some(vec![ConflictRecord {
                entity: EntityKind::Product,
                id: "P".to_string(),
                current_rev: 7,
                incoming_rev: 5,
                decided: Winner::Current,
            }])
        );

        let stored = store.get_product("P").await.unwrap().unwrap();
        assert_eq!(stored.rev, 7);
        assert_eq!(stored.data.name, "local edit");
    }

    #[tokio::test]
    async fn test_newer_cloud_version_wins_conflict() {
        let store = Arc::new(MemoryStore::new());
        let now = Utc::now();
        store
            .save_product(&product("P", 7, "local edit", Origin::Local, now - Duration::minutes(5)))
            .await
            .unwrap();

        let incoming = product("P", 5, "cloud edit", Origin::Cloud, now);
        let result = applier(store.clone())
            .apply(PushBatch {
                client_rev: 5,
                changes: vec![upsert(incoming)],
            })
            .await;

        assert_eq!(result.applied_count, 1);
        assert_eq!(result.latest_rev, 8);

        let stored = store.get_product("P").await.unwrap().unwrap();
        assert_eq!(stored.rev, 8);
        assert_eq!(stored.updated_by, Origin::Cloud);
        assert_eq!(stored.data.name, "cloud edit");
    }

    #[tokio::test]
    async fn test_matching_rev_applies_without_resolver() {
        let store = Arc::new(MemoryStore::new());
        let now = Utc::now();
        store
            .save_product(&product("P", 4, "local", Origin::Local, now))
            .await
            .unwrap();

        // older timestamp, but revisions agree so there is nothing to resolve
        let incoming = product("P", 4, "cloud", Origin::Cloud, now - Duration::hours(1));
        let result = applier(store.clone())
            .apply(PushBatch {
                client_rev: 2,
                changes: vec![upsert(incoming)],
            })
            .await;

        assert_eq!(result.applied_count, 1);
        assert_eq!(result.latest_rev, 5);
    }

    #[tokio::test]
    async fn test_delete_absent_entity() {
        let store = Arc::new(MemoryStore::new());
        let batch = PushBatch {
            client_rev: 5,
            changes: vec![delete("P", 5)],
        };

        let first = applier(store.clone()).apply(batch.clone()).await;
        assert_eq!(first.applied_count, 1);
        assert_eq!(first.latest_rev, 6);
        assert!(store.get_product("P").await.unwrap().is_none());

        let second = applier(store.clone()).apply(batch).await;
        assert_eq!(second, first);
        assert!(store.get_product("P").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_delete_tombstones_existing_entity() {
        let store = Arc::new(MemoryStore::new());
        store
            .save_product(&product("P", 9, "lamp", Origin::Local, Utc::now()))
            .await
            .unwrap();

        let batch = PushBatch {
            client_rev: 5,
            changes: vec![delete("P", 5)],
        };
        let result = applier(store.clone()).apply(batch.clone()).await;
        assert_eq!(result.applied_count, 1);
        assert_eq!(result.latest_rev, 10);

        let stored = store.get_product("P").await.unwrap().unwrap();
        assert!(stored.is_deleted());
        assert_eq!(stored.rev, 10);
        assert_eq!(stored.updated_by, Origin::Cloud);
        assert_eq!(stored.data.name, "lamp");

        let replay = applier(store.clone()).apply(batch).await;
        assert_eq!(replay.applied_count, 1);
        assert_eq!(store.get_product("P").await.unwrap().unwrap(), stored);
    }

    #[tokio::test]
    async fn test_replayed_batch_is_idempotent() {
        let store = Arc::new(MemoryStore::new());
        let t = Utc::now() - Duration::minutes(1);
        let batch = PushBatch {
            client_rev: 10,
            changes: vec![
                upsert(product("p-1", 1, "one", Origin::Cloud, t)),
                upsert(product("p-2", 1, "two", Origin::Cloud, t)),
                delete("p-3", 1),
            ],
        };

        let first = applier(store.clone()).apply(batch.clone()).await;
        assert_eq!(first.applied_count, 3);
        let snapshot = {
            let mut all = store.list_products().await.unwrap();
            all.sort_by(|a, b| a.id.cmp(&b.id));
            all
        };

        let second = applier(store.clone()).apply(batch).await;
        assert_eq!(second.applied_count, 3);
        assert!(second.conflicts.is_none());

        let mut after = store.list_products().await.unwrap();
        after.sort_by(|a, b| a.id.cmp(&b.id));
        assert_eq!(after, snapshot);
    }

    #[tokio::test]
    async fn test_revisions_strictly_increase() {
        let store = Arc::new(MemoryStore::new());
        let applier = applier(store.clone());
        let mut last = 0;

        for (client_rev, name) in [(0, "a"), (0, "b"), (3, "c"), (1, "d")] {
            let current = store.get_product("p-1").await.unwrap();
            let incoming_rev = current.map(|c| c.rev).unwrap_or(1);
            applier
                .apply(PushBatch {
                    client_rev,
                    changes: vec![upsert(product("p-1", incoming_rev, name, Origin::Cloud, Utc::now()))],
                })
                .await;

            let rev = store.get_product("p-1").await.unwrap().unwrap().rev;
            assert!(rev > last, "rev {} did not advance past {}", rev, last);
            last = rev;
        }
    }

    #[tokio::test]
    async fn test_categories_are_applied() {
        let store = Arc::new(MemoryStore::new());
        let data: CategoryRecord = serde_json::from_value(serde_json::json!({
            "id": "c-1", "rev": 2, "name": "Kitchen", "position": 3
        }))
        .unwrap();

        let result = applier(store.clone())
            .apply(PushBatch {
                client_rev: 2,
                changes: vec![ChangeRecord::Category {
                    op: ChangeOp::Upsert,
                    data,
                }],
            })
            .await;

        assert_eq!(result.applied_count, 1);
        let stored = store.get_category("c-1").await.unwrap().unwrap();
        assert_eq!(stored.data.name, "Kitchen");
        assert_eq!(stored.data.position, 3);
        assert_eq!(stored.rev, 3);
    }

    /// Fails every write for one product id
    struct FlakyStore {
        inner: MemoryStore,
        poisoned: String,
    }

    #[async_trait]
    impl LocalStore for FlakyStore {
        async fn list_products(&self) -> StoreResult<Vec<ProductRecord>> {
            self.inner.list_products().await
        }
        async fn list_categories(&self) -> StoreResult<Vec<CategoryRecord>> {
            self.inner.list_categories().await
        }
        async fn get_product(&self, id: &str) -> StoreResult<Option<ProductRecord>> {
            self.inner.get_product(id).await
        }
        async fn get_category(&self, id: &str) -> StoreResult<Option<CategoryRecord>> {
            self.inner.get_category(id).await
        }
        async fn save_product(&self, record: &ProductRecord) -> StoreResult<()> {
            if record.id == self.poisoned {
                return Err(StorageError::Unavailable("write rejected".to_string()));
            }
            self.inner.save_product(record).await
        }
        async fn save_category(&self, record: &CategoryRecord) -> StoreResult<()> {
            self.inner.save_category(record).await
        }
        async fn delete_product(&self, id: &str) -> StoreResult<()> {
            self.inner.delete_product(id).await
        }
        async fn delete_category(&self, id: &str) -> StoreResult<()> {
            self.inner.delete_category(id).await
        }
    }

    #[tokio::test]
    async fn test_storage_failure_is_isolated() {
        let inner = MemoryStore::new();
        let store = Arc::new(FlakyStore {
            inner: inner.clone(),
            poisoned: "p-bad".to_string(),
        });
        let t = Utc::now();

        let result = applier(store)
            .apply(PushBatch {
                client_rev: 1,
                changes: vec![
                    upsert(product("p-1", 1, "ok", Origin::Cloud, t)),
                    upsert(product("p-bad", 1, "boom", Origin::Cloud, t)),
                    upsert(product("p-2", 1, "ok too", Origin::Cloud, t)),
                ],
            })
            .await;

        assert_eq!(result.applied_count, 2);
        assert!(result.conflicts.is_none());
        assert_eq!(result.errors.len(), 1);
        assert_eq!(result.errors[0].id, "p-bad");
        assert_eq!(result.errors[0].incoming_rev, 1);
        assert!(inner.get_product("p-1").await.unwrap().is_some());
        assert!(inner.get_product("p-bad").await.unwrap().is_none());
        assert!(inner.get_product("p-2").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_category_and_product_ids_do_not_collide() {
        let store = Arc::new(MemoryStore::new());
        let category: CategoryRecord = serde_json::from_value(serde_json::json!({
            "id": "x", "rev": 40, "updatedBy": "local"
        }))
        .unwrap();
        store.save_category(&category).await.unwrap();

        let result = applier(store.clone())
            .apply(PushBatch {
                client_rev: 1,
                changes: vec![upsert(product("x", 1, "product x", Origin::Cloud, Utc::now()))],
            })
            .await;

        assert_eq!(result.applied_count, 1);
        assert_eq!(store.get_product("x").await.unwrap().unwrap().rev, 2);
        assert_eq!(store.get_category("x").await.unwrap().unwrap().rev, 40);
    }

    #[tokio::test]
    async fn test_unmodeled_fields_survive_push() {
        let store = Arc::new(MemoryStore::new());
        let incoming: ProductRecord = serde_json::from_value(serde_json::json!({
            "id": "p-1", "rev": 1, "name": "Lamp", "price": 19.99, "brand": "Acme"
        }))
        .unwrap();
        let expected_sum = checksum(&incoming).unwrap();

        let result = applier(store.clone())
            .apply(PushBatch {
                client_rev: 1,
                changes: vec![upsert(incoming)],
            })
            .await;
        assert_eq!(result.applied_count, 1);

        let stored = store.get_product("p-1").await.unwrap().unwrap();
        assert_eq!(stored.data.extra["price"], 19.99);
        assert_eq!(stored.data.extra["brand"], "Acme");
        assert_eq!(stored.checksum, expected_sum);
        assert_eq!(checksum(&stored).unwrap(), expected_sum);
    }

    #[tokio::test]
    async fn test_exhausted_revision_space_is_a_record_failure() {
        let store = Arc::new(MemoryStore::new());
        let applier = applier(store.clone());

        let result = applier
            .apply(PushBatch {
                client_rev: u64::MAX,
                changes: vec![
                    delete("p-gone", 1),
                    upsert(product("p-1", 1, "Lamp", Origin::Cloud, Utc::now())),
                ],
            })
            .await;

        assert_eq!(result.applied_count, 0);
        assert_eq!(result.latest_rev, 0);
        assert_eq!(result.errors.len(), 2);
        assert_eq!(result.errors[0].id, "p-gone");
        assert!(store.get_product("p-1").await.unwrap().is_none());

        // the largest storable revision is still usable
        let result = applier
            .apply(PushBatch {
                client_rev: MAX_REV - 1,
                changes: vec![upsert(product("p-1", 1, "Lamp", Origin::Cloud, Utc::now()))],
            })
            .await;
        assert_eq!(result.applied_count, 1);
        assert_eq!(result.latest_rev, MAX_REV);

        let result = applier
            .apply(PushBatch {
                client_rev: 0,
                changes: vec![delete("p-1", MAX_REV)],
            })
            .await;
        assert_eq!(result.applied_count, 0);
        assert_eq!(result.errors.len(), 1);
        assert!(!store.get_product("p-1").await.unwrap().unwrap().is_deleted());
    }

    #[tokio::test]
    async fn test_applied_outcome_carries_stored_rev() {
        let store = Arc::new(MemoryStore::new());
        let applier = applier(store.clone());
        let t = Utc::now();

        let first = applier
            .apply_one(ChangeOp::Upsert, product("p-1", 1, "Lamp", Origin::Cloud, t), 3)
            .await
            .unwrap();
        assert_eq!(first, Outcome::Applied { rev: 4, current_rev: None });

        let second = applier
            .apply_one(ChangeOp::Upsert, product("p-1", 4, "Desk lamp", Origin::Cloud, t), 4)
            .await
            .unwrap();
        assert_eq!(second, Outcome::Applied { rev: 5, current_rev: Some(4) });

        let deleted = applier
            .apply_one(ChangeOp::Delete, product("p-1", 5, "", Origin::Cloud, t), 5)
            .await
            .unwrap();
        assert_eq!(deleted, Outcome::Applied { rev: 6, current_rev: Some(5) });
    }
}
