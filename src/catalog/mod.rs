//! Catalog module
//!
//! Products and categories with sync bookkeeping, plus the local edit path
//! used by edge-side tooling.

mod service;
mod types;

pub use service::CatalogService;
pub use types::{
    next_rev, Category, CategoryRecord, EntityKind, Origin, Product, ProductRecord, SyncRecord,
    MAX_REV,
};

use std::fmt::Debug;

use futures::future::BoxFuture;
use serde::{de::DeserializeOwned, Serialize};
use serde_json::{Map, Value};

use crate::store::{LocalStore, StoreResult};
use crate::sync::{ChangeOp, ChangeRecord};

/// Per-kind access to the local store.
///
/// Lets the reader, applier and catalog service work over either entity kind
/// while the store keeps its per-kind capability surface.
pub trait CatalogEntity:
    Serialize + DeserializeOwned + Clone + Debug + Send + Sync + 'static
{
    const KIND: EntityKind;

    fn load<'a>(
        store: &'a dyn LocalStore,
        id: &'a str,
    ) -> BoxFuture<'a, StoreResult<Option<SyncRecord<Self>>>>;

    fn list(store: &dyn LocalStore) -> BoxFuture<'_, StoreResult<Vec<SyncRecord<Self>>>>;

    fn save<'a>(
        store: &'a dyn LocalStore,
        record: &'a SyncRecord<Self>,
    ) -> BoxFuture<'a, StoreResult<()>>;

    fn purge<'a>(store: &'a dyn LocalStore, id: &'a str) -> BoxFuture<'a, StoreResult<()>>;

    fn into_change(op: ChangeOp, record: SyncRecord<Self>) -> ChangeRecord;

    /// Fields kept verbatim beyond the modeled ones
    fn extra_mut(&mut self) -> &mut Map<String, Value>;
}

impl CatalogEntity for Product {
    const KIND: EntityKind = EntityKind::Product;

    fn load<'a>(
        store: &'a dyn LocalStore,
        id: &'a str,
    ) -> BoxFuture<'a, StoreResult<Option<ProductRecord>>> {
        store.get_product(id)
    }

    fn list(store: &dyn LocalStore) -> BoxFuture<'_, StoreResult<Vec<ProductRecord>>> {
        store.list_products()
    }

    fn save<'a>(store: &'a dyn LocalStore, record: &'a ProductRecord) -> BoxFuture<'a, StoreResult<()>> {
        store.save_product(record)
    }

    fn purge<'a>(store: &'a dyn LocalStore, id: &'a str) -> BoxFuture<'a, StoreResult<()>> {
        store.delete_product(id)
    }

    fn into_change(op: ChangeOp, record: ProductRecord) -> ChangeRecord {
        ChangeRecord::Product { op, data: record }
    }

    fn extra_mut(&mut self) -> &mut Map<String, Value> {
        &mut self.extra
    }
}

impl CatalogEntity for Category {
    const KIND: EntityKind = EntityKind::Category;

    fn load<'a>(
        store: &'a dyn LocalStore,
        id: &'a str,
    ) -> BoxFuture<'a, StoreResult<Option<CategoryRecord>>> {
        store.get_category(id)
    }

    fn list(store: &dyn LocalStore) -> BoxFuture<'_, StoreResult<Vec<CategoryRecord>>> {
        store.list_categories()
    }

    fn save<'a>(
        store: &'a dyn LocalStore,
        record: &'a CategoryRecord,
    ) -> BoxFuture<'a, StoreResult<()>> {
        store.save_category(record)
    }

    fn purge<'a>(store: &'a dyn LocalStore, id: &'a str) -> BoxFuture<'a, StoreResult<()>> {
        store.delete_category(id)
    }

    fn into_change(op: ChangeOp, record: CategoryRecord) -> ChangeRecord {
        ChangeRecord::Category { op, data: record }
    }

    fn extra_mut(&mut self) -> &mut Map<String, Value> {
        &mut self.extra
    }
}
