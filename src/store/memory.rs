//! In-memory local store

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::{LocalStore, StoreResult};
use crate::catalog::{CategoryRecord, ProductRecord};

/// Process-local store backed by hash maps
#[derive(Clone, Default)]
pub struct MemoryStore {
    inner: Arc<MemoryStoreInner>,
}

#[derive(Default)]
struct MemoryStoreInner {
    products: RwLock<HashMap<String, ProductRecord>>,
    categories: RwLock<HashMap<String, CategoryRecord>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl LocalStore for MemoryStore {
    async fn list_products(&self) -> StoreResult<Vec<ProductRecord>> {
        Ok(self.inner.products.read().await.values().cloned().collect())
    }

    async fn list_categories(&self) -> StoreResult<Vec<CategoryRecord>> {
        Ok(self.inner.categories.read().await.values().cloned().collect())
    }

    async fn get_product(&self, id: &str) -> StoreResult<Option<ProductRecord>> {
        Ok(self.inner.products.read().await.get(id).cloned())
    }

    async fn get_category(&self, id: &str) -> StoreResult<Option<CategoryRecord>> {
        Ok(self.inner.categories.read().await.get(id).cloned())
    }

    async fn save_product(&self, record: &ProductRecord) -> StoreResult<()> {
        self.inner
            .products
            .write()
            .await
            .insert(record.id.clone(), record.clone());
        Ok(())
    }

    async fn save_category(&self, record: &CategoryRecord) -> StoreResult<()> {
        self.inner
            .categories
            .write()
            .await
            .insert(record.id.clone(), record.clone());
        Ok(())
    }

    async fn delete_product(&self, id: &str) -> StoreResult<()> {
        self.inner.products.write().await.remove(id);
        Ok(())
    }

    async fn delete_category(&self, id: &str) -> StoreResult<()> {
        self.inner.categories.write().await.remove(id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{Product, SyncRecord};

    #[tokio::test]
    async fn test_save_get_delete() {
        let store = MemoryStore::new();
        let record = SyncRecord::local_edit("p-1", Product::default(), None, 0).unwrap();

        store.save_product(&record).await.unwrap();
        assert_eq!(store.get_product("p-1").await.unwrap(), Some(record));
        assert_eq!(store.max_rev().await.unwrap(), 1);

        store.delete_product("p-1").await.unwrap();
        assert!(store.get_product("p-1").await.unwrap().is_none());
        assert_eq!(store.max_rev().await.unwrap(), 0);

        // missing ids are fine
        store.delete_product("p-1").await.unwrap();
    }
}
