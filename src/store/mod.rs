//! Local store abstraction
//!
//! The sync engine depends only on this capability surface. Backends:
//! - `SqliteStore`: durable storage on the shared SQLite pool
//! - `MemoryStore`: process-local storage for tests and ephemeral agents
//!
//! Implementations must serialize mutations per entity id; the engine performs
//! read-then-write sequences and relies on the store not losing updates.

mod memory;
mod sqlite;

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

use async_trait::async_trait;

use crate::catalog::{CategoryRecord, ProductRecord};
use crate::error::StorageError;

pub type StoreResult<T> = std::result::Result<T, StorageError>;

/// Durable per-entity-type storage for catalog records
#[async_trait]
pub trait LocalStore: Send + Sync {
    async fn list_products(&self) -> StoreResult<Vec<ProductRecord>>;

    async fn list_categories(&self) -> StoreResult<Vec<CategoryRecord>>;

    async fn get_product(&self, id: &str) -> StoreResult<Option<ProductRecord>>;

    async fn get_category(&self, id: &str) -> StoreResult<Option<CategoryRecord>>;

    /// Insert or replace a product record
    async fn save_product(&self, record: &ProductRecord) -> StoreResult<()>;

    /// Insert or replace a category record
    async fn save_category(&self, record: &CategoryRecord) -> StoreResult<()>;

    /// Physically remove a product. Deleting a missing id is not an error.
    async fn delete_product(&self, id: &str) -> StoreResult<()>;

    /// Physically remove a category. Deleting a missing id is not an error.
    async fn delete_category(&self, id: &str) -> StoreResult<()>;

    /// Highest revision of any stored entity, tombstones included
    async fn max_rev(&self) -> StoreResult<u64> {
        let products = self.list_products().await?;
        let categories = self.list_categories().await?;

        Ok(products
            .iter()
            .map(|p| p.rev)
            .chain(categories.iter().map(|c| c.rev))
            .max()
            .unwrap_or(0))
    }
}
