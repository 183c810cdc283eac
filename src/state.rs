//! Application state management

use std::sync::Arc;

use crate::catalog::CatalogService;
use crate::config::Config;
use crate::store::LocalStore;
use crate::sync::{ConflictResolver, SyncEngine};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    config: Config,
    engine: Arc<SyncEngine>,
    catalog: CatalogService,
}

impl AppState {
    /// Wire the sync engine and local edit service over one store
    pub fn new(config: Config, store: Arc<dyn LocalStore>) -> Self {
        let engine = SyncEngine::new(store.clone(), ConflictResolver::default())
            .with_max_batch(config.sync.max_batch);

        Self {
            inner: Arc::new(AppStateInner {
                config,
                engine: Arc::new(engine),
                catalog: CatalogService::new(store),
            }),
        }
    }

    /// Get the configuration
    pub fn config(&self) -> &Config {
        &self.inner.config
    }

    /// Get the sync engine
    pub fn engine(&self) -> &Arc<SyncEngine> {
        &self.inner.engine
    }

    /// Get the local catalog service
    pub fn catalog(&self) -> &CatalogService {
        &self.inner.catalog
    }
}
