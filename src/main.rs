//! Catalog Sync Agent
//!
//! Serves the sync endpoints and the local catalog API over one store.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use chrono::Utc;
use tokio::signal;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use catalog_sync_agent::config::{Config, StoreBackend};
use catalog_sync_agent::db;
use catalog_sync_agent::routes;
use catalog_sync_agent::state::AppState;
use catalog_sync_agent::store::{LocalStore, MemoryStore, SqliteStore};
use catalog_sync_agent::sync::SyncEngine;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "catalog_sync_agent=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    dotenvy::dotenv().ok();

    let config = Config::from_env().unwrap_or_else(|e| {
        tracing::warn!("Failed to load config from env: {}, using defaults", e);
        Config::default()
    });

    tracing::info!("Starting Catalog Sync Agent v{}", env!("CARGO_PKG_VERSION"));
    if config.sync.shared_secret.is_none() {
        tracing::warn!("SYNC_SHARED_SECRET is not set; sync endpoints will refuse every call");
    }

    let store: Arc<dyn LocalStore> = match config.store.backend {
        StoreBackend::Sqlite => {
            let pool = db::create_pool(&config.store.database_url)
                .await
                .context("failed to initialize database")?;
            tracing::info!("Database initialized at {}", config.store.database_url);
            Arc::new(SqliteStore::new(pool))
        }
        StoreBackend::Memory => {
            tracing::warn!("Using in-memory store; catalog is lost on restart");
            Arc::new(MemoryStore::new())
        }
    };

    let app_state = AppState::new(config.clone(), store);

    if config.sync.gc_interval_secs > 0 {
        tokio::spawn(purge_tombstones_periodically(
            app_state.engine().clone(),
            Duration::from_secs(config.sync.gc_interval_secs),
            chrono::Duration::days(config.sync.tombstone_retention_days),
        ));
    }

    let app = routes::app(app_state);

    // Start server with graceful shutdown
    let addr = (config.server.host.as_str(), config.server.port);
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {}:{}", addr.0, addr.1))?;
    tracing::info!("Catalog Sync Agent listening on {}", listener.local_addr()?);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    tracing::info!("Server shutdown complete");
    Ok(())
}

/// Remove tombstones the cloud has observed once they pass the retention window
async fn purge_tombstones_periodically(
    engine: Arc<SyncEngine>,
    every: Duration,
    retention: chrono::Duration,
) {
    let mut ticker = tokio::time::interval(every);
    // the first tick completes immediately
    ticker.tick().await;

    loop {
        ticker.tick().await;
        if let Err(e) = engine.purge_tombstones(Utc::now() - retention).await {
            tracing::warn!("Tombstone purge failed: {}", e);
        }
    }
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, starting graceful shutdown...");
        },
        _ = terminate => {
            tracing::info!("Received SIGTERM, starting graceful shutdown...");
        },
    }
}
