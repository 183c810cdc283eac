//! HTTP routes

pub mod catalog;
pub mod health;
pub mod sync;

use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::catalog::{Category, Product};
use crate::state::AppState;

/// Build the application router
pub fn app(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .nest("/health", health::router())
        .nest("/sync", sync::router(state.clone()))
        .nest("/api/v1/products", catalog::router::<Product>())
        .nest("/api/v1/categories", catalog::router::<Category>())
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}
