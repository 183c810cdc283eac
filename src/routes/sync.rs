//! Sync API endpoints
//!
//! Called by the cloud orchestrator. Every route sits behind the shared-secret
//! check; per-record push failures are reported in the body, not as HTTP
//! errors.

use axum::{
    extract::State,
    middleware,
    routing::{get, post},
    Json, Router,
};

use crate::auth::require_sync_token;
use crate::error::Result;
use crate::state::AppState;
use crate::sync::{ChangeBatch, PullRequest, PushBatch, PushResult, SyncStatus};

/// Create the sync router
pub fn router(state: AppState) -> Router<AppState> {
    Router::new()
        .route("/pull", post(pull_changes))
        .route("/push", post(push_changes))
        .route("/status", get(sync_status))
        .route_layer(middleware::from_fn_with_state(state, require_sync_token))
}

/// Harvest local changes above the caller's watermark
async fn pull_changes(
    State(state): State<AppState>,
    Json(req): Json<PullRequest>,
) -> Result<Json<ChangeBatch>> {
    let batch = state.engine().pull(req.since_rev, req.limit).await?;
    Ok(Json(batch))
}

/// Apply cloud changes
async fn push_changes(
    State(state): State<AppState>,
    Json(batch): Json<PushBatch>,
) -> Json<PushResult> {
    Json(state.engine().push(batch).await)
}

async fn sync_status(State(state): State<AppState>) -> Result<Json<SyncStatus>> {
    Ok(Json(state.engine().status().await?))
}
