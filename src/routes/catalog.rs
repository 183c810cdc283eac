//! Local catalog API
//!
//! Edge-side tooling edits products and categories here. Writes are stamped
//! with local provenance and picked up by the next pull.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::get,
    Json, Router,
};
use serde::Deserialize;

use crate::catalog::{CatalogEntity, SyncRecord};
use crate::error::Result;
use crate::state::AppState;

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ListQuery {
    /// Include tombstoned records
    pub include_deleted: bool,
}

/// Router for one entity kind
pub fn router<T: CatalogEntity>() -> Router<AppState> {
    Router::new()
        .route("/", get(list_records::<T>).post(create_record::<T>))
        .route(
            "/:id",
            get(get_record::<T>)
                .put(put_record::<T>)
                .delete(delete_record::<T>),
        )
}

async fn list_records<T: CatalogEntity>(
    State(state): State<AppState>,
    Query(query): Query<ListQuery>,
) -> Result<Json<Vec<SyncRecord<T>>>> {
    let records = state.catalog().list::<T>(query.include_deleted).await?;
    Ok(Json(records))
}

async fn create_record<T: CatalogEntity>(
    State(state): State<AppState>,
    Json(data): Json<T>,
) -> Result<(StatusCode, Json<SyncRecord<T>>)> {
    let record = state.catalog().create(data).await?;
    Ok((StatusCode::CREATED, Json(record)))
}

async fn get_record<T: CatalogEntity>(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<SyncRecord<T>>> {
    Ok(Json(state.catalog().get::<T>(&id).await?))
}

async fn put_record<T: CatalogEntity>(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(data): Json<T>,
) -> Result<Json<SyncRecord<T>>> {
    Ok(Json(state.catalog().upsert(&id, data).await?))
}

/// Tombstone a record; the tombstone is returned
async fn delete_record<T: CatalogEntity>(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<SyncRecord<T>>> {
    Ok(Json(state.catalog().delete::<T>(&id).await?))
}
