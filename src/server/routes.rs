use axum::{
    extract::{Query, State},
    http::StatusCode,
    Json,
};
use serde::Deserialize;
use std::sync::Arc;
use crate::ingest::{IngestPipeline, IngestReport};
use crate::page::PageRecord;
use crate::reconstruct::{ConsistencyReport, RangeReader};
use crate::server::{ApiError, AppState};
use crate::storage::DbStats;

#[derive(Deserialize)]
pub struct RangeParams {
    pub left: i64,
    pub right: i64,
}

#[derive(Deserialize)]
pub struct IndexParams {
    pub index: i64,
}

/// Run one full ingestion. Only one run may be in flight at a time.
///
/// The run is spawned so it completes even if the client disconnects.
pub async fn ingest(State(state): State<Arc<AppState>>) -> Result<Json<IngestReport>, ApiError> {
    let pipeline = IngestPipeline::new(state.store.clone(), state.source.clone(), state.pages);
    let report = tokio::spawn(async move { pipeline.run().await })
        .await
        .map_err(crate::Error::from)??;

    if !report.is_clean() {
        tracing::warn!(failed = ?report.failed_pages(), "ingestion finished with skipped pages");
    }
    Ok(Json(report))
}

pub async fn get_range(
    State(state): State<Arc<AppState>>,
    Query(params): Query<RangeParams>,
) -> Result<Json<Vec<PageRecord>>, ApiError> {
    let RangeParams { left, right } = params;
    if left <= right && right.saturating_sub(left) >= state.max_range {
        return Err(ApiError::BadRequest(format!(
            "range [{left}, {right}] spans more than {} ids",
            state.max_range
        )));
    }

    let records = state
        .store
        .run_blocking(move |store| RangeReader::new(store).fetch_range(left, right))
        .await?;

    Ok(Json(records))
}

pub async fn get_one(
    State(state): State<Arc<AppState>>,
    Query(params): Query<IndexParams>,
) -> Result<Json<PageRecord>, ApiError> {
    let index = params.index;
    let record = state
        .store
        .run_blocking(move |store| RangeReader::new(store).fetch_one(index))
        .await?;

    record
        .map(Json)
        .ok_or_else(|| ApiError::NotFound(format!("no page with index {index}")))
}

pub async fn delete_one(
    State(state): State<Arc<AppState>>,
    Query(params): Query<IndexParams>,
) -> Result<(StatusCode, &'static str), ApiError> {
    let index = params.index;
    state
        .store
        .run_blocking(move |store| RangeReader::new(store).delete_page(index))
        .await?;

    Ok((StatusCode::OK, "Row deleted successfully"))
}

pub async fn stats(State(state): State<Arc<AppState>>) -> Result<Json<DbStats>, ApiError> {
    let stats = state.store.run_blocking(|store| store.stats()).await?;
    Ok(Json(stats))
}

pub async fn consistency(
    State(state): State<Arc<AppState>>,
) -> Result<Json<ConsistencyReport>, ApiError> {
    let report = state
        .store
        .run_blocking(|store| RangeReader::new(store).consistency())
        .await?;
    Ok(Json(report))
}

pub async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok" }))
}
