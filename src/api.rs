use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tower_http::cors::CorsLayer;

use crate::error::AggregatorError;
use crate::ingest::types::PostingDto;
use crate::ingest::AggregationEngine;
use crate::persist::{PersistenceSync, PostingStore};

/// Passes used by `/jobs/import` before giving up on conflicts.
const IMPORT_ATTEMPTS: usize = 3;

#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<AggregationEngine>,
    pub sync: Arc<PersistenceSync>,
    pub store: Arc<dyn PostingStore>,
    pub default_page_size: usize,
    pub max_page_size: usize,
}

impl AppState {
    pub fn new(
        engine: Arc<AggregationEngine>,
        store: Arc<dyn PostingStore>,
        default_page_size: usize,
        max_page_size: usize,
    ) -> Self {
        Self {
            engine,
            sync: Arc::new(PersistenceSync::new(Arc::clone(&store))),
            store,
            default_page_size,
            max_page_size,
        }
    }

    fn window(&self, q: &PageQuery) -> Result<(usize, usize), ApiError> {
        let limit = q.limit.unwrap_or(self.default_page_size);
        if limit == 0 || limit > self.max_page_size {
            return Err(ApiError::BadRequest(format!(
                "limit must be between 1 and {}",
                self.max_page_size
            )));
        }
        Ok((q.offset.unwrap_or(0), limit))
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(|| async { "OK" }))
        .route("/jobs", get(list_jobs))
        .route("/jobs/feed", get(live_feed))
        .route("/jobs/import", post(import_jobs))
        .route("/jobs/{id}", get(get_job))
        .layer(CorsLayer::very_permissive())
        .with_state(state)
}

#[derive(Debug, Default, Deserialize)]
struct PageQuery {
    offset: Option<usize>,
    limit: Option<usize>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ImportSummary {
    pub fetched: usize,
    pub stored: usize,
    pub failed_sources: Vec<String>,
}

enum ApiError {
    BadRequest(String),
    NotFound,
    Internal(AggregatorError),
}

impl From<AggregatorError> for ApiError {
    fn from(e: AggregatorError) -> Self {
        ApiError::Internal(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg).into_response(),
            ApiError::NotFound => (StatusCode::NOT_FOUND, "Job not found").into_response(),
            ApiError::Internal(e) => {
                tracing::error!(error = %e, "request failed");
                let status = if e.is_conflict() {
                    StatusCode::CONFLICT
                } else {
                    StatusCode::INTERNAL_SERVER_ERROR
                };
                (status, e.to_string()).into_response()
            }
        }
    }
}

/// Stored postings, insertion order.
async fn list_jobs(
    State(state): State<AppState>,
    Query(q): Query<PageQuery>,
) -> Result<Json<Vec<PostingDto>>, ApiError> {
    let (offset, limit) = state.window(&q)?;
    let rows = state.store.list(offset, limit).await?;
    Ok(Json(rows.iter().map(PostingDto::from).collect()))
}

/// Live aggregation, not persisted.
async fn live_feed(
    State(state): State<AppState>,
    Query(q): Query<PageQuery>,
) -> Result<Json<Vec<PostingDto>>, ApiError> {
    let (offset, limit) = state.window(&q)?;
    let rows = state.engine.aggregate(offset, limit).await?;
    Ok(Json(rows.iter().map(PostingDto::from).collect()))
}

async fn import_jobs(State(state): State<AppState>) -> Result<Json<ImportSummary>, ApiError> {
    let report = state.engine.aggregate_report().await?;
    let stored = state
        .sync
        .reconcile_with_retry(&report.postings, IMPORT_ATTEMPTS)
        .await?;
    Ok(Json(ImportSummary {
        fetched: report.postings.len(),
        stored,
        failed_sources: report
            .failed_sources()
            .map(|s| s.source.to_string())
            .collect(),
    }))
}

async fn get_job(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<PostingDto>, ApiError> {
    match state.store.get(&id).await? {
        Some(p) => Ok(Json(PostingDto::from(&p))),
        None => Err(ApiError::NotFound),
    }
}
